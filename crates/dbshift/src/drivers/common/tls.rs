//! TLS settings shared by the server engines.
//!
//! The configuration carries one `ssl_mode` word in PostgreSQL's vocabulary.
//! PostgreSQL connections get a rustls connector from [`TlsBuilder`]; MySQL
//! connections hand the mode to sqlx, which brings its own TLS stack.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sqlx::mysql::MySqlSslMode;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::error::{DbError, Result};

/// Accepted spellings, listed in error messages.
const SSL_MODES: &str = "disable, require, verify-ca, verify-full";

/// Transport security requested for a server engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// Encrypt without checking the certificate. Open to interception.
    Require,
    /// Check the certificate chain. With rustls the hostname is checked too.
    VerifyCa,
    /// Check the certificate chain and the hostname.
    VerifyFull,
}

impl SslMode {
    /// Whether the connection is encrypted at all.
    pub fn encrypted(self) -> bool {
        self != SslMode::Disable
    }

    /// Whether the server certificate is checked against trusted roots.
    pub fn verifies(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }

    /// Equivalent sqlx MySQL setting.
    pub fn mysql(self) -> MySqlSslMode {
        match self {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        }
    }
}

impl FromStr for SslMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(DbError::Config(format!(
                "Invalid ssl_mode '{}' (expected one of: {})",
                other, SSL_MODES
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        })
    }
}

/// Builds the rustls side of a PostgreSQL connection.
pub struct TlsBuilder {
    mode: SslMode,
    provider: Arc<CryptoProvider>,
}

impl TlsBuilder {
    pub fn new(mode: SslMode) -> Self {
        Self {
            mode,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    pub fn mode(&self) -> SslMode {
        self.mode
    }

    /// Connector for tokio-postgres, or `None` for plain TCP.
    pub fn postgres_connector(&self) -> Result<Option<MakeRustlsConnect>> {
        if !self.mode.encrypted() {
            return Ok(None);
        }
        Ok(Some(MakeRustlsConnect::new(self.client_config()?)))
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| DbError::Config(format!("TLS setup failed: {}", e)))?;

        if self.mode.verifies() {
            debug!("TLS with certificate verification (ssl_mode={})", self.mode);
            let roots: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
            return Ok(builder.with_root_certificates(roots).with_no_client_auth());
        }

        warn!(
            "ssl_mode={} encrypts without checking the server certificate; \
             prefer verify-full outside trusted networks",
            self.mode
        );
        Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(self.provider.clone())))
            .with_no_client_auth())
    }
}

/// Verifier for `ssl_mode=require`: any certificate is accepted, handshake
/// signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for mode in ["disable", "require", "verify-ca", "verify-full"] {
            assert_eq!(mode.parse::<SslMode>().unwrap().to_string(), mode);
        }
        assert_eq!(" REQUIRE ".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!("".parse::<SslMode>().unwrap(), SslMode::Disable);

        let err = "prefer".parse::<SslMode>().unwrap_err();
        assert!(err.to_string().contains("verify-full"));
    }

    #[test]
    fn test_mysql_mapping() {
        assert!(matches!(SslMode::Disable.mysql(), MySqlSslMode::Disabled));
        assert!(matches!(SslMode::Require.mysql(), MySqlSslMode::Required));
        assert!(matches!(SslMode::VerifyFull.mysql(), MySqlSslMode::VerifyIdentity));
    }

    #[test]
    fn test_postgres_connector_per_mode() {
        assert!(TlsBuilder::new(SslMode::Disable)
            .postgres_connector()
            .unwrap()
            .is_none());
        assert!(TlsBuilder::new(SslMode::Require)
            .postgres_connector()
            .unwrap()
            .is_some());
        assert!(TlsBuilder::new(SslMode::VerifyCa)
            .postgres_connector()
            .unwrap()
            .is_some());
    }
}
