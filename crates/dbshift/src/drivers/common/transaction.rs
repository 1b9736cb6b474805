//! Single-level transaction bookkeeping.
//!
//! Adapters drive transactions with raw `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements on their one connection; this tracks whether one is open so a
//! nested begin fails instead of silently succeeding.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DbError, Result};

#[derive(Debug, Default)]
pub struct TransactionState {
    open: AtomicBool,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a transaction as opening. Fails if one is already open.
    pub fn enter(&self) -> Result<()> {
        self.open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| {
                DbError::Transaction(
                    "a transaction is already open; nested transactions are not supported".into(),
                )
            })
    }

    /// Fail unless a transaction is open.
    pub fn require_open(&self, operation: &str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DbError::Transaction(format!(
                "{} called without an open transaction",
                operation
            )))
        }
    }

    /// Mark the transaction as finished.
    pub fn leave(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_enter_fails() {
        let state = TransactionState::new();
        state.enter().unwrap();
        assert!(matches!(state.enter(), Err(DbError::Transaction(_))));
        state.leave();
        assert!(state.enter().is_ok());
    }

    #[test]
    fn test_require_open() {
        let state = TransactionState::new();
        assert!(state.require_open("commit").is_err());
        state.enter().unwrap();
        assert!(state.require_open("commit").is_ok());
    }
}
