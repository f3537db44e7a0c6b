//! Transaction intents and isolation presets.

use serde::{Deserialize, Serialize};

/// Declared purpose of a unit of work. Intent picks the pool (writer vs
/// reader) and, through [`TxOptions`], the isolation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxIntent {
    ReadOnly,
    ReadWrite,
}

/// Isolation levels this service actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
}

/// Resolved transaction configuration: isolation level plus read-only flag.
///
/// Routes select one of the three named presets; nothing constructs ad hoc
/// combinations at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    /// Default for mutating work: repeatable read, read-write.
    pub const STANDARD: Self = Self {
        isolation: IsolationLevel::RepeatableRead,
        read_only: false,
    };

    /// Mutating work that must observe rows committed by concurrent
    /// transactions (long-running reporting jobs).
    pub const COMMITTED: Self = Self {
        isolation: IsolationLevel::ReadCommitted,
        read_only: false,
    };

    /// Read-only work on the reader pool.
    pub const READ_ONLY: Self = Self {
        isolation: IsolationLevel::ReadCommitted,
        read_only: true,
    };

    /// The pool-selecting intent implied by these options.
    pub fn intent(&self) -> TxIntent {
        if self.read_only {
            TxIntent::ReadOnly
        } else {
            TxIntent::ReadWrite
        }
    }

    /// `SET TRANSACTION` statement issued as the first statement of the
    /// transaction. Postgres only honours transaction modes set before any
    /// query runs, so the binder sends this immediately after BEGIN.
    pub fn set_transaction_sql(&self) -> &'static str {
        match (self.isolation, self.read_only) {
            (IsolationLevel::RepeatableRead, false) => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ WRITE"
            }
            (IsolationLevel::RepeatableRead, true) => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY"
            }
            (IsolationLevel::ReadCommitted, false) => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ WRITE"
            }
            (IsolationLevel::ReadCommitted, true) => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_map_to_documented_isolation() {
        assert_eq!(TxOptions::STANDARD.isolation, IsolationLevel::RepeatableRead);
        assert!(!TxOptions::STANDARD.read_only);
        assert_eq!(TxOptions::COMMITTED.isolation, IsolationLevel::ReadCommitted);
        assert!(!TxOptions::COMMITTED.read_only);
        assert_eq!(TxOptions::READ_ONLY.isolation, IsolationLevel::ReadCommitted);
        assert!(TxOptions::READ_ONLY.read_only);
    }

    #[test]
    fn intent_follows_read_only_flag() {
        assert_eq!(TxOptions::STANDARD.intent(), TxIntent::ReadWrite);
        assert_eq!(TxOptions::COMMITTED.intent(), TxIntent::ReadWrite);
        assert_eq!(TxOptions::READ_ONLY.intent(), TxIntent::ReadOnly);
    }

    #[test]
    fn set_transaction_sql_names_both_modes() {
        assert_eq!(
            TxOptions::STANDARD.set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ WRITE"
        );
        assert_eq!(
            TxOptions::READ_ONLY.set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY"
        );
    }
}
