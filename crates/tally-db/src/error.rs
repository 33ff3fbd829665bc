//! # Store Errors
//!
//! Every failure a unit of work can report.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where DbError comes from                             │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        Business rule (CoreError)           │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ◄──────────── DbError::Domain                   │
//! │       │                                                                 │
//! │       │  `?` drops the open transaction → ROLLBACK                     │
//! │       ▼                                                                 │
//! │  Request layer                                                         │
//! │       │                                                                 │
//! │       ├── is_retryable() → retry the whole operation                   │
//! │       └── otherwise      → caller must correct the request             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use tally_core::CoreError;

/// Failure of a store operation.
///
/// Whatever the variant, the unit of work that raised it has been rolled
/// back and its locks released.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule rejected the operation.
    ///
    /// ## Typical Causes
    /// - NegativeBalance, InsufficientStock, UnknownEntity
    /// - InvalidOrder, InvalidOperation, validation failures
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// A required lock could not be acquired within the lock timeout.
    ///
    /// Nothing was written; retrying the whole operation is safe.
    #[error("Could not lock {key} within {waited_ms}ms")]
    LockConflict { key: String, waited_ms: u64 },

    /// A UNIQUE index refused the row (for products, the SKU).
    #[error("{field} '{value}' is already taken")]
    UniqueViolation { field: String, value: String },

    /// A row referenced a parent that does not exist.
    #[error("Dangling reference: {message}")]
    ForeignKeyViolation { message: String },

    /// The store could not be opened or created.
    #[error("Cannot open store: {0}")]
    ConnectionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// SQLite rejected a statement for any other reason (including a CHECK
    /// constraint).
    #[error("Statement rejected: {0}")]
    QueryFailed(String),

    /// No pooled connection became free within `connect_timeout`.
    #[error("No database connection available")]
    PoolExhausted,

    /// Configuration could not be read, parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A broken internal contract (for example, writing without the lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// `UnknownEntity` for `entity` / `id`.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Domain(CoreError::unknown(entity, id))
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when retrying the unchanged request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::LockConflict { .. } | DbError::PoolExhausted)
    }

    /// Returns the wrapped business error, if any.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// ## Mapping
/// ```text
/// RowNotFound                     → Domain(UnknownEntity)
/// SQLITE_CONSTRAINT_UNIQUE        → UniqueViolation (field = table.column)
/// SQLITE_CONSTRAINT_PRIMARYKEY    → UniqueViolation
/// SQLITE_CONSTRAINT_FOREIGNKEY    → ForeignKeyViolation
/// SQLITE_BUSY* / SQLITE_LOCKED*   → LockConflict { key: "database" }
/// any other database error        → QueryFailed
/// PoolTimedOut                    → PoolExhausted
/// PoolClosed                      → ConnectionFailed
/// anything else                   → Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().and_then(|code| code.parse::<i32>().ok());
                classify_sqlite_error(code, db_err.message())
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

// SQLite result codes. Extended codes carry the primary code in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Maps an (extended) SQLite result code to a store error. The message is
/// only used to name the offending column.
fn classify_sqlite_error(code: Option<i32>, msg: &str) -> DbError {
    let Some(code) = code else {
        return DbError::QueryFailed(msg.to_string());
    };

    match code {
        SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
            let field = msg.rsplit(": ").next().unwrap_or(msg);
            DbError::duplicate(field, "")
        }
        SQLITE_CONSTRAINT_FOREIGNKEY => DbError::ForeignKeyViolation {
            message: msg.to_string(),
        },
        // busy_timeout ran out waiting on another writer
        code if matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED) => DbError::LockConflict {
            key: "database".to_string(),
            waited_ms: 0,
        },
        _ => DbError::QueryFailed(msg.to_string()),
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<tally_core::ValidationError> for DbError {
    fn from(err: tally_core::ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

pub type DbResult<T> = Result<T, DbError>;
