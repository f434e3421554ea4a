//! Store-session collaborator contract.
//!
//! The engine has no network or file surface; its boundary is an in-process
//! contract with a session that executes parameterized statements against a
//! transactional relational backend. The statement model is structural —
//! rendering it to a SQL dialect is the session's concern.

use deltaview_model::{RecordRef, ScalarValue};
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by the store session.
///
/// Referential-integrity violations surface as [`SessionError::Constraint`]
/// and are propagated unchanged by the engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The store rejected a statement due to a constraint violation.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violated constraint.
        message: String,
    },

    /// A record lookup failed.
    #[error("record not found in {entity}: {detail}")]
    NotFound {
        /// The entity searched.
        entity: String,
        /// Description of the missing record.
        detail: String,
    },

    /// Backend failure.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The kind of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Insert a row.
    Insert,
    /// Update matching rows.
    Update,
    /// Delete matching rows.
    Delete,
    /// Read column values from matching rows.
    Select,
}

/// A predicate in a statement's where-clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `path = value`.
    Eq {
        /// Column path.
        path: String,
        /// Bound value.
        value: ScalarValue,
    },
    /// `path IS NULL`.
    IsNull {
        /// Column path.
        path: String,
    },
    /// `INDEX(path) = index` — positional predicate on an indexed
    /// collection.
    IndexEq {
        /// Collection path.
        path: String,
        /// Position.
        index: i64,
    },
    /// `INDEX(path)` in `[start, end)` — positional range predicate.
    IndexBetween {
        /// Collection path.
        path: String,
        /// First position, inclusive.
        start: i64,
        /// End position, exclusive.
        end: i64,
    },
}

/// A parameterized statement.
///
/// When `collection_path` is set, the statement targets the collection table
/// joined on that path from the owning entity; otherwise it targets the
/// entity's own rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The statement kind.
    pub kind: StatementKind,
    /// The owning entity name.
    pub entity: String,
    /// The collection path, for collection-table statements.
    pub collection_path: Option<String>,
    /// Column assignments (for insert/update).
    pub assignments: Vec<(String, ScalarValue)>,
    /// Positional index shift: `INDEX(path) = INDEX(path) + offset`.
    pub index_shift: Option<i64>,
    /// Positional index value for inserts into an indexed collection.
    pub position: Option<i64>,
    /// Where-clause predicates, conjoined.
    pub predicates: Vec<Predicate>,
    /// Columns whose values the statement returns.
    pub returning: Vec<String>,
}

impl Statement {
    /// Creates an empty statement of the given kind.
    #[must_use]
    pub fn new(kind: StatementKind, entity: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            collection_path: None,
            assignments: Vec::new(),
            index_shift: None,
            position: None,
            predicates: Vec::new(),
            returning: Vec::new(),
        }
    }

    /// Returns whether the statement carries no effect at all.
    #[must_use]
    pub fn is_empty_update(&self) -> bool {
        self.kind == StatementKind::Update
            && self.assignments.is_empty()
            && self.index_shift.is_none()
    }
}

/// Session collaborator executing statements against the store.
///
/// One session drives one transaction; the engine never demarcates
/// transactions itself.
pub trait StoreSession {
    /// Executes a statement and returns the number of affected rows.
    fn execute(&mut self, statement: &Statement) -> SessionResult<u64>;

    /// Executes a statement that additionally returns column values, one
    /// `Vec<ScalarValue>` per affected row in `returning` column order.
    fn execute_returning(&mut self, statement: &Statement) -> SessionResult<Vec<Vec<ScalarValue>>>;

    /// Returns whether the store can return column values from delete
    /// statements. When `false`, the engine falls back to a select before
    /// the delete.
    fn supports_returning(&self) -> bool {
        false
    }

    /// Attaches a new managed record; the store assigns and fills the id if
    /// the record has none.
    fn persist(&mut self, record: &RecordRef) -> SessionResult<()>;

    /// Looks up a managed record by id.
    fn load(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<Option<RecordRef>>;

    /// Returns a managed record reference by id without necessarily loading
    /// its state.
    fn get_reference(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<RecordRef>;

    /// Deletes a managed record by id through the store's own change
    /// tracking.
    fn remove(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<()>;
}
