//! Tagged errors carried in the typed failure channel of an [`Effect`](crate::effect::Effect),
//! plus the store, schema and crate-level error enums.
//!
//! Every declared failure implements [`TaggedError`]: a stable discriminant tag and,
//! for the few kinds a client is allowed to see, a user-facing message. Everything else
//! stays opaque once it crosses the boundary runner.

use std::convert::Infallible;

use thiserror::Error;

/// A structured failure identified by a discriminant tag.
pub trait TaggedError: std::error::Error + Send + Sync + 'static {
    fn tag(&self) -> &'static str;

    /// Message a client may see. `None` keeps the failure opaque at the boundary.
    fn user_message(&self) -> Option<String> {
        None
    }
}

impl TaggedError for Infallible {
    fn tag(&self) -> &'static str {
        match *self {}
    }
}

/// Splits a failure into the tag `T` a handler wants to recover from and whatever else
/// remains of the error type.
pub trait Extract<T>: Sized {
    type Rest: Send + 'static;
    fn extract(self) -> std::result::Result<T, Self::Rest>;
}

impl<T: TaggedError> Extract<T> for T {
    type Rest = Infallible;
    fn extract(self) -> std::result::Result<T, Infallible> {
        Ok(self)
    }
}

// ------------- Tagged errors -------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", missing_doc_message(.table.as_deref(), .id.as_deref()))]
pub struct DocNotFound {
    pub table: Option<String>,
    pub id: Option<String>,
}

fn missing_doc_message(table: Option<&str>, id: Option<&str>) -> String {
    match (table, id) {
        (Some(table), Some(id)) => format!("couldn't find doc with id \"{id}\" in table \"{table}\""),
        (None, Some(id)) => format!("couldn't find doc with id \"{id}\""),
        (Some(table), None) => format!("no document found in table \"{table}\""),
        (None, None) => "couldn't find doc".to_string(),
    }
}

impl DocNotFound {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self { table: None, id: Some(id.into()) }
    }
    pub fn in_table(table: impl Into<String>) -> Self {
        Self { table: Some(table.into()), id: None }
    }
    pub fn by_id_in(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self { table: Some(table.into()), id: Some(id.into()) }
    }
}

impl TaggedError for DocNotFound {
    fn tag(&self) -> &'static str {
        "DocNotFound"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid id \"{id}\" for table \"{table}\"")]
pub struct InvalidId {
    pub table: String,
    pub id: String,
}

impl TaggedError for InvalidId {
    fn tag(&self) -> &'static str {
        "InvalidId"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("file not found: {storage_id}")]
pub struct FileNotFound {
    pub storage_id: String,
}

impl TaggedError for FileNotFound {
    fn tag(&self) -> &'static str {
        "FileNotFound"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("You must be logged in to perform this action.")]
pub struct NotLoggedIn;

impl TaggedError for NotLoggedIn {
    fn tag(&self) -> &'static str {
        "NotLoggedIn"
    }
    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }
}

/// More than one document matched a lookup that must be unique.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a unique document in table \"{table}\" but found several")]
pub struct NotUnique {
    pub table: String,
}

impl TaggedError for NotUnique {
    fn tag(&self) -> &'static str {
        "NotUnique"
    }
}

/// A handler-declared failure whose message is meant for the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DomainError {
    pub message: String,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl TaggedError for DomainError {
    fn tag(&self) -> &'static str {
        "DomainError"
    }
    fn user_message(&self) -> Option<String> {
        Some(self.message.clone())
    }
}

// ------------- Unions -------------

/// Outcome of a `unique` lookup that did not yield exactly one document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniqueError {
    #[error(transparent)]
    NotFound(#[from] DocNotFound),
    #[error(transparent)]
    Ambiguous(#[from] NotUnique),
}

impl TaggedError for UniqueError {
    fn tag(&self) -> &'static str {
        match self {
            Self::NotFound(e) => e.tag(),
            Self::Ambiguous(e) => e.tag(),
        }
    }
}

impl Extract<DocNotFound> for UniqueError {
    type Rest = NotUnique;
    fn extract(self) -> std::result::Result<DocNotFound, NotUnique> {
        match self {
            Self::NotFound(e) => Ok(e),
            Self::Ambiguous(e) => Err(e),
        }
    }
}

impl Extract<NotUnique> for UniqueError {
    type Rest = DocNotFound;
    fn extract(self) -> std::result::Result<NotUnique, DocNotFound> {
        match self {
            Self::Ambiguous(e) => Ok(e),
            Self::NotFound(e) => Err(e),
        }
    }
}

/// Every tagged error this crate produces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error(transparent)]
    DocNotFound(#[from] DocNotFound),
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    FileNotFound(#[from] FileNotFound),
    #[error(transparent)]
    NotLoggedIn(#[from] NotLoggedIn),
    #[error(transparent)]
    NotUnique(#[from] NotUnique),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl TaggedError for DataError {
    fn tag(&self) -> &'static str {
        match self {
            Self::DocNotFound(e) => e.tag(),
            Self::InvalidId(e) => e.tag(),
            Self::FileNotFound(e) => e.tag(),
            Self::NotLoggedIn(e) => e.tag(),
            Self::NotUnique(e) => e.tag(),
            Self::Domain(e) => e.tag(),
        }
    }
    fn user_message(&self) -> Option<String> {
        match self {
            Self::NotLoggedIn(e) => e.user_message(),
            Self::Domain(e) => e.user_message(),
            _ => None,
        }
    }
}

impl From<UniqueError> for DataError {
    fn from(e: UniqueError) -> Self {
        match e {
            UniqueError::NotFound(e) => Self::DocNotFound(e),
            UniqueError::Ambiguous(e) => Self::NotUnique(e),
        }
    }
}

macro_rules! extract_variant {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl Extract<$ty> for DataError {
                type Rest = DataError;
                fn extract(self) -> std::result::Result<$ty, DataError> {
                    match self {
                        Self::$variant(e) => Ok(e),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

extract_variant!(
    DocNotFound => DocNotFound,
    InvalidId => InvalidId,
    FileNotFound => FileNotFound,
    NotLoggedIn => NotLoggedIn,
    NotUnique => NotUnique,
    Domain => DomainError,
);

// An effect that cannot fail composes into any of these.
macro_rules! from_infallible {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<Infallible> for $ty {
                fn from(never: Infallible) -> Self {
                    match never {}
                }
            }
        )+
    };
}

from_infallible!(
    DocNotFound,
    InvalidId,
    FileNotFound,
    NotLoggedIn,
    NotUnique,
    DomainError,
    UniqueError,
    DataError,
);

// ------------- Store and schema failures -------------

/// Failures reported by the external store. They are never part of a handler's declared
/// error type; effects surface them as defects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown table \"{0}\"")]
    UnknownTable(String),
    #[error("document \"{0}\" does not exist")]
    MissingDocument(String),
    #[error("schema violation in table \"{table}\": {message}")]
    Schema { table: String, message: String },
    #[error("malformed document \"{id}\": {message}")]
    Malformed { id: String, message: String },
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Rejected table declarations and index lookups. These surface when a descriptor or a
/// query is constructed, before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid table name \"{0}\"")]
    InvalidTableName(String),
    #[error("invalid field name \"{field}\" in table \"{table}\"")]
    InvalidFieldName { table: String, field: String },
    #[error("field \"{field}\" declared twice in table \"{table}\"")]
    DuplicateField { table: String, field: String },
    #[error("index \"{index}\" declared twice in table \"{table}\"")]
    DuplicateIndex { table: String, index: String },
    #[error("table \"{0}\" declared twice in schema")]
    DuplicateTable(String),
    #[error("index \"{index}\" in table \"{table}\" refers to unknown field \"{field}\"")]
    UnknownIndexField { table: String, index: String, field: String },
    #[error("index \"{index}\" in table \"{table}\" has no fields")]
    EmptyIndex { table: String, index: String },
    #[error("table \"{table}\" has no index named \"{index}\"")]
    UnknownIndex { table: String, index: String },
    #[error("index \"{index}\" in table \"{table}\" takes {expected} values, got {actual}")]
    IndexArity { table: String, index: String, expected: usize, actual: usize },
    #[error("index \"{index}\" in table \"{table}\": value {position} for field \"{field}\" must be {expected}, got {actual}")]
    IndexType {
        table: String,
        index: String,
        position: usize,
        field: String,
        expected: String,
        actual: String,
    },
}

// ------------- Crate error -------------

#[derive(Error, Debug)]
pub enum DocfxError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DocfxError>;

impl From<config::ConfigError> for DocfxError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_not_found_messages_follow_known_payload() {
        assert_eq!(DocNotFound::by_id("todos:1").to_string(), "couldn't find doc with id \"todos:1\"");
        assert_eq!(DocNotFound::in_table("todos").to_string(), "no document found in table \"todos\"");
        assert_eq!(
            DocNotFound::by_id_in("todos", "todos:1").to_string(),
            "couldn't find doc with id \"todos:1\" in table \"todos\""
        );
    }

    #[test]
    fn only_domain_and_auth_errors_are_user_facing() {
        assert!(DomainError::new("nope").user_message().is_some());
        assert!(NotLoggedIn.user_message().is_some());
        assert!(DocNotFound::by_id("x").user_message().is_none());
        assert!(DataError::from(InvalidId { table: "t".into(), id: "x".into() }).user_message().is_none());
        assert_eq!(DataError::from(DomainError::new("boom")).user_message().as_deref(), Some("boom"));
    }

    #[test]
    fn extract_narrows_unique_error() {
        let missing = UniqueError::from(DocNotFound::in_table("todos"));
        let narrowed: std::result::Result<DocNotFound, NotUnique> = missing.extract();
        assert!(narrowed.is_ok());
        let ambiguous = UniqueError::from(NotUnique { table: "todos".into() });
        let narrowed: std::result::Result<DocNotFound, NotUnique> = ambiguous.extract();
        assert_eq!(narrowed.unwrap_err().table, "todos");
    }
}
