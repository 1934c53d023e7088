//! The narrow interfaces through which this layer reaches the external store, scheduler,
//! blob storage and identity provider. Every call is a single asynchronous round trip.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::StoreError;
use crate::filter::Filter;

// ------------- Query plans -------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Equality constraint on the leading fields of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRange {
    pub index: String,
    pub fields: Vec<String>,
    pub values: Vec<Value>,
}

/// What the store is asked to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub table: String,
    pub index: Option<IndexRange>,
    pub filters: Vec<Filter>,
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationOptions {
    pub num_items: usize,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl PaginationOptions {
    pub fn first(num_items: usize) -> Self {
        Self { num_items, cursor: None }
    }
    pub fn after(num_items: usize, cursor: impl Into<String>) -> Self {
        Self { num_items, cursor: Some(cursor.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    pub page: Vec<T>,
    pub is_done: bool,
    pub continue_cursor: String,
}

/// How much of a query's result the store should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Collect,
    Take(usize),
    First,
    /// Stops after the second match; more than one document means the lookup is ambiguous.
    Unique,
    Paginate(PaginationOptions),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Docs(Vec<Document>),
    Doc(Option<Document>),
    Page(PaginationResult<Document>),
}

// ------------- Handles -------------

pub trait DatabaseReader: Send + Sync {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<Document>, StoreError>>;
    /// Returns the canonical form of `raw` if it is a well-formed id for `table`.
    fn normalize_id(&self, table: &str, raw: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>>;
    fn query(&self, plan: QueryPlan, fetch: Fetch) -> BoxFuture<'_, Result<QueryOutput, StoreError>>;
}

pub trait DatabaseWriter: Send + Sync {
    fn insert(&self, table: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<String, StoreError>>;
    fn patch(&self, id: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<(), StoreError>>;
    fn replace(&self, id: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<(), StoreError>>;
    fn delete(&self, id: &str) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Names a registered function a scheduled job will invoke.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionRef(String);

impl FunctionRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduledId(String);

impl ScheduledId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait SchedulerHandle: Send + Sync {
    fn run_at(&self, at: DateTime<Utc>, function: FunctionRef, args: Value) -> BoxFuture<'_, Result<ScheduledId, StoreError>>;
    fn run_after(&self, delay: Duration, function: FunctionRef, args: Value) -> BoxFuture<'_, Result<ScheduledId, StoreError>>;
    fn cancel(&self, id: &ScheduledId) -> BoxFuture<'_, Result<(), StoreError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(String);

impl StorageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait BlobReader: Send + Sync {
    /// `None` when no file is stored under `id`.
    fn get_url(&self, id: &StorageId) -> BoxFuture<'_, Result<Option<String>, StoreError>>;
}

pub trait BlobWriter: Send + Sync {
    fn generate_upload_url(&self) -> BoxFuture<'_, Result<String, StoreError>>;
    fn delete(&self, id: &StorageId) -> BoxFuture<'_, Result<(), StoreError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub token_identifier: String,
    pub subject: String,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let subject = subject.into();
        Self { token_identifier: format!("{issuer}|{subject}"), subject, issuer, name: None, email: None }
    }
}

pub trait AuthHandle: Send + Sync {
    fn user_identity(&self) -> BoxFuture<'_, Result<Option<UserIdentity>, StoreError>>;
}
