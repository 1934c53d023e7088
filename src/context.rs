//! Per-request context values handed to handler bodies.
//!
//! Each wrapper owns one raw handle and turns its calls into effects with no outstanding
//! requirements. The aggregate contexts ([`QueryCtx`], [`MutationCtx`], [`ActionCtx`])
//! bundle the wrappers an invocation kind is allowed to use. The crate-private helpers at
//! the bottom are shared with the ambient functions in [`access`](crate::access).

use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::document::{Doc, DocId, encode_fields};
use crate::effect::{Cause, Defect, Effect};
use crate::error::{DocNotFound, FileNotFound, InvalidId, NotLoggedIn, StoreError};
use crate::query::QueryInitializer;
use crate::schema::Table;
use crate::store::{
    AuthHandle, BlobReader, BlobWriter, DatabaseReader, DatabaseWriter, FunctionRef, ScheduledId, SchedulerHandle,
    StorageId, UserIdentity,
};

// ------------- Database -------------

#[derive(Clone)]
pub struct DbReader {
    handle: Arc<dyn DatabaseReader>,
}

impl DbReader {
    pub fn new(handle: Arc<dyn DatabaseReader>) -> Self {
        Self { handle }
    }

    /// Fails with [`DocNotFound`] when no document has this id.
    pub fn get<T: Table>(&self, id: &DocId<T>) -> Effect<Doc<T>, DocNotFound> {
        read_doc_required(Arc::clone(&self.handle), id.clone())
    }

    pub fn get_or_null<T: Table>(&self, id: &DocId<T>) -> Effect<Option<Doc<T>>> {
        read_doc(Arc::clone(&self.handle), id.clone())
    }

    /// Checks that `raw` is a well-formed id of table `T`.
    pub fn normalize_id<T: Table>(&self, raw: impl Into<String>) -> Effect<DocId<T>, InvalidId> {
        check_id(Arc::clone(&self.handle), raw.into())
    }

    pub fn normalize_id_or_null<T: Table>(&self, raw: impl Into<String>) -> Effect<Option<DocId<T>>> {
        self.normalize_id(raw).optional()
    }

    pub fn query<T: Table>(&self) -> QueryInitializer<T> {
        QueryInitializer::bound(Arc::clone(&self.handle))
    }
}

/// Reads and writes. Dereferences to the [`DbReader`] over the same store.
#[derive(Clone)]
pub struct DbWriter {
    reader: DbReader,
    handle: Arc<dyn DatabaseWriter>,
}

impl DbWriter {
    pub fn new(reader: Arc<dyn DatabaseReader>, writer: Arc<dyn DatabaseWriter>) -> Self {
        Self { reader: DbReader::new(reader), handle: writer }
    }

    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: DatabaseReader + DatabaseWriter + 'static,
    {
        let reader: Arc<dyn DatabaseReader> = backend.clone();
        Self::new(reader, backend)
    }

    pub fn reader(&self) -> &DbReader {
        &self.reader
    }

    pub fn insert<T: Table>(&self, value: T) -> Effect<DocId<T>> {
        write_insert(Arc::clone(&self.handle), value)
    }

    /// Shallow merge: only the fields present in `partial` change.
    pub fn patch<T: Table, P: Serialize + Send + 'static>(&self, id: &DocId<T>, partial: P) -> Effect<()> {
        write_patch(Arc::clone(&self.handle), id.clone(), partial)
    }

    pub fn replace<T: Table>(&self, id: &DocId<T>, value: T) -> Effect<()> {
        write_replace(Arc::clone(&self.handle), id.clone(), value)
    }

    pub fn delete<T: Table>(&self, id: &DocId<T>) -> Effect<()> {
        write_delete(Arc::clone(&self.handle), id.clone())
    }
}

impl Deref for DbWriter {
    type Target = DbReader;
    fn deref(&self) -> &DbReader {
        &self.reader
    }
}

// ------------- Blob storage -------------

#[derive(Clone)]
pub struct StorageReader {
    handle: Arc<dyn BlobReader>,
}

impl StorageReader {
    pub fn new(handle: Arc<dyn BlobReader>) -> Self {
        Self { handle }
    }

    /// Fails with [`FileNotFound`] when nothing is stored under `id`.
    pub fn get_url(&self, id: &StorageId) -> Effect<String, FileNotFound> {
        blob_url_required(Arc::clone(&self.handle), id.clone())
    }

    pub fn get_url_or_null(&self, id: &StorageId) -> Effect<Option<String>> {
        blob_url(Arc::clone(&self.handle), id.clone())
    }
}

#[derive(Clone)]
pub struct StorageWriter {
    reader: StorageReader,
    handle: Arc<dyn BlobWriter>,
}

impl StorageWriter {
    pub fn new(reader: Arc<dyn BlobReader>, writer: Arc<dyn BlobWriter>) -> Self {
        Self { reader: StorageReader::new(reader), handle: writer }
    }

    pub fn generate_upload_url(&self) -> Effect<String> {
        blob_upload_url(Arc::clone(&self.handle))
    }

    pub fn delete(&self, id: &StorageId) -> Effect<()> {
        blob_delete(Arc::clone(&self.handle), id.clone())
    }
}

impl Deref for StorageWriter {
    type Target = StorageReader;
    fn deref(&self) -> &StorageReader {
        &self.reader
    }
}

// ------------- Scheduler and auth -------------

#[derive(Clone)]
pub struct Scheduler {
    handle: Arc<dyn SchedulerHandle>,
}

impl Scheduler {
    pub fn new(handle: Arc<dyn SchedulerHandle>) -> Self {
        Self { handle }
    }

    pub fn run_at(&self, at: DateTime<Utc>, function: FunctionRef, args: Value) -> Effect<ScheduledId> {
        schedule_at_time(Arc::clone(&self.handle), at, function, args)
    }

    pub fn run_after(&self, delay: Duration, function: FunctionRef, args: Value) -> Effect<ScheduledId> {
        schedule_after_delay(Arc::clone(&self.handle), delay, function, args)
    }

    pub fn cancel(&self, id: &ScheduledId) -> Effect<()> {
        schedule_cancel(Arc::clone(&self.handle), id.clone())
    }
}

#[derive(Clone)]
pub struct Auth {
    handle: Arc<dyn AuthHandle>,
}

impl Auth {
    pub fn new(handle: Arc<dyn AuthHandle>) -> Self {
        Self { handle }
    }

    /// Fails with [`NotLoggedIn`] for anonymous callers.
    pub fn get_user_identity(&self) -> Effect<UserIdentity, NotLoggedIn> {
        identity(Arc::clone(&self.handle)).some_or_fail(|| NotLoggedIn)
    }

    pub fn get_user_identity_or_null(&self) -> Effect<Option<UserIdentity>> {
        identity(Arc::clone(&self.handle))
    }
}

// ------------- Aggregates -------------

/// What a query handler sees: read-only database access, identity, file URLs.
#[derive(Clone)]
pub struct QueryCtx {
    pub db: DbReader,
    pub auth: Auth,
    pub storage: StorageReader,
}

/// What a mutation handler sees.
#[derive(Clone)]
pub struct MutationCtx {
    pub db: DbWriter,
    pub auth: Auth,
    pub storage: StorageWriter,
    pub scheduler: Scheduler,
}

/// What an action handler sees. Actions have no database handle.
#[derive(Clone)]
pub struct ActionCtx {
    pub auth: Auth,
    pub storage: StorageWriter,
    pub scheduler: Scheduler,
}

// ------------- Shared calls -------------

fn store_defect<E>(error: StoreError) -> Cause<E> {
    Cause::Die(Defect::Store(error))
}

pub(crate) fn read_doc<T: Table>(db: Arc<dyn DatabaseReader>, id: DocId<T>) -> Effect<Option<Doc<T>>> {
    let raw = id.into_string();
    Effect::from_store(async move { db.get(&raw).await })
        .and_then_exit(|found| found.map(Doc::decode).transpose().map_err(store_defect))
}

pub(crate) fn read_doc_required<T: Table>(db: Arc<dyn DatabaseReader>, id: DocId<T>) -> Effect<Doc<T>, DocNotFound> {
    let missing = DocNotFound::by_id_in(T::table_name(), id.as_str());
    read_doc(db, id).some_or_fail(move || missing)
}

pub(crate) fn check_id<T: Table>(db: Arc<dyn DatabaseReader>, raw: String) -> Effect<DocId<T>, InvalidId> {
    let lookup = raw.clone();
    Effect::from_store(async move { db.normalize_id(T::table_name(), &lookup).await }).and_then_exit(move |found| {
        match found {
            Some(canonical) => Ok(DocId::from_raw(canonical)),
            None => Err(Cause::Fail(InvalidId { table: T::table_name().to_owned(), id: raw })),
        }
    })
}

async fn insert_encoded<T: Table>(db: Arc<dyn DatabaseWriter>, value: T) -> Result<String, StoreError> {
    let table = T::table_name();
    let fields = encode_fields(&value, table)?;
    debug!(table, fields = fields.len(), "insert");
    db.insert(table, fields).await
}

async fn patch_encoded<P: Serialize>(
    db: Arc<dyn DatabaseWriter>,
    table: &'static str,
    id: String,
    partial: P,
) -> Result<(), StoreError> {
    let fields = encode_fields(&partial, table)?;
    debug!(%id, fields = fields.len(), "patch");
    db.patch(&id, fields).await
}

async fn replace_encoded<T: Table>(db: Arc<dyn DatabaseWriter>, id: String, value: T) -> Result<(), StoreError> {
    let fields = encode_fields(&value, T::table_name())?;
    debug!(%id, "replace");
    db.replace(&id, fields).await
}

pub(crate) fn write_insert<T: Table>(db: Arc<dyn DatabaseWriter>, value: T) -> Effect<DocId<T>> {
    Effect::from_store(insert_encoded(db, value)).map(DocId::from_raw)
}

pub(crate) fn write_patch<T, P>(db: Arc<dyn DatabaseWriter>, id: DocId<T>, partial: P) -> Effect<()>
where
    T: Table,
    P: Serialize + Send + 'static,
{
    Effect::from_store(patch_encoded(db, T::table_name(), id.into_string(), partial))
}

pub(crate) fn write_replace<T: Table>(db: Arc<dyn DatabaseWriter>, id: DocId<T>, value: T) -> Effect<()> {
    Effect::from_store(replace_encoded(db, id.into_string(), value))
}

pub(crate) fn write_delete<T: Table>(db: Arc<dyn DatabaseWriter>, id: DocId<T>) -> Effect<()> {
    let raw = id.into_string();
    Effect::from_store(async move {
        debug!(id = %raw, "delete");
        db.delete(&raw).await
    })
}

pub(crate) fn blob_url(blob: Arc<dyn BlobReader>, id: StorageId) -> Effect<Option<String>> {
    Effect::from_store(async move { blob.get_url(&id).await })
}

pub(crate) fn blob_url_required(blob: Arc<dyn BlobReader>, id: StorageId) -> Effect<String, FileNotFound> {
    let missing = FileNotFound { storage_id: id.as_str().to_owned() };
    blob_url(blob, id).some_or_fail(move || missing)
}

pub(crate) fn blob_upload_url(blob: Arc<dyn BlobWriter>) -> Effect<String> {
    Effect::from_store(async move { blob.generate_upload_url().await })
}

pub(crate) fn blob_delete(blob: Arc<dyn BlobWriter>, id: StorageId) -> Effect<()> {
    Effect::from_store(async move { blob.delete(&id).await })
}

pub(crate) fn schedule_at_time(
    scheduler: Arc<dyn SchedulerHandle>,
    at: DateTime<Utc>,
    function: FunctionRef,
    args: Value,
) -> Effect<ScheduledId> {
    Effect::from_store(async move { scheduler.run_at(at, function, args).await })
}

pub(crate) fn schedule_after_delay(
    scheduler: Arc<dyn SchedulerHandle>,
    delay: Duration,
    function: FunctionRef,
    args: Value,
) -> Effect<ScheduledId> {
    Effect::from_store(async move { scheduler.run_after(delay, function, args).await })
}

pub(crate) fn schedule_cancel(scheduler: Arc<dyn SchedulerHandle>, id: ScheduledId) -> Effect<()> {
    Effect::from_store(async move { scheduler.cancel(&id).await })
}

pub(crate) fn identity(auth: Arc<dyn AuthHandle>) -> Effect<Option<UserIdentity>, Infallible> {
    Effect::from_store(async move { auth.user_identity().await })
}
