//! Ambient access: the same operations as the context values, resolved from the
//! capability registry when the effect runs. Each function carries its slot in the
//! effect's requirement set, so a handler that calls it can only be run by a kind that
//! supplies that slot, or after the slot is provided explicitly.

use std::convert::Infallible;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::capability::{
    BlobRead, BlobWrite, Both, DbRead, DbWrite, Identity, NeedsBlobRead, NeedsBlobWrite, NeedsIdentity, NeedsRead,
    NeedsScheduler, NeedsWrite, Schedule,
};
use crate::context::{self, DbReader, DbWriter};
use crate::document::{Doc, DocId};
use crate::effect::{Effect, require};
use crate::error::{DocNotFound, FileNotFound, InvalidId, NotLoggedIn};
use crate::query::QueryInitializer;
use crate::schema::Table;
use crate::store::{FunctionRef, ScheduledId, StorageId, UserIdentity};

pub fn db_reader() -> Effect<DbReader, Infallible, NeedsRead> {
    require::<DbRead>().map(DbReader::new)
}

pub fn db_writer() -> Effect<DbWriter, Infallible, Both<NeedsRead, NeedsWrite>> {
    require::<DbRead>().zip(require::<DbWrite>()).map(|(reader, writer)| DbWriter::new(reader, writer))
}

/// Starts a query on `T` against whatever read handle is in scope.
pub fn from_table<T: Table>() -> QueryInitializer<T, NeedsRead> {
    QueryInitializer::ambient()
}

pub fn get_from<T: Table>(id: DocId<T>) -> Effect<Doc<T>, DocNotFound, NeedsRead> {
    require::<DbRead>().flat_map(move |db| context::read_doc_required(db, id))
}

pub fn get_or_null_from<T: Table>(id: DocId<T>) -> Effect<Option<Doc<T>>, Infallible, NeedsRead> {
    require::<DbRead>().flat_map(move |db| context::read_doc(db, id))
}

pub fn normalize_id<T: Table>(raw: impl Into<String>) -> Effect<DocId<T>, InvalidId, NeedsRead> {
    let raw = raw.into();
    require::<DbRead>().flat_map(move |db| context::check_id(db, raw))
}

pub fn insert_into<T: Table>(value: T) -> Effect<DocId<T>, Infallible, NeedsWrite> {
    require::<DbWrite>().flat_map(move |db| context::write_insert(db, value))
}

pub fn patch_in<T, P>(id: DocId<T>, partial: P) -> Effect<(), Infallible, NeedsWrite>
where
    T: Table,
    P: Serialize + Send + 'static,
{
    require::<DbWrite>().flat_map(move |db| context::write_patch(db, id, partial))
}

pub fn replace_in<T: Table>(id: DocId<T>, value: T) -> Effect<(), Infallible, NeedsWrite> {
    require::<DbWrite>().flat_map(move |db| context::write_replace(db, id, value))
}

pub fn delete_from<T: Table>(id: DocId<T>) -> Effect<(), Infallible, NeedsWrite> {
    require::<DbWrite>().flat_map(move |db| context::write_delete(db, id))
}

pub fn current_user() -> Effect<UserIdentity, NotLoggedIn, NeedsIdentity> {
    current_user_or_null().some_or_fail(|| NotLoggedIn)
}

pub fn current_user_or_null() -> Effect<Option<UserIdentity>, Infallible, NeedsIdentity> {
    require::<Identity>().flat_map(context::identity)
}

pub fn schedule_at(
    at: DateTime<Utc>,
    function: FunctionRef,
    args: Value,
) -> Effect<ScheduledId, Infallible, NeedsScheduler> {
    require::<Schedule>().flat_map(move |scheduler| context::schedule_at_time(scheduler, at, function, args))
}

pub fn schedule_after(
    delay: Duration,
    function: FunctionRef,
    args: Value,
) -> Effect<ScheduledId, Infallible, NeedsScheduler> {
    require::<Schedule>().flat_map(move |scheduler| context::schedule_after_delay(scheduler, delay, function, args))
}

pub fn cancel_scheduled(id: ScheduledId) -> Effect<(), Infallible, NeedsScheduler> {
    require::<Schedule>().flat_map(move |scheduler| context::schedule_cancel(scheduler, id))
}

pub fn file_url(id: StorageId) -> Effect<String, FileNotFound, NeedsBlobRead> {
    require::<BlobRead>().flat_map(move |blob| context::blob_url_required(blob, id))
}

pub fn file_url_or_null(id: StorageId) -> Effect<Option<String>, Infallible, NeedsBlobRead> {
    require::<BlobRead>().flat_map(move |blob| context::blob_url(blob, id))
}

pub fn upload_url() -> Effect<String, Infallible, NeedsBlobWrite> {
    require::<BlobWrite>().flat_map(context::blob_upload_url)
}

pub fn delete_file(id: StorageId) -> Effect<(), Infallible, NeedsBlobWrite> {
    require::<BlobWrite>().flat_map(move |blob| context::blob_delete(blob, id))
}
