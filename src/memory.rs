//! In-memory stand-in for the external store, scheduler, blob storage and identity
//! provider. It keeps everything in process and loses it on exit.
//!
//! State is split over keepers, each behind its own lock: documents per table, scheduled
//! jobs, and stored files. Documents are validated against the [`Schema`] on every write.
//! Query results are ordered by index key, then creation time, then insertion sequence,
//! and a pagination cursor is the JSON-encoded sort key of the last document returned.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};
use seahash::SeaHasher;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::datatype::{compare_slices, compare_values};
use crate::document::Document;
use crate::error::StoreError;
use crate::runner::{ActionHandles, Deployment, MutationHandles, QueryHandles};
use crate::schema::{Schema, TableDef};
use crate::store::{
    AuthHandle, BlobReader, BlobWriter, DatabaseReader, DatabaseWriter, Fetch, FunctionRef, IndexRange, Order,
    PaginationOptions, PaginationResult, QueryOutput, QueryPlan, ScheduledId, SchedulerHandle, StorageId, UserIdentity,
};

pub type TableHasher = BuildHasherDefault<SeaHasher>;

pub const DEFAULT_MAX_PAGE_SIZE: usize = 1024;
const SCHEDULED_TABLE: &str = "_scheduled_functions";
const STORAGE_TABLE: &str = "_storage";

fn split_id(raw: &str) -> Option<(&str, u64)> {
    let (table, seq) = raw.split_once(':')?;
    Some((table, seq.parse().ok()?))
}

// ------------- Documents -------------

#[derive(Debug, Default)]
pub struct DocumentKeeper {
    tables: HashMap<String, BTreeMap<u64, Document>, TableHasher>,
    lower_bound: u64,
}

impl DocumentKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate(&mut self) -> u64 {
        self.lower_bound += 1;
        self.lower_bound
    }

    fn keep(&mut self, table: &str, fields: Map<String, Value>) -> String {
        let seq = self.generate();
        let id = format!("{table}:{seq}");
        let document = Document { id: id.clone(), creation_time: Utc::now(), fields };
        self.tables.entry(table.to_owned()).or_default().insert(seq, document);
        id
    }

    fn get(&self, raw: &str) -> Option<&Document> {
        let (table, seq) = split_id(raw)?;
        self.tables.get(table)?.get(&seq)
    }

    fn get_mut(&mut self, raw: &str) -> Option<&mut Document> {
        let (table, seq) = split_id(raw)?;
        self.tables.get_mut(table)?.get_mut(&seq)
    }

    fn release(&mut self, raw: &str) -> Option<Document> {
        let (table, seq) = split_id(raw)?;
        self.tables.get_mut(table)?.remove(&seq)
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, BTreeMap::len)
    }

    fn scan(&self, table: &str) -> impl Iterator<Item = (u64, &Document)> {
        self.tables.get(table).into_iter().flat_map(|docs| docs.iter().map(|(seq, doc)| (*seq, doc)))
    }
}

// ------------- Scheduled jobs -------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Pending,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: ScheduledId,
    pub function: FunctionRef,
    pub args: Value,
    pub run_at: DateTime<Utc>,
    pub state: JobState,
}

#[derive(Debug, Default)]
pub struct JobKeeper {
    kept: Vec<ScheduledJob>,
}

impl JobKeeper {
    fn keep(&mut self, run_at: DateTime<Utc>, function: FunctionRef, args: Value) -> ScheduledId {
        let id = ScheduledId::new(format!("{SCHEDULED_TABLE}:{}", self.kept.len() + 1));
        self.kept.push(ScheduledJob { id: id.clone(), function, args, run_at, state: JobState::Pending });
        id
    }

    fn cancel(&mut self, id: &ScheduledId) -> Result<(), StoreError> {
        match self.kept.iter_mut().find(|job| &job.id == id) {
            Some(job) => {
                job.state = JobState::Canceled;
                Ok(())
            }
            None => Err(StoreError::MissingDocument(id.as_str().to_owned())),
        }
    }
}

// ------------- Files -------------

#[derive(Debug, Default)]
pub struct FileKeeper {
    kept: BTreeMap<u64, Vec<u8>>,
    lower_bound: u64,
    uploads: u64,
}

impl FileKeeper {
    fn keep(&mut self, bytes: Vec<u8>) -> StorageId {
        self.lower_bound += 1;
        self.kept.insert(self.lower_bound, bytes);
        StorageId::new(format!("{STORAGE_TABLE}:{}", self.lower_bound))
    }

    fn seq(id: &StorageId) -> Option<u64> {
        split_id(id.as_str()).filter(|(table, _)| *table == STORAGE_TABLE).map(|(_, seq)| seq)
    }
}

// ------------- Backend -------------

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct MemoryBackend {
    schema: Arc<Schema>,
    max_page_size: usize,
    documents: Arc<Mutex<DocumentKeeper>>,
    jobs: Arc<Mutex<JobKeeper>>,
    files: Arc<Mutex<FileKeeper>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|e| StoreError::Lock(e.to_string()))
}

impl MemoryBackend {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            documents: Arc::new(Mutex::new(DocumentKeeper::new())),
            jobs: Arc::new(Mutex::new(JobKeeper::default())),
            files: Arc::new(Mutex::new(FileKeeper::default())),
        }
    }

    /// Upper bound on the size of one page, whatever a caller asks for.
    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn document_count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(lock(&self.documents)?.len(table))
    }

    pub fn scheduled_jobs(&self) -> Result<Vec<ScheduledJob>, StoreError> {
        Ok(lock(&self.jobs)?.kept.clone())
    }

    /// Stores `bytes` as if an upload through a generated URL had completed.
    pub fn store_file(&self, bytes: Vec<u8>) -> Result<StorageId, StoreError> {
        let id = lock(&self.files)?.keep(bytes);
        debug!(%id, "file stored");
        Ok(id)
    }

    pub fn read_file(&self, id: &StorageId) -> Result<Option<Vec<u8>>, StoreError> {
        let files = lock(&self.files)?;
        Ok(FileKeeper::seq(id).and_then(|seq| files.kept.get(&seq).cloned()))
    }

    fn table(&self, name: &str) -> Result<&TableDef, StoreError> {
        self.schema.get(name).ok_or_else(|| StoreError::UnknownTable(name.to_owned()))
    }

    fn table_of(&self, id: &str) -> Result<&TableDef, StoreError> {
        let (table, _) = split_id(id).ok_or_else(|| StoreError::MissingDocument(id.to_owned()))?;
        self.table(table)
    }

    /// Every given field must be declared and well typed; every required field must be present.
    fn validate(table: &TableDef, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let violation = |message: String| StoreError::Schema { table: table.name().to_owned(), message };
        for (name, value) in fields {
            let def = table.field(name).ok_or_else(|| violation(format!("unknown field \"{name}\"")))?;
            if !def.ty.accepts(value) {
                return Err(violation(format!("field \"{name}\" must be {}, got {value}", def.ty)));
            }
        }
        for def in table.fields() {
            if !def.ty.is_optional() && !fields.contains_key(&def.name) {
                return Err(violation(format!("missing required field \"{}\"", def.name)));
            }
        }
        Ok(())
    }

    fn insert_now(&self, table: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        Self::validate(self.table(table)?, &fields)?;
        let id = lock(&self.documents)?.keep(table, fields);
        debug!(table, %id, "inserted");
        Ok(id)
    }

    fn patch_now(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let def = self.table_of(id)?;
        let mut documents = lock(&self.documents)?;
        let document = documents.get_mut(id).ok_or_else(|| StoreError::MissingDocument(id.to_owned()))?;
        let mut merged = document.fields.clone();
        merged.extend(fields);
        Self::validate(def, &merged)?;
        document.fields = merged;
        debug!(%id, "patched");
        Ok(())
    }

    fn replace_now(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let def = self.table_of(id)?;
        Self::validate(def, &fields)?;
        let mut documents = lock(&self.documents)?;
        let document = documents.get_mut(id).ok_or_else(|| StoreError::MissingDocument(id.to_owned()))?;
        document.fields = fields;
        debug!(%id, "replaced");
        Ok(())
    }

    fn delete_now(&self, id: &str) -> Result<(), StoreError> {
        lock(&self.documents)?.release(id).ok_or_else(|| StoreError::MissingDocument(id.to_owned()))?;
        debug!(%id, "deleted");
        Ok(())
    }

    fn evaluate(&self, plan: QueryPlan, fetch: Fetch) -> Result<QueryOutput, StoreError> {
        let def = self.table(&plan.table)?;
        if let Some(range) = &plan.index {
            if def.index(&range.index).is_none() {
                return Err(StoreError::Schema {
                    table: plan.table.clone(),
                    message: format!("no index named \"{}\"", range.index),
                });
            }
        }
        let documents = lock(&self.documents)?;
        let mut matched: Vec<(Vec<Value>, &Document)> = documents
            .scan(&plan.table)
            .filter(|(_, doc)| plan.index.as_ref().is_none_or(|range| in_range(range, doc)))
            .filter(|(_, doc)| plan.filters.iter().all(|filter| filter.matches(doc)))
            .map(|(seq, doc)| (sort_key(plan.index.as_ref(), seq, doc), doc))
            .collect();
        matched.sort_by(|(a, _), (b, _)| compare_slices(a, b));
        if plan.order == Order::Desc {
            matched.reverse();
        }
        let output = match fetch {
            Fetch::Collect => QueryOutput::Docs(matched.into_iter().map(|(_, doc)| doc.clone()).collect()),
            Fetch::Take(n) => QueryOutput::Docs(matched.into_iter().take(n).map(|(_, doc)| doc.clone()).collect()),
            Fetch::First => QueryOutput::Doc(matched.first().map(|(_, doc)| (*doc).clone())),
            Fetch::Unique => QueryOutput::Docs(matched.into_iter().take(2).map(|(_, doc)| doc.clone()).collect()),
            Fetch::Paginate(options) => QueryOutput::Page(self.page(matched, plan.order, options)?),
        };
        Ok(output)
    }

    fn page(
        &self,
        matched: Vec<(Vec<Value>, &Document)>,
        order: Order,
        options: PaginationOptions,
    ) -> Result<PaginationResult<Document>, StoreError> {
        let start = match options.cursor.as_deref() {
            None | Some("") => 0,
            Some(cursor) => {
                let after: Vec<Value> =
                    serde_json::from_str(cursor).map_err(|_| StoreError::InvalidCursor(cursor.to_owned()))?;
                let wanted = if order == Order::Desc { Ordering::Less } else { Ordering::Greater };
                matched.iter().position(|(key, _)| compare_slices(key, &after) == wanted).unwrap_or(matched.len())
            }
        };
        let size = options.num_items.min(self.max_page_size);
        let end = (start + size).min(matched.len());
        let page: Vec<Document> = matched[start..end].iter().map(|(_, doc)| (*doc).clone()).collect();
        let continue_cursor = match matched[start..end].last() {
            Some((key, _)) => serde_json::to_string(key).map_err(|e| StoreError::Backend(e.to_string()))?,
            None => options.cursor.unwrap_or_default(),
        };
        Ok(PaginationResult { page, is_done: end >= matched.len(), continue_cursor })
    }
}

fn in_range(range: &IndexRange, doc: &Document) -> bool {
    range
        .fields
        .iter()
        .zip(range.values.iter())
        .all(|(field, value)| compare_values(&doc.field(field), value) == Ordering::Equal)
}

fn sort_key(index: Option<&IndexRange>, seq: u64, doc: &Document) -> Vec<Value> {
    let mut key: Vec<Value> = index.map(|range| range.fields.iter().map(|f| doc.field(f)).collect()).unwrap_or_default();
    key.push(Value::from(doc.creation_time.timestamp_millis()));
    key.push(Value::from(seq));
    key
}

// ------------- Interfaces -------------

impl DatabaseReader for MemoryBackend {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<Document>, StoreError>> {
        let found = lock(&self.documents).map(|documents| documents.get(id).cloned());
        future::ready(found).boxed()
    }

    fn normalize_id(&self, table: &str, raw: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let canonical = match split_id(raw) {
            Some((prefix, seq)) if prefix == table && self.schema.get(table).is_some() => {
                Some(format!("{table}:{seq}"))
            }
            _ => None,
        };
        future::ready(Ok(canonical)).boxed()
    }

    fn query(&self, plan: QueryPlan, fetch: Fetch) -> BoxFuture<'_, Result<QueryOutput, StoreError>> {
        future::ready(self.evaluate(plan, fetch)).boxed()
    }
}

impl DatabaseWriter for MemoryBackend {
    fn insert(&self, table: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<String, StoreError>> {
        future::ready(self.insert_now(table, fields)).boxed()
    }

    fn patch(&self, id: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(self.patch_now(id, fields)).boxed()
    }

    fn replace(&self, id: &str, fields: Map<String, Value>) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(self.replace_now(id, fields)).boxed()
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(self.delete_now(id)).boxed()
    }
}

impl SchedulerHandle for MemoryBackend {
    fn run_at(&self, at: DateTime<Utc>, function: FunctionRef, args: Value) -> BoxFuture<'_, Result<ScheduledId, StoreError>> {
        let scheduled = lock(&self.jobs).map(|mut jobs| jobs.keep(at, function, args));
        if let Ok(id) = &scheduled {
            debug!(id = id.as_str(), %at, "scheduled");
        }
        future::ready(scheduled).boxed()
    }

    fn run_after(&self, delay: Duration, function: FunctionRef, args: Value) -> BoxFuture<'_, Result<ScheduledId, StoreError>> {
        match chrono::Duration::from_std(delay) {
            Ok(delay) => self.run_at(Utc::now() + delay, function, args),
            Err(e) => future::ready(Err(StoreError::Backend(e.to_string()))).boxed(),
        }
    }

    fn cancel(&self, id: &ScheduledId) -> BoxFuture<'_, Result<(), StoreError>> {
        let canceled = lock(&self.jobs).and_then(|mut jobs| jobs.cancel(id));
        future::ready(canceled).boxed()
    }
}

impl BlobReader for MemoryBackend {
    fn get_url(&self, id: &StorageId) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let url = lock(&self.files).map(|files| {
            FileKeeper::seq(id)
                .filter(|seq| files.kept.contains_key(seq))
                .map(|seq| format!("memory://storage/{seq}"))
        });
        future::ready(url).boxed()
    }
}

impl BlobWriter for MemoryBackend {
    fn generate_upload_url(&self) -> BoxFuture<'_, Result<String, StoreError>> {
        let url = lock(&self.files).map(|mut files| {
            files.uploads += 1;
            format!("memory://upload/{}", files.uploads)
        });
        future::ready(url).boxed()
    }

    fn delete(&self, id: &StorageId) -> BoxFuture<'_, Result<(), StoreError>> {
        let deleted = lock(&self.files).and_then(|mut files| {
            FileKeeper::seq(id)
                .and_then(|seq| files.kept.remove(&seq))
                .map(|_| ())
                .ok_or_else(|| StoreError::MissingDocument(id.as_str().to_owned()))
        });
        future::ready(deleted).boxed()
    }
}

/// Identity fixed for the length of one request.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<UserIdentity>);

impl StaticIdentity {
    pub fn new(identity: Option<UserIdentity>) -> Self {
        Self(identity)
    }
}

impl AuthHandle for StaticIdentity {
    fn user_identity(&self) -> BoxFuture<'_, Result<Option<UserIdentity>, StoreError>> {
        future::ready(Ok(self.0.clone())).boxed()
    }
}

impl Deployment for MemoryBackend {
    fn query_handles(&self, identity: Option<UserIdentity>) -> QueryHandles {
        let backend = Arc::new(self.clone());
        QueryHandles { db: backend.clone(), auth: Arc::new(StaticIdentity::new(identity)), storage: backend }
    }

    fn mutation_handles(&self, identity: Option<UserIdentity>) -> MutationHandles {
        let backend = Arc::new(self.clone());
        MutationHandles {
            db_read: backend.clone(),
            db_write: backend.clone(),
            auth: Arc::new(StaticIdentity::new(identity)),
            storage_read: backend.clone(),
            storage_write: backend.clone(),
            scheduler: backend,
        }
    }

    fn action_handles(&self, identity: Option<UserIdentity>) -> ActionHandles {
        let backend = Arc::new(self.clone());
        ActionHandles {
            auth: Arc::new(StaticIdentity::new(identity)),
            storage_read: backend.clone(),
            storage_write: backend.clone(),
            scheduler: backend,
        }
    }
}
