//! Fluent, immutable query builder over one table.
//!
//! A builder starts as a [`QueryInitializer`], is narrowed by an index lookup or opened as
//! a full table scan into a [`Query`], optionally ordered into an [`OrderedQuery`], and is
//! finally consumed by a terminal (`collect`, `take`, `first`, `unique`, `paginate`, ...)
//! that returns an [`Effect`]. Every step takes the builder by value and returns a new one,
//! and builders are `Clone`, so one base query can be branched freely.
//!
//! A builder obtained from a context value is bound to that context's read handle and
//! requires nothing. One obtained from [`from_table`](crate::access::from_table) resolves
//! the read handle when it runs and carries the read slot in its type.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::capability::{CapSet, Capability, DbRead, NeedsRead, NoCaps, Registry};
use crate::datatype::IndexKey;
use crate::document::{Doc, Document};
use crate::effect::{Cause, Defect, Effect};
use crate::error::{DocNotFound, NotUnique, SchemaError, StoreError, UniqueError};
use crate::filter::Filter;
use crate::schema::{Table, TableDef};
use crate::store::{DatabaseReader, Fetch, IndexRange, Order, PaginationOptions, PaginationResult, QueryOutput, QueryPlan};

#[derive(Clone)]
enum Source {
    Bound(Arc<dyn DatabaseReader>),
    Ambient,
}

#[derive(Clone)]
struct QueryState {
    table: &'static TableDef,
    index: Option<IndexRange>,
    filters: Vec<Filter>,
    order: Order,
}

impl QueryState {
    fn plan(&self) -> QueryPlan {
        QueryPlan {
            table: self.table.name().to_owned(),
            index: self.index.clone(),
            filters: self.filters.clone(),
            order: self.order,
        }
    }
}

struct Core<T, R> {
    source: Source,
    state: QueryState,
    marker: PhantomData<fn() -> (T, R)>,
}

impl<T, R> Clone for Core<T, R> {
    fn clone(&self) -> Self {
        Self { source: self.source.clone(), state: self.state.clone(), marker: PhantomData }
    }
}

fn defect<E>(error: StoreError) -> Cause<E> {
    Cause::Die(Defect::Store(error))
}

fn unexpected(output: &QueryOutput) -> StoreError {
    let shape = match output {
        QueryOutput::Docs(_) => "documents",
        QueryOutput::Doc(_) => "document",
        QueryOutput::Page(_) => "page",
    };
    StoreError::Backend(format!("store answered with an unexpected {shape}"))
}

fn decode_many<T: Table>(output: QueryOutput) -> Result<Vec<Doc<T>>, StoreError> {
    match output {
        QueryOutput::Docs(docs) => docs.into_iter().map(Doc::decode).collect(),
        other => Err(unexpected(&other)),
    }
}

fn decode_one<T: Table>(output: QueryOutput) -> Result<Option<Doc<T>>, StoreError> {
    let found: Option<Document> = match output {
        QueryOutput::Doc(doc) => doc,
        QueryOutput::Docs(docs) => docs.into_iter().next(),
        other => return Err(unexpected(&other)),
    };
    found.map(Doc::decode).transpose()
}

fn decode_page<T: Table>(output: QueryOutput) -> Result<PaginationResult<Doc<T>>, StoreError> {
    match output {
        QueryOutput::Page(result) => Ok(PaginationResult {
            page: result.page.into_iter().map(Doc::decode).collect::<Result<_, _>>()?,
            is_done: result.is_done,
            continue_cursor: result.continue_cursor,
        }),
        other => Err(unexpected(&other)),
    }
}

impl<T: Table, R: CapSet> Core<T, R> {
    fn new(source: Source) -> Self {
        let state = QueryState { table: T::definition(), index: None, filters: Vec::new(), order: Order::Asc };
        Self { source, state, marker: PhantomData }
    }

    fn filtered(mut self, filter: Filter) -> Self {
        self.state.filters.push(filter);
        self
    }

    fn ordered(mut self, order: Order) -> Self {
        self.state.order = order;
        self
    }

    fn narrowed(mut self, range: IndexRange) -> Self {
        self.state.index = Some(range);
        self
    }

    fn table_name(&self) -> String {
        self.state.table.name().to_owned()
    }

    fn fetch(self, fetch: Fetch) -> Effect<QueryOutput, Infallible, R> {
        let Core { source, state, .. } = self;
        let plan = state.plan();
        Effect::from_thunk(move |registry: Registry| {
            let handle = match source {
                Source::Bound(handle) => Some(handle),
                Source::Ambient => registry.resolve::<DbRead>(),
            };
            async move {
                let Some(handle) = handle else {
                    return Err(Cause::Die(Defect::MissingCapability(DbRead::NAME)));
                };
                debug!(table = %plan.table, indexed = plan.index.is_some(), filters = plan.filters.len(), fetch = ?fetch, "query");
                handle.query(plan, fetch).await.map_err(defect)
            }
            .boxed()
        })
    }

    fn collect(self) -> Effect<Vec<Doc<T>>, Infallible, R> {
        self.fetch(Fetch::Collect).and_then_exit(|output| decode_many(output).map_err(defect))
    }

    fn take(self, n: usize) -> Effect<Vec<Doc<T>>, Infallible, R> {
        self.fetch(Fetch::Take(n)).and_then_exit(|output| decode_many(output).map_err(defect))
    }

    fn first(self) -> Effect<Doc<T>, DocNotFound, R> {
        let table = self.table_name();
        self.fetch(Fetch::First).and_then_exit(move |output| match decode_one(output) {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(Cause::Fail(DocNotFound::in_table(table))),
            Err(error) => Err(defect(error)),
        })
    }

    fn first_or_null(self) -> Effect<Option<Doc<T>>, Infallible, R> {
        self.fetch(Fetch::First).and_then_exit(|output| decode_one(output).map_err(defect))
    }

    fn unique(self) -> Effect<Doc<T>, UniqueError, R> {
        let table = self.table_name();
        self.fetch(Fetch::Unique).and_then_exit(move |output| {
            let mut docs: Vec<Doc<T>> = match decode_many(output) {
                Ok(docs) => docs,
                Err(error) => return Err(defect(error)),
            };
            match docs.len() {
                0 => Err(Cause::Fail(DocNotFound::in_table(table).into())),
                1 => docs.pop().ok_or_else(|| defect(StoreError::Backend("document vanished".into()))),
                _ => Err(Cause::Fail(NotUnique { table }.into())),
            }
        })
    }

    fn unique_or_null(self) -> Effect<Option<Doc<T>>, Infallible, R> {
        let table = self.table_name();
        self.fetch(Fetch::Unique).and_then_exit(move |output| {
            let mut docs: Vec<Doc<T>> = match decode_many(output) {
                Ok(docs) => docs,
                Err(error) => return Err(defect(error)),
            };
            if docs.len() > 1 {
                return Err(Cause::Die(Defect::tagged(&NotUnique { table })));
            }
            Ok(docs.pop())
        })
    }

    fn paginate(self, options: PaginationOptions) -> Effect<PaginationResult<Doc<T>>, Infallible, R> {
        self.fetch(Fetch::Paginate(options)).and_then_exit(|output| decode_page(output).map_err(defect))
    }
}

/// A query on table `T` before any index, scan, filter or order is chosen.
pub struct QueryInitializer<T, R = NoCaps> {
    core: Core<T, R>,
}

/// An index-narrowed or full-scan query, not yet ordered.
pub struct Query<T, R = NoCaps> {
    core: Core<T, R>,
}

/// A query with its single order applied. Only filters and terminals remain.
pub struct OrderedQuery<T, R = NoCaps> {
    core: Core<T, R>,
}

impl<T: Table> QueryInitializer<T, NoCaps> {
    pub(crate) fn bound(handle: Arc<dyn DatabaseReader>) -> Self {
        Self { core: Core::new(Source::Bound(handle)) }
    }
}

impl<T: Table> QueryInitializer<T, NeedsRead> {
    pub(crate) fn ambient() -> Self {
        Self { core: Core::new(Source::Ambient) }
    }
}

impl<T: Table, R: CapSet> QueryInitializer<T, R> {
    pub fn full_table_scan(self) -> Query<T, R> {
        Query { core: self.core }
    }

    /// Narrows to documents whose index fields equal `key`, position by position. The key
    /// must supply exactly one correctly typed value per index field.
    pub fn by_index<K: IndexKey>(self, index: &str, key: K) -> Result<Query<T, R>, SchemaError> {
        let range = self.core.state.table.bind_index(index, key)?;
        Ok(Query { core: self.core.narrowed(range) })
    }

    /// Like [`by_index`](Self::by_index) with untyped values, checked against the
    /// declared field types.
    pub fn by_index_values(self, index: &str, values: Vec<Value>) -> Result<Query<T, R>, SchemaError> {
        let range = self.core.state.table.bind_index_values(index, values)?;
        Ok(Query { core: self.core.narrowed(range) })
    }

    pub fn filter(self, filter: Filter) -> Query<T, R> {
        self.full_table_scan().filter(filter)
    }

    pub fn order(self, order: Order) -> OrderedQuery<T, R> {
        self.full_table_scan().order(order)
    }
}

impl<T: Table, R: CapSet> Query<T, R> {
    pub fn filter(self, filter: Filter) -> Self {
        Self { core: self.core.filtered(filter) }
    }

    pub fn order(self, order: Order) -> OrderedQuery<T, R> {
        OrderedQuery { core: self.core.ordered(order) }
    }
}

impl<T: Table, R: CapSet> OrderedQuery<T, R> {
    pub fn filter(self, filter: Filter) -> Self {
        Self { core: self.core.filtered(filter) }
    }
}

macro_rules! terminals {
    ($($builder:ident),+) => {
        $(
            impl<T, R> Clone for $builder<T, R> {
                fn clone(&self) -> Self {
                    Self { core: self.core.clone() }
                }
            }

            impl<T: Table, R: CapSet> $builder<T, R> {
                /// The plan this builder would hand to the store.
                pub fn plan(&self) -> QueryPlan {
                    self.core.state.plan()
                }

                /// Every matching document.
                pub fn collect(self) -> Effect<Vec<Doc<T>>, Infallible, R> {
                    self.core.collect()
                }

                /// At most `n` matching documents.
                pub fn take(self, n: usize) -> Effect<Vec<Doc<T>>, Infallible, R> {
                    self.core.take(n)
                }

                /// The first match; fails with [`DocNotFound`] when nothing matches.
                pub fn first(self) -> Effect<Doc<T>, DocNotFound, R> {
                    self.core.first()
                }

                pub fn first_or_null(self) -> Effect<Option<Doc<T>>, Infallible, R> {
                    self.core.first_or_null()
                }

                /// The only match. Zero matches fail with [`DocNotFound`], several with
                /// [`NotUnique`].
                pub fn unique(self) -> Effect<Doc<T>, UniqueError, R> {
                    self.core.unique()
                }

                /// The only match or `None`. Several matches are a defect.
                pub fn unique_or_null(self) -> Effect<Option<Doc<T>>, Infallible, R> {
                    self.core.unique_or_null()
                }

                pub fn paginate(self, options: PaginationOptions) -> Effect<PaginationResult<Doc<T>>, Infallible, R> {
                    self.core.paginate(options)
                }
            }
        )+
    };
}

terminals!(QueryInitializer, Query, OrderedQuery);
