//! Docfx – a typed effect layer between request handlers and a document store.
//!
//! Handlers declare tables with typed fields and index keys, then read and write documents
//! through lazily evaluated [`effect::Effect`] values. An effect carries three types: what
//! it yields, how it can fail, and which request-scoped capabilities it needs (database
//! read, database write, scheduler, blob read, blob write, identity).
//!
//! ## Modules
//! * [`effect`] – The deferred computation, its [`effect::Cause`] of failure, combinators
//!   for sequencing, recovery by tag and running many at once.
//! * [`capability`] – Type-level capability sets and the per-request [`capability::Registry`].
//! * [`schema`] and [`datatype`] – Table descriptors, field types and typed index keys.
//! * [`query`] – The fluent query builder and its terminals.
//! * [`context`] and [`access`] – Database, storage, scheduler and auth operations, either
//!   through a context value or resolved ambiently from the registry.
//! * [`runner`] – The boundary runner that drives a handler's effect and classifies failures.
//! * [`interface`] and [`server`] – Named functions and the HTTP surface in front of them.
//! * [`memory`] – An in-process store implementing every external interface.
//!
//! ## Quick Start
//! ```
//! use docfx::memory::MemoryBackend;
//! use docfx::runner::{Deployment, run_mutation};
//! use docfx::todos::{self, Todo};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let backend = MemoryBackend::new(todos::schema().unwrap());
//! let handles = backend.mutation_handles(None);
//! let id = run_mutation(handles, |ctx| {
//!     ctx.db.insert(Todo { text: "write docs".into(), completed: false })
//! })
//! .await
//! .unwrap();
//! assert!(id.as_str().starts_with("todos:"));
//! # });
//! ```

pub mod access;
pub mod capability;
pub mod context;
pub mod datatype;
pub mod document;
pub mod effect;
pub mod error;
pub mod filter;
pub mod interface;
pub mod memory;
pub mod query;
pub mod runner;
pub mod schema;
pub mod server;
pub mod settings;
pub mod store;
pub mod todos;

pub use crate::document::{Doc, DocId};
pub use crate::effect::{Cause, Concurrency, Defect, Effect, Exit};
pub use crate::error::{DataError, DocfxError, Result, TaggedError};
pub use crate::schema::{Schema, Table, TableDef};
