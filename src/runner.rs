//! Boundary runner: drives a handler's effect to completion with a fresh registry and
//! translates the outcome for the protocol layer.

use std::sync::Arc;

use thiserror::Error;
use tracing::{Instrument, error, info_span, warn};

use crate::capability::{
    ActionCaps, BlobRead, BlobWrite, DbRead, DbWrite, Identity, MutationCaps, QueryCaps, Registry, Schedule, SubsetOf,
};
use crate::context::{ActionCtx, Auth, DbReader, DbWriter, MutationCtx, QueryCtx, Scheduler, StorageReader, StorageWriter};
use crate::effect::{Cause, Defect, Effect};
use crate::error::TaggedError;
use crate::store::{AuthHandle, BlobReader, BlobWriter, DatabaseReader, DatabaseWriter, SchedulerHandle, UserIdentity};

/// How a handler's effect ended when it did not succeed.
#[derive(Debug, Error)]
pub enum Fault<E> {
    /// A failure whose message the client may see.
    #[error("{message}")]
    User { message: String },
    /// A declared failure that is not meant for the client.
    #[error("handler failed: {0}")]
    Failure(E),
    #[error("defect: {0}")]
    Defect(Defect),
    /// Several sibling failures reached the boundary together.
    #[error("unrecognized failure: {0}")]
    Unrecognized(Cause<E>),
}

impl<E> Fault<E> {
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Fault::User { message } => Some(message),
            _ => None,
        }
    }
}

/// Runs an effect with nothing left to provide.
pub async fn run<A, E>(effect: Effect<A, E>) -> Result<A, Fault<E>>
where
    A: Send + 'static,
    E: TaggedError,
{
    effect.run_exit().await.map_err(translate)
}

fn translate<E: TaggedError>(cause: Cause<E>) -> Fault<E> {
    match cause {
        Cause::Fail(failure) => match failure.user_message() {
            Some(message) => Fault::User { message },
            None => {
                warn!(tag = failure.tag(), error = %failure, "declared failure reached the boundary");
                Fault::Failure(failure)
            }
        },
        Cause::Die(defect) => match defect.user_message() {
            Some(message) => Fault::User { message: message.to_owned() },
            None => {
                error!(%defect, "defect");
                Fault::Defect(defect)
            }
        },
        parallel => {
            error!(
                shape = parallel.shape(),
                failures = parallel.failures().len(),
                defects = parallel.defects().len(),
                cause = %parallel,
                "unrecognized failure shape at boundary"
            );
            Fault::Unrecognized(parallel)
        }
    }
}

// ------------- Per-kind handles -------------

#[derive(Clone)]
pub struct QueryHandles {
    pub db: Arc<dyn DatabaseReader>,
    pub auth: Arc<dyn AuthHandle>,
    pub storage: Arc<dyn BlobReader>,
}

impl QueryHandles {
    pub fn registry(&self) -> Registry {
        Registry::new()
            .with::<DbRead>(Arc::clone(&self.db))
            .with::<Identity>(Arc::clone(&self.auth))
            .with::<BlobRead>(Arc::clone(&self.storage))
    }

    pub fn context(&self) -> QueryCtx {
        QueryCtx {
            db: DbReader::new(Arc::clone(&self.db)),
            auth: Auth::new(Arc::clone(&self.auth)),
            storage: StorageReader::new(Arc::clone(&self.storage)),
        }
    }
}

#[derive(Clone)]
pub struct MutationHandles {
    pub db_read: Arc<dyn DatabaseReader>,
    pub db_write: Arc<dyn DatabaseWriter>,
    pub auth: Arc<dyn AuthHandle>,
    pub storage_read: Arc<dyn BlobReader>,
    pub storage_write: Arc<dyn BlobWriter>,
    pub scheduler: Arc<dyn SchedulerHandle>,
}

impl MutationHandles {
    pub fn registry(&self) -> Registry {
        Registry::new()
            .with::<DbRead>(Arc::clone(&self.db_read))
            .with::<DbWrite>(Arc::clone(&self.db_write))
            .with::<Identity>(Arc::clone(&self.auth))
            .with::<BlobRead>(Arc::clone(&self.storage_read))
            .with::<BlobWrite>(Arc::clone(&self.storage_write))
            .with::<Schedule>(Arc::clone(&self.scheduler))
    }

    pub fn context(&self) -> MutationCtx {
        MutationCtx {
            db: DbWriter::new(Arc::clone(&self.db_read), Arc::clone(&self.db_write)),
            auth: Auth::new(Arc::clone(&self.auth)),
            storage: StorageWriter::new(Arc::clone(&self.storage_read), Arc::clone(&self.storage_write)),
            scheduler: Scheduler::new(Arc::clone(&self.scheduler)),
        }
    }
}

#[derive(Clone)]
pub struct ActionHandles {
    pub auth: Arc<dyn AuthHandle>,
    pub storage_read: Arc<dyn BlobReader>,
    pub storage_write: Arc<dyn BlobWriter>,
    pub scheduler: Arc<dyn SchedulerHandle>,
}

impl ActionHandles {
    pub fn registry(&self) -> Registry {
        Registry::new()
            .with::<Identity>(Arc::clone(&self.auth))
            .with::<BlobRead>(Arc::clone(&self.storage_read))
            .with::<BlobWrite>(Arc::clone(&self.storage_write))
            .with::<Schedule>(Arc::clone(&self.scheduler))
    }

    pub fn context(&self) -> ActionCtx {
        ActionCtx {
            auth: Auth::new(Arc::clone(&self.auth)),
            storage: StorageWriter::new(Arc::clone(&self.storage_read), Arc::clone(&self.storage_write)),
            scheduler: Scheduler::new(Arc::clone(&self.scheduler)),
        }
    }
}

/// Supplies the raw handles for one invocation of each kind.
pub trait Deployment: Send + Sync {
    fn query_handles(&self, identity: Option<UserIdentity>) -> QueryHandles;
    fn mutation_handles(&self, identity: Option<UserIdentity>) -> MutationHandles;
    fn action_handles(&self, identity: Option<UserIdentity>) -> ActionHandles;
}

// ------------- Per-kind runners -------------

/// Runs a query handler. Its effect may only require what a query supplies.
pub async fn run_query<A, E, R, F>(handles: QueryHandles, handler: F) -> Result<A, Fault<E>>
where
    A: Send + 'static,
    E: TaggedError,
    R: SubsetOf<QueryCaps>,
    F: FnOnce(QueryCtx) -> Effect<A, E, R>,
{
    let effect = handler(handles.context()).scoped(handles.registry());
    run(effect).instrument(info_span!("query")).await
}

pub async fn run_mutation<A, E, R, F>(handles: MutationHandles, handler: F) -> Result<A, Fault<E>>
where
    A: Send + 'static,
    E: TaggedError,
    R: SubsetOf<MutationCaps>,
    F: FnOnce(MutationCtx) -> Effect<A, E, R>,
{
    let effect = handler(handles.context()).scoped(handles.registry());
    run(effect).instrument(info_span!("mutation")).await
}

/// Runs an action handler. Actions never see a database handle.
pub async fn run_action<A, E, R, F>(handles: ActionHandles, handler: F) -> Result<A, Fault<E>>
where
    A: Send + 'static,
    E: TaggedError,
    R: SubsetOf<ActionCaps>,
    F: FnOnce(ActionCtx) -> Effect<A, E, R>,
{
    let effect = handler(handles.context()).scoped(handles.registry());
    run(effect).instrument(info_span!("action")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, DocNotFound, DomainError, NotLoggedIn};

    #[tokio::test]
    async fn user_facing_failures_keep_only_their_message() {
        let fault = run(Effect::<(), DataError>::fail(DomainError::new("Title is required").into())).await.unwrap_err();
        assert_eq!(fault.user_message(), Some("Title is required"));
        let fault = run(Effect::<(), NotLoggedIn>::fail(NotLoggedIn)).await.unwrap_err();
        assert_eq!(fault.user_message(), Some("You must be logged in to perform this action."));
    }

    #[tokio::test]
    async fn other_failures_stay_opaque() {
        let fault = run(Effect::<(), DocNotFound>::fail(DocNotFound::by_id("todos:1"))).await.unwrap_err();
        assert!(matches!(fault, Fault::Failure(DocNotFound { .. })));
        let promoted = run(Effect::<(), DomainError>::fail(DomainError::new("shown anyway")).or_die()).await.unwrap_err();
        assert_eq!(promoted.user_message(), Some("shown anyway"));
    }
}
