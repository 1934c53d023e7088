//! Named handler registry and the call interface in front of it.
//!
//! Handlers are registered by path together with their invocation kind. A call names the
//! kind and path, carries JSON arguments and an optional caller identity, and gets back a
//! JSON value or a [`ProtocolError`]. Each call gets a request id and is logged with its
//! elapsed time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::capability::{ActionCaps, MutationCaps, QueryCaps, SubsetOf};
use crate::context::{ActionCtx, MutationCtx, QueryCtx};
use crate::effect::Effect;
use crate::error::TaggedError;
use crate::runner::{Deployment, Fault, run_action, run_mutation, run_query};
use crate::store::UserIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Query,
    Mutation,
    Action,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FunctionKind::Query => "query",
            FunctionKind::Mutation => "mutation",
            FunctionKind::Action => "action",
        })
    }
}

/// What a caller gets back when a call does not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{message}")]
    User { message: String },
    /// Opaque to the client; details stay in the server log.
    #[error("Server Error")]
    Platform,
    #[error("no function registered at \"{0}\"")]
    UnknownFunction(String),
    #[error("\"{path}\" is a {actual}, not a {requested}")]
    WrongKind { path: String, requested: FunctionKind, actual: FunctionKind },
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

impl<E> From<Fault<E>> for ProtocolError {
    fn from(fault: Fault<E>) -> Self {
        match fault {
            Fault::User { message } => ProtocolError::User { message },
            _ => ProtocolError::Platform,
        }
    }
}

type Handler =
    Box<dyn Fn(Arc<dyn Deployment>, Option<UserIdentity>, Value) -> BoxFuture<'static, Result<Value, ProtocolError>> + Send + Sync>;

struct Registered {
    kind: FunctionKind,
    handler: Handler,
}

/// Builder for the set of callable functions.
#[derive(Default)]
pub struct Functions {
    registered: HashMap<String, Registered>,
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query<Args, Out, E, R, F>(self, path: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        E: TaggedError,
        R: SubsetOf<QueryCaps>,
        F: Fn(QueryCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            path,
            FunctionKind::Query,
            Box::new(move |deployment: Arc<dyn Deployment>, identity: Option<UserIdentity>, raw: Value| {
                call_query(Arc::clone(&handler), deployment, identity, raw).boxed()
            }),
        )
    }

    pub fn mutation<Args, Out, E, R, F>(self, path: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        E: TaggedError,
        R: SubsetOf<MutationCaps>,
        F: Fn(MutationCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            path,
            FunctionKind::Mutation,
            Box::new(move |deployment: Arc<dyn Deployment>, identity: Option<UserIdentity>, raw: Value| {
                call_mutation(Arc::clone(&handler), deployment, identity, raw).boxed()
            }),
        )
    }

    pub fn action<Args, Out, E, R, F>(self, path: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        E: TaggedError,
        R: SubsetOf<ActionCaps>,
        F: Fn(ActionCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            path,
            FunctionKind::Action,
            Box::new(move |deployment: Arc<dyn Deployment>, identity: Option<UserIdentity>, raw: Value| {
                call_action(Arc::clone(&handler), deployment, identity, raw).boxed()
            }),
        )
    }

    fn register(mut self, path: &str, kind: FunctionKind, handler: Handler) -> Self {
        if self.registered.insert(path.to_owned(), Registered { kind, handler }).is_some() {
            warn!(path, "function registered twice, keeping the later one");
        }
        self
    }

    pub fn kind_of(&self, path: &str) -> Option<FunctionKind> {
        self.registered.get(path).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

/// Null arguments are read as no arguments at all.
fn decode_args<Args: DeserializeOwned>(raw: Value) -> Result<Args, ProtocolError> {
    let decoded = if raw.is_null() {
        serde_json::from_value(Value::Null).or_else(|_| serde_json::from_value(Value::Object(Map::new())))
    } else {
        serde_json::from_value(raw)
    };
    decoded.map_err(|e| ProtocolError::InvalidArgs(e.to_string()))
}

fn encode_result<Out: Serialize>(out: Out) -> Result<Value, ProtocolError> {
    serde_json::to_value(out).map_err(|e| {
        error!(error = %e, "result is not serializable");
        ProtocolError::Platform
    })
}

async fn call_query<Args, Out, E, R, F>(
    handler: Arc<F>,
    deployment: Arc<dyn Deployment>,
    identity: Option<UserIdentity>,
    raw: Value,
) -> Result<Value, ProtocolError>
where
    Args: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    E: TaggedError,
    R: SubsetOf<QueryCaps>,
    F: Fn(QueryCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
{
    let args: Args = decode_args(raw)?;
    let out = run_query(deployment.query_handles(identity), |ctx| handler(ctx, args)).await?;
    encode_result(out)
}

async fn call_mutation<Args, Out, E, R, F>(
    handler: Arc<F>,
    deployment: Arc<dyn Deployment>,
    identity: Option<UserIdentity>,
    raw: Value,
) -> Result<Value, ProtocolError>
where
    Args: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    E: TaggedError,
    R: SubsetOf<MutationCaps>,
    F: Fn(MutationCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
{
    let args: Args = decode_args(raw)?;
    let out = run_mutation(deployment.mutation_handles(identity), |ctx| handler(ctx, args)).await?;
    encode_result(out)
}

async fn call_action<Args, Out, E, R, F>(
    handler: Arc<F>,
    deployment: Arc<dyn Deployment>,
    identity: Option<UserIdentity>,
    raw: Value,
) -> Result<Value, ProtocolError>
where
    Args: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    E: TaggedError,
    R: SubsetOf<ActionCaps>,
    F: Fn(ActionCtx, Args) -> Effect<Out, E, R> + Send + Sync + 'static,
{
    let args: Args = decode_args(raw)?;
    let out = run_action(deployment.action_handles(identity), |ctx| handler(ctx, args)).await?;
    encode_result(out)
}

/// Dispatches calls to registered functions against one deployment.
pub struct FunctionInterface {
    deployment: Arc<dyn Deployment>,
    functions: Functions,
    next_id: AtomicU64,
}

impl FunctionInterface {
    pub fn new(deployment: Arc<dyn Deployment>, functions: Functions) -> Self {
        Self { deployment, functions, next_id: AtomicU64::new(0) }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn functions(&self) -> &Functions {
        &self.functions
    }

    pub async fn call(
        &self,
        kind: FunctionKind,
        path: &str,
        args: Value,
        identity: Option<UserIdentity>,
    ) -> Result<Value, ProtocolError> {
        let id = self.allocate_id();
        let started = Instant::now();
        let Some(registered) = self.functions.registered.get(path) else {
            warn!(id, path, %kind, "unknown function");
            return Err(ProtocolError::UnknownFunction(path.to_owned()));
        };
        if registered.kind != kind {
            warn!(id, path, requested = %kind, actual = %registered.kind, "wrong function kind");
            return Err(ProtocolError::WrongKind { path: path.to_owned(), requested: kind, actual: registered.kind });
        }
        let result = (registered.handler)(Arc::clone(&self.deployment), identity, args).await;
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => info!(id, path, %kind, ms, "function complete"),
            Err(e) => warn!(id, path, %kind, ms, error = %e, "function failed"),
        }
        result
    }
}
