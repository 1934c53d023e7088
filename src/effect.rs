//! Deferred computations with typed success, failure and capability channels.
//!
//! An [`Effect<A, E, R>`] describes work that, once run, yields an `A`, fails with an `E`,
//! or dies with a [`Defect`]. `R` is the [`CapSet`] of slots that must be provided before
//! it can run. Nothing happens on construction. Evaluation starts only when a runner drives
//! the effect, and every external call is a suspension point on a single task.
//!
//! Failures travel as a [`Cause`]: declared failures (`Fail`), defects (`Die`), or several
//! causes from siblings that failed together (`Parallel`). Panics raised while an effect is
//! evaluated are caught and reported as defects.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{Instrument, debug, warn};

use crate::capability::{Both, CapSet, Capability, Discharge, NoCaps, Registry, Union};
use crate::error::{Extract, SchemaError, StoreError, TaggedError};

// ------------- Causes -------------

/// A failure nobody declared: a promoted tagged error, a store or schema failure, a
/// missing capability or a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("{tag}: {message}")]
    Tagged { tag: &'static str, message: String, user_message: Option<String> },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("capability \"{0}\" was not provided")]
    MissingCapability(&'static str),
    #[error("panicked: {0}")]
    Panic(String),
}

impl Defect {
    pub fn tagged<E: TaggedError + ?Sized>(error: &E) -> Self {
        Self::Tagged { tag: error.tag(), message: error.to_string(), user_message: error.user_message() }
    }

    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Tagged { user_message, .. } => user_message.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cause<E> {
    Fail(E),
    Die(Defect),
    /// Causes of sibling computations that failed together.
    Parallel(Vec<Cause<E>>),
}

pub type Exit<A, E> = Result<A, Cause<E>>;

impl<E> Cause<E> {
    pub fn map_fail<E2, F>(self, f: &mut F) -> Cause<E2>
    where
        F: FnMut(E) -> E2,
    {
        match self {
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Die(d) => Cause::Die(d),
            Cause::Parallel(causes) => {
                let mut mapped = Vec::with_capacity(causes.len());
                for cause in causes {
                    mapped.push(cause.map_fail(&mut *f));
                }
                Cause::Parallel(mapped)
            }
        }
    }

    /// Turns every declared failure into a defect, keeping the shape.
    pub fn into_defects<E2>(self) -> Cause<E2>
    where
        E: TaggedError,
    {
        match self {
            Cause::Fail(e) => Cause::Die(Defect::tagged(&e)),
            Cause::Die(d) => Cause::Die(d),
            Cause::Parallel(causes) => Cause::Parallel(causes.into_iter().map(Cause::into_defects).collect()),
        }
    }

    pub fn failures(&self) -> Vec<&E> {
        match self {
            Cause::Fail(e) => vec![e],
            Cause::Die(_) => Vec::new(),
            Cause::Parallel(causes) => causes.iter().flat_map(Cause::failures).collect(),
        }
    }

    pub fn defects(&self) -> Vec<&Defect> {
        match self {
            Cause::Fail(_) => Vec::new(),
            Cause::Die(d) => vec![d],
            Cause::Parallel(causes) => causes.iter().flat_map(Cause::defects).collect(),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Cause::Fail(_) => "fail",
            Cause::Die(_) => "die",
            Cause::Parallel(_) => "parallel",
        }
    }

    fn from_defects(mut defects: Vec<Defect>) -> Self {
        if defects.len() == 1 {
            Cause::Die(defects.swap_remove(0))
        } else {
            Cause::Parallel(defects.into_iter().map(Cause::Die).collect())
        }
    }

    fn split(self, failures: &mut Vec<E>, defects: &mut Vec<Defect>) {
        match self {
            Cause::Fail(e) => failures.push(e),
            Cause::Die(d) => defects.push(d),
            Cause::Parallel(causes) => {
                for cause in causes {
                    cause.split(failures, defects);
                }
            }
        }
    }

    /// The first declared failure, as long as nothing in the cause died. Defects win and
    /// are handed back unchanged.
    fn recoverable<E2>(self) -> Result<E, Cause<E2>> {
        let mut failures = Vec::new();
        let mut defects = Vec::new();
        self.split(&mut failures, &mut defects);
        if !defects.is_empty() {
            return Err(Cause::from_defects(defects));
        }
        if failures.len() > 1 {
            debug!(dropped = failures.len() - 1, "recovering from first of several sibling failures");
        }
        match failures.into_iter().next() {
            Some(first) => Ok(first),
            None => Err(Cause::Parallel(Vec::new())),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Fail(e) => write!(f, "fail({e})"),
            Cause::Die(d) => write!(f, "die({d})"),
            Cause::Parallel(causes) => {
                write!(f, "parallel[")?;
                for (i, cause) in causes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{cause}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ------------- Effect -------------

type Thunk<A, E> = Box<dyn FnOnce(Registry) -> BoxFuture<'static, Exit<A, E>> + Send>;

/// A deferred computation yielding `A`, failing with `E`, requiring capabilities `R`.
#[must_use = "effects do nothing unless they are run"]
pub struct Effect<A, E = Infallible, R = NoCaps> {
    thunk: Thunk<A, E>,
    requires: PhantomData<fn() -> R>,
}

impl<A, E, R> fmt::Debug for Effect<A, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect(..)")
    }
}

impl<A: Send + 'static> Effect<A, Infallible, NoCaps> {
    pub fn succeed(value: A) -> Self {
        Self::from_thunk(move |_| future::ready(Ok(value)).boxed())
    }

    /// Runs `f` when the effect is evaluated, not when it is built.
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce() -> A + Send + 'static,
    {
        Self::from_thunk(move |_| async move { Ok(f()) }.boxed())
    }

    /// Wraps one external call. Store failures become defects.
    pub fn from_store<Fut>(call: Fut) -> Self
    where
        Fut: Future<Output = Result<A, StoreError>> + Send + 'static,
    {
        Self::from_thunk(move |_| call.map(|result| result.map_err(|e| Cause::Die(Defect::Store(e)))).boxed())
    }
}

impl<A: Send + 'static, E: Send + 'static> Effect<A, E, NoCaps> {
    pub fn fail(error: E) -> Self {
        Self::from_thunk(move |_| future::ready(Err(Cause::Fail(error))).boxed())
    }

    pub fn die(defect: impl Into<Defect>) -> Self {
        let defect = defect.into();
        Self::from_thunk(move |_| future::ready(Err(Cause::Die(defect))).boxed())
    }

    pub fn from_result(result: Result<A, E>) -> Self {
        Self::from_thunk(move |_| future::ready(result.map_err(Cause::Fail)).boxed())
    }

    pub fn try_sync<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<A, E> + Send + 'static,
    {
        Self::from_thunk(move |_| async move { f().map_err(Cause::Fail) }.boxed())
    }

    /// Evaluates the effect with an empty registry, turning panics into defects.
    pub async fn run_exit(self) -> Exit<A, E> {
        let thunk = self.thunk;
        let evaluation = AssertUnwindSafe(async move { thunk(Registry::new()).await }).catch_unwind();
        match evaluation.await {
            Ok(exit) => exit,
            Err(payload) => Err(Cause::Die(Defect::Panic(panic_message(&*payload)))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl<A, E, R> Effect<A, E, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: CapSet,
{
    pub(crate) fn from_thunk<F>(thunk: F) -> Self
    where
        F: FnOnce(Registry) -> BoxFuture<'static, Exit<A, E>> + Send + 'static,
    {
        Self { thunk: Box::new(thunk), requires: PhantomData }
    }

    pub(crate) fn evaluate(self, registry: Registry) -> BoxFuture<'static, Exit<A, E>> {
        (self.thunk)(registry)
    }

    /// Evaluates against a fixed registry, dropping the requirement from the type.
    pub(crate) fn scoped(self, scope: Registry) -> Effect<A, E, NoCaps> {
        let thunk = self.thunk;
        Effect::from_thunk(move |_| thunk(scope))
    }

    pub fn map<B, F>(self, f: F) -> Effect<B, E, R>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| thunk(registry).map(move |exit| exit.map(f)).boxed())
    }

    pub fn map_err<E2, F>(self, f: F) -> Effect<A, E2, R>
    where
        E2: Send + 'static,
        F: FnMut(E) -> E2 + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| {
            thunk(registry)
                .map(move |exit| {
                    let mut f = f;
                    exit.map_err(|cause| cause.map_fail(&mut f))
                })
                .boxed()
        })
    }

    /// Widens the error type into a union containing it.
    pub fn widen<E2>(self) -> Effect<A, E2, R>
    where
        E: Into<E2>,
        E2: Send + 'static,
    {
        self.map_err(Into::into)
    }

    /// Sequences `f` after this effect. `f` is not called until this effect succeeds.
    pub fn flat_map<B, E2, R2, F>(self, f: F) -> Effect<B, E2, Both<R, R2>>
    where
        B: Send + 'static,
        E: Into<E2>,
        E2: Send + 'static,
        R: Union<R2>,
        R2: CapSet,
        F: FnOnce(A) -> Effect<B, E2, R2> + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| bind(thunk, f, registry).boxed())
    }

    pub fn try_map<B, E2, F>(self, f: F) -> Effect<B, E2, R>
    where
        B: Send + 'static,
        E: Into<E2>,
        E2: Send + 'static,
        F: FnOnce(A) -> Result<B, E2> + Send + 'static,
    {
        self.and_then_exit(move |a| f(a).map_err(Cause::Fail))
    }

    pub(crate) fn and_then_exit<B, E2, F>(self, f: F) -> Effect<B, E2, R>
    where
        B: Send + 'static,
        E: Into<E2>,
        E2: Send + 'static,
        F: FnOnce(A) -> Exit<B, E2> + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| {
            thunk(registry)
                .map(move |exit| match exit {
                    Ok(a) => f(a),
                    Err(cause) => Err(cause.map_fail(&mut |e: E| e.into())),
                })
                .boxed()
        })
    }

    /// Recovers from failures tagged `T`; other failures keep propagating and the error
    /// type shrinks to what is left.
    pub fn catch_tag<T, E2, R2, F>(self, f: F) -> Effect<A, <E as Extract<T>>::Rest, Both<R, R2>>
    where
        E: Extract<T>,
        T: Send + 'static,
        E2: Into<<E as Extract<T>>::Rest> + Send + 'static,
        R: Union<R2>,
        R2: CapSet,
        F: FnOnce(T) -> Effect<A, E2, R2> + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| catch_tagged(thunk, f, registry).boxed())
    }

    pub fn catch_all<E2, R2, F>(self, f: F) -> Effect<A, E2, Both<R, R2>>
    where
        E2: Send + 'static,
        R: Union<R2>,
        R2: CapSet,
        F: FnOnce(E) -> Effect<A, E2, R2> + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| catch_any(thunk, f, registry).boxed())
    }

    /// Any declared failure becomes `fallback()`. Defects still propagate.
    pub fn or_else_succeed<F>(self, fallback: F) -> Effect<A, Infallible, R>
    where
        F: FnOnce() -> A + Send + 'static,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| {
            thunk(registry)
                .map(move |exit| match exit {
                    Ok(a) => Ok(a),
                    Err(cause) => cause.recoverable().map(|_| fallback()),
                })
                .boxed()
        })
    }

    pub fn optional(self) -> Effect<Option<A>, Infallible, R> {
        self.map(Some).or_else_succeed(|| None)
    }

    /// Promotes declared failures to defects.
    pub fn or_die(self) -> Effect<A, Infallible, R>
    where
        E: TaggedError,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| thunk(registry).map(|exit| exit.map_err(Cause::into_defects)).boxed())
    }

    /// Reifies the outcome as a value.
    pub fn exit(self) -> Effect<Exit<A, E>, Infallible, R> {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| thunk(registry).map(Ok).boxed())
    }

    pub fn zip<B, R2>(self, other: Effect<B, E, R2>) -> Effect<(A, B), E, Both<R, R2>>
    where
        B: Send + 'static,
        R: Union<R2>,
        R2: CapSet,
    {
        let left = self.thunk;
        let right = other.thunk;
        Effect::from_thunk(move |registry| zip_pair(left, right, registry).boxed())
    }

    /// Makes `C` resolve to `handle` while this effect runs.
    pub fn provide<C>(self, handle: Arc<C::Handle>) -> Effect<A, E, <R as Discharge<C>>::Output>
    where
        C: Capability,
        R: Discharge<C>,
    {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry: Registry| thunk(registry.with::<C>(handle)))
    }

    /// Runs the evaluation inside a tracing span.
    pub fn named(self, name: &'static str) -> Self {
        let thunk = self.thunk;
        Effect::from_thunk(move |registry| thunk(registry).instrument(tracing::debug_span!("effect", name)).boxed())
    }
}

impl<A, E, R> Effect<Option<A>, E, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: CapSet,
{
    /// Fails with `missing()` when the value is absent.
    pub fn some_or_fail<E2, F>(self, missing: F) -> Effect<A, E2, R>
    where
        E: Into<E2>,
        E2: Send + 'static,
        F: FnOnce() -> E2 + Send + 'static,
    {
        self.try_map(move |found| found.ok_or_else(missing))
    }
}

async fn bind<A, B, E, E2, R2, F>(first: Thunk<A, E>, f: F, registry: Registry) -> Exit<B, E2>
where
    B: Send + 'static,
    E: Into<E2>,
    E2: Send + 'static,
    R2: CapSet,
    F: FnOnce(A) -> Effect<B, E2, R2>,
{
    let value = match first(registry.clone()).await {
        Ok(value) => value,
        Err(cause) => return Err(cause.map_fail(&mut |e: E| e.into())),
    };
    f(value).evaluate(registry).await
}

async fn catch_tagged<A, E, T, E2, R2, F>(first: Thunk<A, E>, f: F, registry: Registry) -> Exit<A, <E as Extract<T>>::Rest>
where
    A: Send + 'static,
    E: Extract<T>,
    E2: Into<<E as Extract<T>>::Rest> + Send + 'static,
    R2: CapSet,
    F: FnOnce(T) -> Effect<A, E2, R2>,
{
    let cause = match first(registry.clone()).await {
        Ok(value) => return Ok(value),
        Err(cause) => cause,
    };
    let error = match cause.recoverable() {
        Ok(error) => error,
        Err(unrecovered) => return Err(unrecovered),
    };
    match error.extract() {
        Ok(matched) => f(matched).evaluate(registry).await.map_err(|cause| cause.map_fail(&mut |e: E2| e.into())),
        Err(rest) => Err(Cause::Fail(rest)),
    }
}

async fn catch_any<A, E, E2, R2, F>(first: Thunk<A, E>, f: F, registry: Registry) -> Exit<A, E2>
where
    A: Send + 'static,
    E2: Send + 'static,
    R2: CapSet,
    F: FnOnce(E) -> Effect<A, E2, R2>,
{
    let cause = match first(registry.clone()).await {
        Ok(value) => return Ok(value),
        Err(cause) => cause,
    };
    match cause.recoverable() {
        Ok(error) => f(error).evaluate(registry).await,
        Err(unrecovered) => Err(unrecovered),
    }
}

async fn zip_pair<A, B, E>(left: Thunk<A, E>, right: Thunk<B, E>, registry: Registry) -> Exit<(A, B), E> {
    let a = left(registry.clone()).await?;
    let b = right(registry).await?;
    Ok((a, b))
}

// ------------- Combining many -------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// One after another; the first failure stops the batch.
    #[default]
    Sequential,
    /// At most this many in flight at once.
    Bounded(usize),
    /// All interleaved on the current task.
    Unbounded,
}

/// Runs every effect and collects the results in input order. Under `Unbounded` or
/// `Bounded` every sibling completes; several failures are reported together as
/// [`Cause::Parallel`].
pub fn zip_all<A, E, R, I>(effects: I, concurrency: Concurrency) -> Effect<Vec<A>, E, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: CapSet,
    I: IntoIterator<Item = Effect<A, E, R>>,
{
    let thunks: Vec<Thunk<A, E>> = effects.into_iter().map(|effect| effect.thunk).collect();
    Effect::from_thunk(move |registry| match concurrency {
        Concurrency::Sequential => run_sequential(thunks, registry).boxed(),
        Concurrency::Bounded(limit) => run_bounded(thunks, limit, registry).boxed(),
        Concurrency::Unbounded => run_unbounded(thunks, registry).boxed(),
    })
}

/// Runs every effect and keeps only the successes. Never fails.
pub fn all_successes<A, E, R, I>(effects: I) -> Effect<Vec<A>, Infallible, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: CapSet,
    I: IntoIterator<Item = Effect<A, E, R>>,
{
    let thunks: Vec<Thunk<A, E>> = effects.into_iter().map(|effect| effect.thunk).collect();
    Effect::from_thunk(move |registry| keep_successes(thunks, registry).boxed())
}

/// Builds the effect only when it is evaluated.
pub fn suspend<A, E, R, F>(f: F) -> Effect<A, E, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: CapSet,
    F: FnOnce() -> Effect<A, E, R> + Send + 'static,
{
    Effect::from_thunk(move |registry| f().evaluate(registry))
}

/// Resolves the handle provided for slot `C`.
pub fn require<C: Capability>() -> Effect<Arc<C::Handle>, Infallible, C::Requires> {
    Effect::from_thunk(|registry: Registry| {
        let resolved = registry.resolve::<C>().ok_or(Cause::Die(Defect::MissingCapability(C::NAME)));
        future::ready(resolved).boxed()
    })
}

async fn run_sequential<A, E>(thunks: Vec<Thunk<A, E>>, registry: Registry) -> Exit<Vec<A>, E> {
    let mut values = Vec::with_capacity(thunks.len());
    for thunk in thunks {
        values.push(thunk(registry.clone()).await?);
    }
    Ok(values)
}

async fn run_bounded<A, E>(thunks: Vec<Thunk<A, E>>, limit: usize, registry: Registry) -> Exit<Vec<A>, E> {
    let pending: Vec<BoxFuture<'static, Exit<A, E>>> =
        thunks.into_iter().map(|thunk| thunk(registry.clone())).collect();
    let exits: Vec<Exit<A, E>> = stream::iter(pending).buffered(limit.max(1)).collect().await;
    gather(exits)
}

async fn run_unbounded<A, E>(thunks: Vec<Thunk<A, E>>, registry: Registry) -> Exit<Vec<A>, E> {
    let exits = future::join_all(thunks.into_iter().map(|thunk| thunk(registry.clone()))).await;
    gather(exits)
}

async fn keep_successes<A, E>(thunks: Vec<Thunk<A, E>>, registry: Registry) -> Exit<Vec<A>, Infallible> {
    let exits = future::join_all(thunks.into_iter().map(|thunk| thunk(registry.clone()))).await;
    let total = exits.len();
    let mut values = Vec::with_capacity(total);
    for exit in exits {
        match exit {
            Ok(value) => values.push(value),
            Err(Cause::Fail(_)) => {}
            Err(cause) => warn!(shape = cause.shape(), defects = cause.defects().len(), "dropping defect from best-effort batch"),
        }
    }
    debug!(total, succeeded = values.len(), "best-effort batch complete");
    Ok(values)
}

fn gather<A, E>(exits: Vec<Exit<A, E>>) -> Exit<Vec<A>, E> {
    let mut values = Vec::with_capacity(exits.len());
    let mut causes = Vec::new();
    for exit in exits {
        match exit {
            Ok(value) => values.push(value),
            Err(cause) => causes.push(cause),
        }
    }
    match causes.len() {
        0 => Ok(values),
        1 => Err(causes.swap_remove(0)),
        _ => Err(Cause::Parallel(causes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, DocNotFound, DomainError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn nothing_runs_until_evaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let effect = Effect::sync(move || counter.fetch_add(1, Ordering::SeqCst)).map(|n| n + 10);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_exit().await, Ok(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flat_map_stops_at_first_failure() {
        let reached = Arc::new(AtomicUsize::new(0));
        let marker = Arc::clone(&reached);
        let effect: Effect<u32, DataError> = Effect::<u32, DocNotFound>::fail(DocNotFound::by_id("x"))
            .flat_map(move |n| {
                marker.fetch_add(1, Ordering::SeqCst);
                Effect::succeed(n + 1).widen()
            });
        let exit = effect.run_exit().await;
        assert_eq!(exit, Err(Cause::Fail(DataError::DocNotFound(DocNotFound::by_id("x")))));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panics_become_defects() {
        let effect: Effect<u8> = Effect::sync(|| panic!("kaboom"));
        match effect.run_exit().await {
            Err(Cause::Die(Defect::Panic(message))) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected exit {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovery_leaves_defects_alone() {
        let effect: Effect<u8, DomainError> = Effect::die(Defect::MissingCapability("db.read"));
        let exit = effect.or_else_succeed(|| 1).run_exit().await;
        assert_eq!(exit, Err(Cause::Die(Defect::MissingCapability("db.read"))));
    }

    #[test]
    fn parallel_cause_flattens_for_inspection() {
        let cause: Cause<u8> = Cause::Parallel(vec![Cause::Fail(1), Cause::Die(Defect::Panic("p".into())), Cause::Fail(2)]);
        assert_eq!(cause.failures(), vec![&1, &2]);
        assert_eq!(cause.defects().len(), 1);
        assert_eq!(cause.to_string(), "parallel[fail(1), die(panicked: p), fail(2)]");
    }
}
