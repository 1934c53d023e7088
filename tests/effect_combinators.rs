use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docfx::effect::{all_successes, suspend, zip_all};
use docfx::error::{DataError, DocNotFound, DomainError, NotUnique, UniqueError};
use docfx::{Cause, Concurrency, Defect, Effect};

fn missing(id: &str) -> Effect<u32, DocNotFound> {
    Effect::fail(DocNotFound::by_id(id))
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&count), count)
}

#[tokio::test]
async fn values_flow_through_map_and_flat_map() {
    let effect = Effect::succeed(2).map(|n| n * 10).flat_map(|n| Effect::succeed(n + 1));
    assert_eq!(effect.run_exit().await, Ok(21));
    let pair = Effect::succeed(1).zip(Effect::succeed("one"));
    assert_eq!(pair.run_exit().await, Ok((1, "one")));
}

#[tokio::test]
async fn building_an_effect_runs_nothing() {
    let (seen, count) = counter();
    let effect = suspend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Effect::succeed(7)
    });
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(effect.run_exit().await, Ok(7));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn widen_lifts_a_failure_into_the_union() {
    let exit = missing("todos:9").widen::<DataError>().run_exit().await;
    assert_eq!(exit, Err(Cause::Fail(DataError::DocNotFound(DocNotFound::by_id("todos:9")))));
}

#[tokio::test]
async fn catch_tag_narrows_what_is_left() {
    let ambiguous: Effect<u32, UniqueError> = Effect::fail(NotUnique { table: "todos".into() }.into());
    let recovered = ambiguous.catch_tag(|_: NotUnique| Effect::succeed(0));
    assert_eq!(recovered.run_exit().await, Ok(0));

    let ambiguous: Effect<u32, UniqueError> = Effect::fail(NotUnique { table: "todos".into() }.into());
    let untouched = ambiguous.catch_tag(|_: DocNotFound| Effect::succeed(0));
    assert_eq!(untouched.run_exit().await, Err(Cause::Fail(NotUnique { table: "todos".into() })));
}

#[tokio::test]
async fn catch_tag_on_the_union_keeps_the_union() {
    let failing: Effect<u32, DataError> = Effect::fail(DomainError::new("Text is required").into());
    let exit = failing.catch_tag(|_: DocNotFound| Effect::succeed(1)).run_exit().await;
    assert_eq!(exit, Err(Cause::Fail(DataError::Domain(DomainError::new("Text is required")))));

    let failing: Effect<u32, DataError> = Effect::fail(DomainError::new("Text is required").into());
    let exit = failing.catch_tag(|e: DomainError| Effect::succeed(e.message.len() as u32)).run_exit().await;
    assert_eq!(exit, Ok(16));
}

#[tokio::test]
async fn try_map_and_map_err_reshape_the_error() {
    let parsed = Effect::succeed("12").try_map(|raw: &str| raw.parse::<u32>().map_err(|e| DomainError::new(e.to_string())));
    assert_eq!(parsed.run_exit().await, Ok(12));
    let rejected = Effect::succeed("twelve")
        .try_map(|raw: &str| raw.parse::<u32>().map_err(|_| DocNotFound::by_id(raw)))
        .map_err(|e| DomainError::new(format!("no such todo: {}", e.id.unwrap_or_default())));
    assert_eq!(rejected.run_exit().await, Err(Cause::Fail(DomainError::new("no such todo: twelve"))));
}

#[tokio::test]
async fn catch_all_replaces_the_error_type() {
    let exit = missing("todos:1")
        .catch_all(|e| Effect::<u32, DomainError>::fail(DomainError::new(format!("lookup failed: {e}"))))
        .run_exit()
        .await;
    assert_eq!(
        exit,
        Err(Cause::Fail(DomainError::new("lookup failed: couldn't find doc with id \"todos:1\"")))
    );
}

#[tokio::test]
async fn optional_and_fallbacks_absorb_failures_only() {
    assert_eq!(missing("a").optional().run_exit().await, Ok(None));
    assert_eq!(missing("a").or_else_succeed(|| 5).run_exit().await, Ok(5));
    let dying: Effect<u32, DocNotFound> = Effect::die(Defect::Panic("gone".into()));
    assert_eq!(dying.optional().run_exit().await, Err(Cause::Die(Defect::Panic("gone".into()))));
}

#[tokio::test]
async fn some_or_fail_turns_absence_into_a_failure() {
    let absent = Effect::succeed(None::<u32>).some_or_fail(|| DocNotFound::by_id("todos:2"));
    assert_eq!(absent.run_exit().await, Err(Cause::Fail(DocNotFound::by_id("todos:2"))));
    let present = Effect::succeed(Some(3u32)).some_or_fail(|| DocNotFound::by_id("todos:2"));
    assert_eq!(present.run_exit().await, Ok(3));
}

#[tokio::test]
async fn exit_reifies_the_outcome() {
    let exit = missing("x").exit().run_exit().await;
    assert_eq!(exit, Ok(Err(Cause::Fail(DocNotFound::by_id("x")))));
}

#[tokio::test]
async fn or_die_keeps_the_user_message() {
    let exit = Effect::<(), DomainError>::fail(DomainError::new("💣")).or_die().run_exit().await;
    let defect = match exit {
        Err(Cause::Die(defect)) => defect,
        other => panic!("defect expected, got {other:?}"),
    };
    assert_eq!(defect.user_message(), Some("💣"));
    assert!(matches!(defect, Defect::Tagged { tag: "DomainError", .. }));
}

#[tokio::test]
async fn panics_inside_combinators_become_defects() {
    let effect = Effect::succeed(1).map(|_: i32| -> i32 { panic!("inside map") });
    assert_eq!(effect.run_exit().await, Err(Cause::Die(Defect::Panic("inside map".into()))));
}

#[tokio::test]
async fn sequential_batches_stop_at_the_first_failure() {
    let (seen, count) = counter();
    let batch = vec![
        missing("a"),
        Effect::sync(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            1
        })
        .widen(),
    ];
    let exit = zip_all(batch, Concurrency::Sequential).run_exit().await;
    assert_eq!(exit, Err(Cause::Fail(DocNotFound::by_id("a"))));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_batches_report_every_failure() {
    let batch = vec![missing("a"), Effect::succeed(1).widen(), missing("b")];
    let exit = zip_all(batch, Concurrency::Unbounded).run_exit().await;
    assert_eq!(
        exit,
        Err(Cause::Parallel(vec![Cause::Fail(DocNotFound::by_id("a")), Cause::Fail(DocNotFound::by_id("b"))]))
    );
}

#[tokio::test]
async fn bounded_batches_keep_input_order() {
    let exit = zip_all((1..=5).map(Effect::succeed), Concurrency::Bounded(2)).run_exit().await;
    assert_eq!(exit, Ok(vec![1, 2, 3, 4, 5]));
    let empty: Vec<Effect<u32>> = Vec::new();
    assert_eq!(zip_all(empty, Concurrency::Unbounded).run_exit().await, Ok(Vec::new()));
}

#[tokio::test]
async fn recovering_from_parallel_failures_takes_the_first() {
    let batch = vec![missing("1"), missing("2")];
    let exit = zip_all(batch, Concurrency::Unbounded)
        .catch_all(|e| Effect::succeed(e.id.iter().filter_map(|id| id.parse().ok()).collect()))
        .run_exit()
        .await;
    assert_eq!(exit, Ok(vec![1]));
}

#[tokio::test]
async fn all_successes_drops_failures_and_defects() {
    let batch = vec![
        missing("a"),
        Effect::succeed(3).widen(),
        Effect::die(Defect::Panic("p".into())),
        Effect::succeed(4).widen(),
    ];
    assert_eq!(all_successes(batch).run_exit().await, Ok(vec![3, 4]));
}
