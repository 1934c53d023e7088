use std::sync::Arc;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::json;

use docfx::context::{DbReader, DbWriter};
use docfx::datatype::FieldType;
use docfx::effect::{Concurrency, zip_all};
use docfx::error::{DocNotFound, NotUnique, UniqueError};
use docfx::filter::field;
use docfx::memory::MemoryBackend;
use docfx::schema::{FieldDef, Schema, Table, TableDef, define_table};
use docfx::store::{Order, PaginationOptions};
use docfx::{Cause, Defect, Doc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    owner: String,
    rank: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl Table for Task {
    fn definition() -> &'static TableDef {
        lazy_static! {
            static ref TASKS: TableDef = define_table(
                "tasks",
                [
                    FieldDef::new("owner", FieldType::String).indexed(),
                    FieldDef::new("rank", FieldType::Int64),
                    FieldDef::new("note", FieldType::optional(FieldType::String)),
                ],
            )
            .and_then(|t| t.with_index("by_owner_rank", &["owner", "rank"]))
            .expect("tasks table");
        }
        &TASKS
    }
}

fn task(owner: &str, rank: i64) -> Task {
    Task { owner: owner.to_owned(), rank, note: None }
}

async fn setup() -> (MemoryBackend, DbReader) {
    let backend = MemoryBackend::new(Schema::new().with::<Task>().expect("schema"));
    let writer = DbWriter::from_backend(Arc::new(backend.clone()));
    let inserts = [("ann", 3), ("bob", 1), ("ann", 1), ("cid", 7), ("ann", 2)]
        .into_iter()
        .map(|(owner, rank)| writer.insert(task(owner, rank)));
    zip_all(inserts, Concurrency::Sequential).run_exit().await.expect("seed");
    let reader = writer.reader().clone();
    (backend, reader)
}

fn ranks(docs: &[Doc<Task>]) -> Vec<i64> {
    docs.iter().map(|d| d.rank).collect()
}

#[tokio::test]
async fn full_scans_follow_insertion_order() {
    let (_, db) = setup().await;
    let all = db.query::<Task>().full_table_scan().collect().run_exit().await.expect("all");
    assert_eq!(ranks(&all), vec![3, 1, 1, 7, 2]);
    let latest = db.query::<Task>().order(Order::Desc).take(2).run_exit().await.expect("latest");
    assert_eq!(ranks(&latest), vec![2, 7]);
}

#[tokio::test]
async fn index_lookups_order_by_the_index_key() {
    let (_, db) = setup().await;
    let ann = db.query::<Task>().by_index("owner", ("ann",)).expect("lookup");
    assert_eq!(ranks(&ann.clone().collect().run_exit().await.expect("ann")), vec![3, 1, 2]);
    let compound = db.query::<Task>().by_index("by_owner_rank", ("ann", 2i64)).expect("lookup");
    let found = compound.unique().run_exit().await.expect("unique");
    assert_eq!(found.rank, 2);
    assert_eq!(found.owner, "ann");
}

#[tokio::test]
async fn filters_narrow_any_stage() {
    let (_, db) = setup().await;
    let high = db.query::<Task>().filter(field("rank").gte(2)).collect().run_exit().await.expect("filter");
    assert_eq!(ranks(&high), vec![3, 7, 2]);
    let ordered = db
        .query::<Task>()
        .by_index("owner", ("ann",))
        .expect("lookup")
        .order(Order::Desc)
        .filter(field("rank").neq(3).and(field("rank").lt(10)))
        .collect()
        .run_exit()
        .await
        .expect("ordered filter");
    assert_eq!(ranks(&ordered), vec![2, 1]);
    let either = db.query::<Task>().filter(field("owner").eq("bob").or(field("owner").eq("cid")));
    assert_eq!(ranks(&either.collect().run_exit().await.expect("or")), vec![1, 7]);
}

#[tokio::test]
async fn builders_branch_without_interfering() {
    let (_, db) = setup().await;
    let base = db.query::<Task>().full_table_scan();
    let low = base.clone().filter(field("rank").lte(1));
    let high = base.clone().filter(field("rank").gt(2));
    assert_eq!(base.plan().filters.len(), 0);
    assert_eq!(ranks(&low.collect().run_exit().await.expect("low")), vec![1, 1]);
    assert_eq!(ranks(&high.collect().run_exit().await.expect("high")), vec![3, 7]);
    assert_eq!(base.collect().run_exit().await.expect("base").len(), 5);
}

#[tokio::test]
async fn first_and_unique_distinguish_none_one_and_many() {
    let (_, db) = setup().await;
    let nobody = || db.query::<Task>().by_index("owner", ("dan",)).expect("lookup");
    assert_eq!(nobody().first().run_exit().await, Err(Cause::Fail(DocNotFound::in_table("tasks"))));
    assert_eq!(nobody().first_or_null().run_exit().await, Ok(None));
    assert_eq!(
        nobody().unique().run_exit().await,
        Err(Cause::Fail(UniqueError::NotFound(DocNotFound::in_table("tasks"))))
    );
    assert_eq!(nobody().unique_or_null().run_exit().await, Ok(None));

    let ann = || db.query::<Task>().by_index("owner", ("ann",)).expect("lookup");
    assert_eq!(ann().first().run_exit().await.expect("first").rank, 3);
    assert_eq!(
        ann().unique().run_exit().await,
        Err(Cause::Fail(UniqueError::Ambiguous(NotUnique { table: "tasks".into() })))
    );
    match ann().unique_or_null().run_exit().await {
        Err(Cause::Die(Defect::Tagged { tag, .. })) => assert_eq!(tag, "NotUnique"),
        other => panic!("ambiguous unique_or_null should die, got {other:?}"),
    }

    let bob = db.query::<Task>().by_index("owner", ("bob",)).expect("lookup");
    assert_eq!(bob.unique_or_null().run_exit().await.expect("bob").map(|d| d.rank), Some(1));
}

#[tokio::test]
async fn large_ranks_are_told_apart_by_the_index() {
    let (backend, db) = setup().await;
    let writer = DbWriter::from_backend(Arc::new(backend));
    let big = 9_007_199_254_740_993i64;
    for rank in [big, big - 1] {
        writer.insert(task("dan", rank)).run_exit().await.expect("insert");
    }
    let exact = db.query::<Task>().by_index("by_owner_rank", ("dan", big)).expect("lookup");
    assert_eq!(exact.unique().run_exit().await.expect("one match").rank, big);
    let above = db.query::<Task>().filter(field("rank").gt(big - 1)).collect().run_exit().await.expect("filter");
    assert_eq!(ranks(&above), vec![big]);
    let dan = db.query::<Task>().by_index("by_owner_rank", ("dan", big - 1)).expect("lookup");
    assert_eq!(dan.unique_or_null().run_exit().await.expect("one match").map(|d| d.rank), Some(big - 1));
}

#[tokio::test]
async fn bad_index_lookups_fail_before_running() {
    let (_, db) = setup().await;
    assert!(db.query::<Task>().by_index("by_owner_rank", ("ann",)).is_err());
    assert!(db.query::<Task>().by_index("owner", (1i64,)).is_err());
    assert!(db.query::<Task>().by_index_values("owner", vec![json!(null)]).is_err());
    assert!(db.query::<Task>().by_index("rank", (1i64,)).is_err());
}

#[tokio::test]
async fn pages_walk_the_whole_result() {
    let (backend, db) = setup().await;
    let mut seen = Vec::new();
    let mut options = PaginationOptions::first(2);
    loop {
        let page = db.query::<Task>().order(Order::Desc).paginate(options.clone()).run_exit().await.expect("page");
        assert!(page.page.len() <= 2);
        seen.extend(ranks(&page.page));
        if page.is_done {
            break;
        }
        options = PaginationOptions::after(2, page.continue_cursor);
    }
    assert_eq!(seen, vec![2, 7, 1, 1, 3]);
    assert_eq!(backend.document_count("tasks"), Ok(5));
}

#[tokio::test]
async fn a_malformed_cursor_is_a_defect() {
    let (_, db) = setup().await;
    let exit = db.query::<Task>().paginate(PaginationOptions::after(2, "{")).run_exit().await;
    assert!(matches!(exit, Err(Cause::Die(Defect::Store(_)))));
}

#[tokio::test]
async fn optional_fields_round_trip() {
    let (backend, db) = setup().await;
    let writer = DbWriter::from_backend(Arc::new(backend));
    let id = writer
        .insert(Task { owner: "eve".into(), rank: 4, note: Some("urgent".into()) })
        .run_exit()
        .await
        .expect("insert");
    let stored = db.get(&id).run_exit().await.expect("get");
    assert_eq!(stored.note.as_deref(), Some("urgent"));
    let noted = db.query::<Task>().filter(field("note").neq(json!(null))).collect().run_exit().await.expect("noted");
    assert_eq!(ranks(&noted), vec![4]);
}
