//! The todo list served by the demo binary: one table and the functions over it.

use std::convert::Infallible;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::access::{from_table, insert_into, normalize_id, patch_in};
use crate::capability::{Both, NeedsRead, NeedsWrite};
use crate::context::{MutationCtx, QueryCtx};
use crate::datatype::FieldType;
use crate::document::{Doc, DocId};
use crate::effect::Effect;
use crate::error::{DomainError, InvalidId};
use crate::interface::Functions;
use crate::schema::{FieldDef, Schema, Table, TableDef, define_table};
use crate::store::{Order, PaginationOptions, PaginationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub text: String,
    pub completed: bool,
}

impl Table for Todo {
    fn definition() -> &'static TableDef {
        lazy_static! {
            static ref TODOS: TableDef = define_table(
                "todos",
                [
                    FieldDef::new("text", FieldType::String),
                    FieldDef::new("completed", FieldType::Boolean).indexed(),
                ],
            )
            .expect("todos table");
        }
        &TODOS
    }
}

pub fn schema() -> crate::error::Result<Schema> {
    Ok(Schema::new().with::<Todo>()?)
}

#[derive(Debug, Default, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Deserialize)]
pub struct CreateArgs {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArgs {
    pub id: String,
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusArgs {
    pub completed: bool,
}

pub fn create(_ctx: MutationCtx, args: CreateArgs) -> Effect<DocId<Todo>, DomainError, NeedsWrite> {
    let text = args.text.trim().to_owned();
    let checked = if text.is_empty() { Err(DomainError::new("Text is required")) } else { Ok(text) };
    Effect::from_result(checked)
        .flat_map(|text| insert_into(Todo { text, completed: false }).widen())
        .named("todos:create")
}

pub fn list(_ctx: QueryCtx, _args: NoArgs) -> Effect<Vec<Doc<Todo>>, Infallible, NeedsRead> {
    from_table::<Todo>().collect()
}

pub fn get(ctx: QueryCtx, args: IdArgs) -> Effect<Option<Doc<Todo>>, InvalidId> {
    let db = ctx.db.clone();
    ctx.db.normalize_id::<Todo>(args.id).flat_map(move |id| db.get_or_null(&id).widen())
}

pub fn get_first(_ctx: QueryCtx, _args: NoArgs) -> Effect<Option<Doc<Todo>>, Infallible, NeedsRead> {
    from_table::<Todo>().first_or_null()
}

pub fn get_latest(_ctx: QueryCtx, _args: NoArgs) -> Effect<Option<Doc<Todo>>, Infallible, NeedsRead> {
    from_table::<Todo>().order(Order::Desc).first_or_null()
}

pub fn update(_ctx: MutationCtx, args: UpdateArgs) -> Effect<(), InvalidId, Both<NeedsRead, NeedsWrite>> {
    let completed = args.completed;
    normalize_id::<Todo>(args.id).flat_map(move |id| patch_in(id, json!({ "completed": completed })).widen())
}

pub fn remove(ctx: MutationCtx, args: IdArgs) -> Effect<(), InvalidId> {
    let db = ctx.db.clone();
    ctx.db.normalize_id::<Todo>(args.id).flat_map(move |id| db.delete(&id).widen())
}

pub fn by_status(ctx: QueryCtx, args: StatusArgs) -> Effect<Vec<Doc<Todo>>> {
    match ctx.db.query::<Todo>().by_index("completed", (args.completed,)) {
        Ok(query) => query.collect(),
        Err(e) => Effect::die(e),
    }
}

pub fn page(ctx: QueryCtx, options: PaginationOptions) -> Effect<PaginationResult<Doc<Todo>>> {
    ctx.db.query::<Todo>().order(Order::Desc).paginate(options)
}

/// Always dies; the promoted error still carries a message the client may see.
pub fn explode(_ctx: MutationCtx, _args: NoArgs) -> Effect<()> {
    Effect::<(), DomainError>::fail(DomainError::new("💣")).or_die()
}

pub fn functions() -> Functions {
    Functions::new()
        .mutation("todos:create", create)
        .query("todos:list", list)
        .query("todos:get", get)
        .query("todos:getFirst", get_first)
        .query("todos:getLatest", get_latest)
        .mutation("todos:update", update)
        .mutation("todos:remove", remove)
        .query("todos:byStatus", by_status)
        .query("todos:page", page)
        .mutation("todos:explode", explode)
}
