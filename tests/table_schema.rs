use serde_json::json;

use docfx::datatype::FieldType;
use docfx::error::SchemaError;
use docfx::schema::{FieldDef, Schema, Table, define_table};
use docfx::todos::Todo;

fn setup() -> docfx::TableDef {
    define_table(
        "messages",
        [
            FieldDef::new("author", FieldType::String).indexed(),
            FieldDef::new("channel", FieldType::id("channels")),
            FieldDef::new("score", FieldType::Float64),
            FieldDef::new("tags", FieldType::array(FieldType::String)),
        ],
    )
    .and_then(|t| t.with_index("by_channel_score", &["channel", "score"]))
    .expect("messages table")
}

#[test]
fn declared_tables_keep_their_fields_and_indexes() {
    let messages = setup();
    assert_eq!(messages.name(), "messages");
    assert_eq!(messages.fields().len(), 4);
    assert!(messages.field("tags").is_some());
    assert!(messages.field("_id").is_none());
    let compound: Vec<&str> = messages.index("by_channel_score").expect("compound index").fields().collect();
    assert_eq!(compound, vec!["channel", "score"]);
    assert_eq!(Todo::table_name(), "todos");
    assert!(Todo::definition().index("completed").is_some());
}

#[test]
fn system_and_malformed_names_are_rejected() {
    assert_eq!(define_table("9lives", []).unwrap_err(), SchemaError::InvalidTableName("9lives".into()));
    let system_field = define_table("t", [FieldDef::new("_creationTime", FieldType::Int64)]);
    assert!(matches!(system_field, Err(SchemaError::InvalidFieldName { .. })));
    let empty = setup().with_index("nothing", &[]);
    assert!(matches!(empty, Err(SchemaError::EmptyIndex { .. })));
}

#[test]
fn a_schema_holds_each_table_once() {
    let schema = Schema::new().with::<Todo>().expect("todos").table(setup()).expect("messages");
    let names: Vec<&str> = schema.tables().map(|t| t.name()).collect();
    assert_eq!(names, vec!["messages", "todos"]);
    assert_eq!(schema.clone().with::<Todo>().unwrap_err(), SchemaError::DuplicateTable("todos".into()));
}

#[test]
fn index_lookups_check_arity_and_types() {
    let messages = setup();
    assert!(messages.bind_index("author", ("ann",)).is_ok());
    assert_eq!(
        messages.bind_index("author", ("ann", 1i64)).unwrap_err(),
        SchemaError::IndexArity { table: "messages".into(), index: "author".into(), expected: 1, actual: 2 }
    );
    let mistyped = messages.bind_index("author", (true,)).unwrap_err();
    assert!(matches!(mistyped, SchemaError::IndexType { position: 0, .. }));
    let unknown = messages.bind_index("by_nothing", ("x",)).unwrap_err();
    assert!(matches!(unknown, SchemaError::UnknownIndex { .. }));
}

#[test]
fn integers_fit_float_index_fields() {
    let messages = setup();
    let range = messages
        .bind_index_values("by_channel_score", vec![json!("channels:1"), json!(3)])
        .expect("int where float declared");
    assert_eq!(range.fields, vec!["channel".to_string(), "score".to_string()]);
    let bad = messages.bind_index_values("by_channel_score", vec![json!("channels:1"), json!("high")]);
    assert!(matches!(bad, Err(SchemaError::IndexType { position: 1, .. })));
}

#[test]
fn export_lists_tables_and_index_descriptors() {
    let exported = Schema::new().with::<Todo>().expect("todos").export();
    assert_eq!(exported["tables"][0]["tableName"], json!("todos"));
    assert_eq!(exported["tables"][0]["indexes"][0]["indexDescriptor"], json!("completed"));
    assert_eq!(exported["tables"][0]["indexes"][0]["fields"], json!(["completed"]));
    assert_eq!(exported["tables"][0]["fields"][1]["name"], json!("completed"));
    assert_eq!(exported["tables"][0]["fields"][1]["indexed"], json!(true));
}
