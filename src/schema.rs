//! Table descriptors and index schema.
//!
//! A [`TableDef`] is declared once with [`define_table`] and shared read-only by every
//! query builder for that table. A field marked indexed becomes a single-field index named
//! after the field. Compound indexes are listed explicitly with [`TableDef::with_index`].
//! Index lookups are checked against the declared entries positionally, so a lookup with
//! the wrong arity or a mistyped value is rejected before it reaches the store.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatype::{FieldType, IndexKey};
use crate::error::SchemaError;
use crate::store::IndexRange;

lazy_static! {
    // system fields start with an underscore and are not declarable
    static ref NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid name pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub indexed: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self { name: name.into(), ty, indexed: false }
    }
    /// Marks the field as an index field; the table gets a single-field index of the same name.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// One position of an index together with the type lookups must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub field: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub entries: Vec<IndexEntry>,
}

// Exported as `{indexDescriptor, fields}`; entry types stay on the table's field list.
impl Serialize for IndexDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IndexDef", 2)?;
        state.serialize_field("indexDescriptor", &self.name)?;
        state.serialize_field("fields", &self.fields().collect::<Vec<_>>())?;
        state.end()
    }
}

impl IndexDef {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.field.as_str())
    }

    /// Binds statically typed lookup values to this index.
    pub fn bind(&self, table: &str, parts: Vec<(FieldType, Value)>) -> Result<IndexRange, SchemaError> {
        self.check_arity(table, parts.len())?;
        for (position, (entry, (ty, _))) in self.entries.iter().zip(parts.iter()).enumerate() {
            if !entry.ty.admits(ty) {
                return Err(self.type_error(table, position, entry, ty.to_string()));
            }
        }
        Ok(self.range(parts.into_iter().map(|(_, value)| value).collect()))
    }

    /// Binds dynamic lookup values, checking each against the declared field type.
    pub fn bind_values(&self, table: &str, values: Vec<Value>) -> Result<IndexRange, SchemaError> {
        self.check_arity(table, values.len())?;
        for (position, (entry, value)) in self.entries.iter().zip(values.iter()).enumerate() {
            if !entry.ty.accepts(value) {
                return Err(self.type_error(table, position, entry, value.to_string()));
            }
        }
        Ok(self.range(values))
    }

    fn check_arity(&self, table: &str, actual: usize) -> Result<(), SchemaError> {
        if actual == self.entries.len() {
            Ok(())
        } else {
            Err(SchemaError::IndexArity {
                table: table.to_owned(),
                index: self.name.clone(),
                expected: self.entries.len(),
                actual,
            })
        }
    }

    fn type_error(&self, table: &str, position: usize, entry: &IndexEntry, actual: String) -> SchemaError {
        SchemaError::IndexType {
            table: table.to_owned(),
            index: self.name.clone(),
            position,
            field: entry.field.clone(),
            expected: entry.ty.to_string(),
            actual,
        }
    }

    fn range(&self, values: Vec<Value>) -> IndexRange {
        IndexRange { index: self.name.clone(), fields: self.fields().map(str::to_owned).collect(), values }
    }
}

/// Descriptor of a declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    #[serde(rename = "tableName")]
    name: String,
    fields: Vec<FieldDef>,
    indexes: Vec<IndexDef>,
}

/// Declares a table. Every field marked with [`FieldDef::indexed`] gets a single-field
/// index named after it.
pub fn define_table<I>(name: &str, fields: I) -> Result<TableDef, SchemaError>
where
    I: IntoIterator<Item = FieldDef>,
{
    if !NAME.is_match(name) {
        return Err(SchemaError::InvalidTableName(name.to_owned()));
    }
    let mut table = TableDef { name: name.to_owned(), fields: Vec::new(), indexes: Vec::new() };
    for field in fields {
        if !NAME.is_match(&field.name) {
            return Err(SchemaError::InvalidFieldName { table: table.name, field: field.name });
        }
        if table.field(&field.name).is_some() {
            return Err(SchemaError::DuplicateField { table: table.name, field: field.name });
        }
        table.fields.push(field);
    }
    let marked: Vec<String> = table.fields.iter().filter(|f| f.indexed).map(|f| f.name.clone()).collect();
    for field in marked {
        table = table.with_index(&field, &[field.as_str()])?;
    }
    Ok(table)
}

impl TableDef {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Adds a compound index over `fields`, in the given order.
    pub fn with_index(mut self, name: &str, fields: &[&str]) -> Result<Self, SchemaError> {
        if !NAME.is_match(name) {
            return Err(SchemaError::InvalidFieldName { table: self.name, field: name.to_owned() });
        }
        if self.index(name).is_some() {
            return Err(SchemaError::DuplicateIndex { table: self.name, index: name.to_owned() });
        }
        if fields.is_empty() {
            return Err(SchemaError::EmptyIndex { table: self.name, index: name.to_owned() });
        }
        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            match self.field(field) {
                Some(def) => entries.push(IndexEntry { field: def.name.clone(), ty: def.ty.clone() }),
                None => {
                    return Err(SchemaError::UnknownIndexField {
                        table: self.name,
                        index: name.to_owned(),
                        field: (*field).to_owned(),
                    });
                }
            }
        }
        self.indexes.push(IndexDef { name: name.to_owned(), entries });
        Ok(self)
    }

    pub fn bind_index<K: IndexKey>(&self, index: &str, key: K) -> Result<IndexRange, SchemaError> {
        self.lookup(index)?.bind(&self.name, key.into_parts())
    }

    pub fn bind_index_values(&self, index: &str, values: Vec<Value>) -> Result<IndexRange, SchemaError> {
        self.lookup(index)?.bind_values(&self.name, values)
    }

    fn lookup(&self, index: &str) -> Result<&IndexDef, SchemaError> {
        self.index(index)
            .ok_or_else(|| SchemaError::UnknownIndex { table: self.name.clone(), index: index.to_owned() })
    }
}

/// A struct stored as the documents of one table.
///
/// ```ignore
/// impl Table for Todo {
///     fn definition() -> &'static TableDef {
///         lazy_static! {
///             static ref TODOS: TableDef = define_table("todos", [
///                 FieldDef::new("text", FieldType::String),
///                 FieldDef::new("completed", FieldType::Boolean).indexed(),
///             ]).expect("todos table");
///         }
///         &TODOS
///     }
/// }
/// ```
pub trait Table: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn definition() -> &'static TableDef;

    fn table_name() -> &'static str {
        Self::definition().name()
    }
}

/// The set of tables a deployment knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<String, TableDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, def: TableDef) -> Result<Self, SchemaError> {
        if self.tables.contains_key(def.name()) {
            return Err(SchemaError::DuplicateTable(def.name));
        }
        self.tables.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn with<T: Table>(self) -> Result<Self, SchemaError> {
        self.table(T::definition().clone())
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// Registration output for the store's schema system.
    pub fn export(&self) -> Value {
        let tables: Vec<&TableDef> = self.tables.values().collect();
        serde_json::json!({ "tables": tables })
    }
}
