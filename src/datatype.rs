// used to describe field types in a serialisable way
use serde::{Deserialize, Serialize};
// values stored in documents are plain JSON
use serde_json::{Number, Value};

// used to print out readable forms of a data type
use std::fmt;
// used for the total order over values
use std::cmp::Ordering;

use crate::document::DocId;
use crate::schema::Table;

/// The type of a declared document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldType {
    String,
    Float64,
    Int64,
    Boolean,
    /// An id referring to a document in the named table.
    Id { table: String },
    Array { of: Box<FieldType> },
    /// The field may be absent or null.
    Optional { of: Box<FieldType> },
    Any,
}

impl FieldType {
    pub fn id(table: impl Into<String>) -> Self {
        Self::Id { table: table.into() }
    }
    pub fn array(of: FieldType) -> Self {
        Self::Array { of: Box::new(of) }
    }
    pub fn optional(of: FieldType) -> Self {
        Self::Optional { of: Box::new(of) }
    }
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. } | Self::Any)
    }

    /// Checks a stored value against this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Id { .. } => value.is_string(),
            Self::Float64 => value.is_number(),
            Self::Int64 => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array { of } => value.as_array().is_some_and(|items| items.iter().all(|v| of.accepts(v))),
            Self::Optional { of } => value.is_null() || of.accepts(value),
            Self::Any => true,
        }
    }

    /// Whether a statically typed value of type `other` may stand where this type is declared.
    pub fn admits(&self, other: &FieldType) -> bool {
        match (self, other) {
            (Self::Any, _) => true,
            (Self::Float64, Self::Int64) => true,
            (Self::Optional { of }, Self::Optional { of: inner }) => of.admits(inner),
            (Self::Optional { of }, other) => of.admits(other),
            (Self::Array { of }, Self::Array { of: inner }) => of.admits(inner),
            (declared, other) => declared == other,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Float64 => write!(f, "float64"),
            Self::Int64 => write!(f, "int64"),
            Self::Boolean => write!(f, "boolean"),
            Self::Id { table } => write!(f, "id<{table}>"),
            Self::Array { of } => write!(f, "array<{of}>"),
            Self::Optional { of } => write!(f, "optional<{of}>"),
            Self::Any => write!(f, "any"),
        }
    }
}

// ------------- Index values --------------

/// A value usable as one position of an index lookup. The static field type is compared
/// against the index entry it is bound to.
pub trait IndexValue {
    fn field_type() -> FieldType;
    fn into_value(self) -> Value;
}

impl IndexValue for String {
    fn field_type() -> FieldType {
        FieldType::String
    }
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IndexValue for &str {
    fn field_type() -> FieldType {
        FieldType::String
    }
    fn into_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IndexValue for bool {
    fn field_type() -> FieldType {
        FieldType::Boolean
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IndexValue for i64 {
    fn field_type() -> FieldType {
        FieldType::Int64
    }
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl IndexValue for i32 {
    fn field_type() -> FieldType {
        FieldType::Int64
    }
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl IndexValue for f64 {
    fn field_type() -> FieldType {
        FieldType::Float64
    }
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl<T: Table> IndexValue for DocId<T> {
    fn field_type() -> FieldType {
        FieldType::id(T::table_name())
    }
    fn into_value(self) -> Value {
        Value::String(self.into_string())
    }
}

impl<V: IndexValue> IndexValue for Option<V> {
    fn field_type() -> FieldType {
        FieldType::optional(V::field_type())
    }
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IndexValue::into_value)
    }
}

/// The full argument list of an index lookup, one tuple element per index field.
pub trait IndexKey {
    fn into_parts(self) -> Vec<(FieldType, Value)>;
}

macro_rules! index_key_tuple {
    ($($name:ident),+) => {
        impl<$($name: IndexValue),+> IndexKey for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_parts(self) -> Vec<(FieldType, Value)> {
                let ($($name,)+) = self;
                vec![$(($name::field_type(), $name.into_value())),+]
            }
        }
    };
}

index_key_tuple!(A);
index_key_tuple!(A, B);
index_key_tuple!(A, B, C);
index_key_tuple!(A, B, C, D);

// ------------- Ordering --------------

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::Bool(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over stored values: values of different kinds order by kind
/// (null < number < boolean < string < array < object), values of the same kind by content.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => compare_slices(xs, ys),
        (Value::Object(xs), Value::Object(ys)) => {
            for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
                let ordering = kx.cmp(ky).then_with(|| compare_values(vx, vy));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

// Integers compare exactly; f64 is only used once a float is involved.
fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => return x.cmp(&y),
        (Some(_), None) if y.is_u64() => return Ordering::Less,
        (None, Some(_)) if x.is_u64() => return Ordering::Greater,
        _ => {}
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x.cmp(&y);
    }
    x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
}

/// Lexicographic order over value lists, as used for compound index keys.
pub fn compare_slices(xs: &[Value], ys: &[Value]) -> Ordering {
    for (x, y) in xs.iter().zip(ys.iter()) {
        let ordering = compare_values(x, y);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    xs.len().cmp(&ys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_accepts_null_and_inner() {
        let ty = FieldType::optional(FieldType::String);
        assert!(ty.accepts(&Value::Null));
        assert!(ty.accepts(&json!("x")));
        assert!(!ty.accepts(&json!(1)));
    }

    #[test]
    fn int_fits_float_but_not_reverse() {
        assert!(FieldType::Float64.admits(&FieldType::Int64));
        assert!(!FieldType::Int64.admits(&FieldType::Float64));
        assert!(FieldType::optional(FieldType::Boolean).admits(&FieldType::Boolean));
        assert!(!FieldType::id("users").admits(&FieldType::String));
    }

    #[test]
    fn values_of_different_kinds_order_by_kind() {
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!("a")), Ordering::Less);
        assert_eq!(compare_slices(&[json!("a"), json!(1)], &[json!("a"), json!(2)]), Ordering::Less);
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 9_007_199_254_740_993i64;
        assert_eq!(compare_values(&json!(big), &json!(big - 1)), Ordering::Greater);
        assert_eq!(compare_values(&json!(big), &json!(big)), Ordering::Equal);
        assert_eq!(compare_values(&json!(-1i64), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(compare_values(&json!(u64::MAX), &json!(u64::MAX - 1)), Ordering::Greater);
        assert_eq!(compare_values(&json!(3i64), &json!(2.5)), Ordering::Greater);
    }

    #[test]
    fn tuple_keys_carry_types_in_order() {
        let parts = ("alice", true, 3i64).into_parts();
        let types: Vec<FieldType> = parts.into_iter().map(|(ty, _)| ty).collect();
        assert_eq!(types, vec![FieldType::String, FieldType::Boolean, FieldType::Int64]);
    }
}
