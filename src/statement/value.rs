//! Typed ECSQL values
//!
//! [`EcValue`] is what callers bind to parameters and what
//! [`EcSqlStatement::get_value`](super::EcSqlStatement::get_value) returns.
//! DateTime values are stored as julian day numbers, points as one REAL per
//! coordinate and primitive arrays as JSON text.

use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::Value;
use serde_json::{json, Map, Value as JsonValue};

use crate::ec_catalog::PrimitiveType;

/// Julian day of 1970-01-01T00:00:00Z
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum EcValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    DateTime(NaiveDateTime),
    Point2d { x: f64, y: f64 },
    Point3d { x: f64, y: f64, z: f64 },
    Array(Vec<EcValue>),
    /// Members in declaration order
    Struct(Vec<(String, EcValue)>),
    Navigation { id: i64, rel_class_id: Option<i64> },
}

impl EcValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EcValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EcValue::Integer(v) => Some(*v),
            EcValue::Boolean(b) => Some(i64::from(*b)),
            EcValue::Navigation { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EcValue::Double(v) => Some(*v),
            EcValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EcValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Member by name (case-insensitive) of a struct value
    pub fn member(&self, name: &str) -> Option<&EcValue> {
        match self {
            EcValue::Struct(members) => members
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Value at a dotted access path below this value: struct members, point
    /// coordinates (`X`, `Y`, `Z`) and navigation parts (`Id`, `RelECClassId`).
    /// Anything missing reads as null.
    pub fn leaf(&self, path: &str) -> EcValue {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = match self {
            EcValue::Struct(_) => self.member(head).cloned().unwrap_or(EcValue::Null),
            EcValue::Point2d { x, y } => match head.to_ascii_uppercase().as_str() {
                "X" => EcValue::Double(*x),
                "Y" => EcValue::Double(*y),
                _ => EcValue::Null,
            },
            EcValue::Point3d { x, y, z } => match head.to_ascii_uppercase().as_str() {
                "X" => EcValue::Double(*x),
                "Y" => EcValue::Double(*y),
                "Z" => EcValue::Double(*z),
                _ => EcValue::Null,
            },
            EcValue::Navigation { id, rel_class_id } => {
                if head.eq_ignore_ascii_case("Id") {
                    EcValue::Integer(*id)
                } else if head.eq_ignore_ascii_case("RelECClassId") {
                    rel_class_id.map(EcValue::Integer).unwrap_or(EcValue::Null)
                } else {
                    EcValue::Null
                }
            }
            _ => EcValue::Null,
        };
        match rest {
            Some(rest) => value.leaf(rest),
            None => value,
        }
    }

    /// Native value bound to a single SQLite parameter
    pub fn to_sql(&self) -> Value {
        match self {
            EcValue::Null => Value::Null,
            EcValue::Boolean(b) => Value::Integer(i64::from(*b)),
            EcValue::Integer(v) => Value::Integer(*v),
            EcValue::Double(v) => Value::Real(*v),
            EcValue::String(s) => Value::Text(s.clone()),
            EcValue::Binary(b) => Value::Blob(b.clone()),
            EcValue::DateTime(dt) => Value::Real(to_julian_day(dt)),
            EcValue::Navigation { id, .. } => Value::Integer(*id),
            EcValue::Point2d { .. }
            | EcValue::Point3d { .. }
            | EcValue::Array(_)
            | EcValue::Struct(_) => Value::Text(self.to_json().to_string()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            EcValue::Null => JsonValue::Null,
            EcValue::Boolean(b) => json!(b),
            EcValue::Integer(v) => json!(v),
            EcValue::Double(v) => json!(v),
            EcValue::String(s) => json!(s),
            EcValue::Binary(b) => json!(format!("0x{}", hex::encode(b))),
            EcValue::DateTime(dt) => json!(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
            EcValue::Point2d { x, y } => json!({ "x": x, "y": y }),
            EcValue::Point3d { x, y, z } => json!({ "x": x, "y": y, "z": z }),
            EcValue::Array(items) => JsonValue::Array(items.iter().map(EcValue::to_json).collect()),
            EcValue::Struct(members) => {
                let mut object = Map::new();
                for (name, value) in members {
                    object.insert(name.clone(), value.to_json());
                }
                JsonValue::Object(object)
            }
            EcValue::Navigation { id, rel_class_id } => match rel_class_id {
                Some(rel) => json!({ "id": id, "relClassId": rel }),
                None => json!({ "id": id }),
            },
        }
    }

    /// Decode one native column. Without a type the SQLite storage class decides.
    pub fn from_sql(value: &Value, primitive_type: Option<PrimitiveType>) -> EcValue {
        match (value, primitive_type) {
            (Value::Null, _) => EcValue::Null,
            (Value::Integer(v), Some(PrimitiveType::Boolean)) => EcValue::Boolean(*v != 0),
            (Value::Integer(v), Some(PrimitiveType::Double)) => EcValue::Double(*v as f64),
            (Value::Real(v), Some(PrimitiveType::DateTime)) => {
                from_julian_day(*v).map(EcValue::DateTime).unwrap_or(EcValue::Double(*v))
            }
            (Value::Integer(v), Some(PrimitiveType::DateTime)) => from_julian_day(*v as f64)
                .map(EcValue::DateTime)
                .unwrap_or(EcValue::Integer(*v)),
            (Value::Integer(v), _) => EcValue::Integer(*v),
            (Value::Real(v), _) => EcValue::Double(*v),
            (Value::Text(s), _) => EcValue::String(s.clone()),
            (Value::Blob(b), _) => EcValue::Binary(b.clone()),
        }
    }

    /// Decode a primitive array stored as JSON text
    pub fn from_json_array(text: &str, primitive_type: PrimitiveType) -> Option<EcValue> {
        let JsonValue::Array(items) = serde_json::from_str::<JsonValue>(text).ok()? else {
            return None;
        };
        Some(EcValue::Array(
            items.iter().map(|item| from_json_item(item, primitive_type)).collect(),
        ))
    }
}

fn from_json_item(item: &JsonValue, primitive_type: PrimitiveType) -> EcValue {
    match item {
        JsonValue::Null => EcValue::Null,
        JsonValue::Bool(b) => EcValue::Boolean(*b),
        JsonValue::Number(n) => match (n.as_i64(), primitive_type) {
            (Some(v), PrimitiveType::Boolean) => EcValue::Boolean(v != 0),
            (Some(v), PrimitiveType::Integer | PrimitiveType::Long) => EcValue::Integer(v),
            _ => n.as_f64().map(EcValue::Double).unwrap_or(EcValue::Null),
        },
        JsonValue::String(s) => match primitive_type {
            PrimitiveType::DateTime => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(EcValue::DateTime)
                .unwrap_or_else(|_| EcValue::String(s.clone())),
            PrimitiveType::Binary => s
                .strip_prefix("0x")
                .and_then(|h| hex::decode(h).ok())
                .map(EcValue::Binary)
                .unwrap_or_else(|| EcValue::String(s.clone())),
            _ => EcValue::String(s.clone()),
        },
        JsonValue::Array(_) | JsonValue::Object(_) => EcValue::String(item.to_string()),
    }
}

pub fn to_julian_day(dt: &NaiveDateTime) -> f64 {
    dt.and_utc().timestamp_millis() as f64 / MILLIS_PER_DAY + UNIX_EPOCH_JULIAN_DAY
}

pub fn from_julian_day(day: f64) -> Option<NaiveDateTime> {
    let millis = ((day - UNIX_EPOCH_JULIAN_DAY) * MILLIS_PER_DAY).round() as i64;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

impl From<bool> for EcValue {
    fn from(v: bool) -> Self {
        EcValue::Boolean(v)
    }
}

impl From<i64> for EcValue {
    fn from(v: i64) -> Self {
        EcValue::Integer(v)
    }
}

impl From<i32> for EcValue {
    fn from(v: i32) -> Self {
        EcValue::Integer(i64::from(v))
    }
}

impl From<f64> for EcValue {
    fn from(v: f64) -> Self {
        EcValue::Double(v)
    }
}

impl From<&str> for EcValue {
    fn from(v: &str) -> Self {
        EcValue::String(v.to_string())
    }
}

impl From<String> for EcValue {
    fn from(v: String) -> Self {
        EcValue::String(v)
    }
}

impl From<Vec<u8>> for EcValue {
    fn from(v: Vec<u8>) -> Self {
        EcValue::Binary(v)
    }
}

impl From<NaiveDateTime> for EcValue {
    fn from(v: NaiveDateTime) -> Self {
        EcValue::DateTime(v)
    }
}

impl<T: Into<EcValue>> From<Option<T>> for EcValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(EcValue::Null)
    }
}
