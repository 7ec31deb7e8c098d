use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde_json::{Number, Value as JsonValue};
use std::borrow::Cow;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Dynamically typed value exchanged with drivers: query arguments going out and
/// row cells coming back.
///
/// Every variant carries an `Option` so that a typed `NULL` keeps its type
/// information, `Null` is the untyped `NULL` a driver reports when it does not
/// know better. `Unknown` holds textual data of an unspecified type, it is
/// parsed lazily by the conversion layer.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>, /* prec: */ u8, /* scale: */ u8),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    Json(Option<JsonValue>),
    Unknown(Option<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null
            | Value::Boolean(None)
            | Value::Int8(None)
            | Value::Int16(None)
            | Value::Int32(None)
            | Value::Int64(None)
            | Value::UInt8(None)
            | Value::UInt16(None)
            | Value::UInt32(None)
            | Value::UInt64(None)
            | Value::Float32(None)
            | Value::Float64(None)
            | Value::Decimal(None, ..)
            | Value::Varchar(None)
            | Value::Blob(None)
            | Value::Date(None)
            | Value::Time(None)
            | Value::Timestamp(None)
            | Value::TimestampWithTimezone(None)
            | Value::Uuid(None)
            | Value::Json(None)
            | Value::Unknown(None) => true,
            _ => false,
        }
    }

    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Decimal(.., l_prec, l_scale), Self::Decimal(.., r_prec, r_scale)) => {
                l_prec == r_prec && l_scale == r_scale
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    /// Raw bytes of textual or binary payloads, `None` for every other variant.
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => {
                Some(Cow::Borrowed(v.as_bytes()))
            }
            Value::Blob(Some(v)) => Some(Cow::Borrowed(v.as_ref())),
            Value::Json(Some(v)) => Some(Cow::Owned(v.to_string().into_bytes())),
            _ => None,
        }
    }

    /// Textual payload (`Varchar` or `Unknown`), blobs are accepted when they hold valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Some(v),
            Value::Blob(Some(v)) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }

    /// Canonical JSON form. Integers of any width collapse into the same number so that
    /// keys read from different drivers or fields compare equal.
    pub fn to_json(&self) -> JsonValue {
        match self {
            v if v.is_null() => JsonValue::Null,
            Value::Boolean(Some(v)) => JsonValue::Bool(*v),
            Value::Int8(Some(v)) => (*v as i64).into(),
            Value::Int16(Some(v)) => (*v as i64).into(),
            Value::Int32(Some(v)) => (*v as i64).into(),
            Value::Int64(Some(v)) => (*v).into(),
            Value::UInt8(Some(v)) => (*v as u64).into(),
            Value::UInt16(Some(v)) => (*v as u64).into(),
            Value::UInt32(Some(v)) => (*v as u64).into(),
            Value::UInt64(Some(v)) => (*v).into(),
            Value::Float32(Some(v)) => float_to_json(*v as f64),
            Value::Float64(Some(v)) => float_to_json(*v),
            Value::Decimal(Some(v), ..) => {
                match v.is_integer().then(|| v.to_i64()).flatten() {
                    Some(v) => v.into(),
                    None => JsonValue::String(v.normalize().to_string()),
                }
            }
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => JsonValue::String(v.clone()),
            Value::Blob(Some(v)) => JsonValue::String(format!("\\x{}", hex::encode(v))),
            Value::Date(Some(v)) => JsonValue::String(v.to_string()),
            Value::Time(Some(v)) => JsonValue::String(v.to_string()),
            Value::Timestamp(Some(v)) => JsonValue::String(v.to_string()),
            Value::TimestampWithTimezone(Some(v)) => JsonValue::String(v.to_string()),
            Value::Uuid(Some(v)) => JsonValue::String(v.to_string()),
            Value::Json(Some(v)) => v.clone(),
            _ => JsonValue::Null,
        }
    }
}

fn float_to_json(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return (value as i64).into();
    }
    Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(value.to_string()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l, l_prec, l_scale), Self::Decimal(r, r_prec, r_scale)) => {
                l == r && l_prec == r_prec && l_scale == r_scale
            }
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::Json(l), Self::Json(r)) => l == r,
            (Self::Unknown(l), Self::Unknown(r)) => l == r,
            _ => self.is_null() && other.is_null() && self.same_type(other),
        }
    }
}
