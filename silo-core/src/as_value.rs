use crate::{Error, Result, Value, truncate_long};
use anyhow::Context;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde_json::Value as JsonValue;
use std::{any, borrow::Cow};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::parse_borrowed,
    parsing::Parsed,
};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// This is the layer drivers and the materializer meet on: arguments are turned
/// into values with [`AsValue::as_value`], cells coming back from a driver are
/// turned into native values with [`AsValue::try_from_value`].
///
/// # Conversion contract
/// - The canonical variant for the type is always accepted (`Value::Int32` for `i32`).
/// - Other integer widths are accepted after a range check, the error names both the
///   offending value and the target type.
/// - Textual variants (`Varchar`, `Unknown`) fall back to [`AsValue::parse`].
///
/// ```rust
/// use silo_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// Typed `NULL` for this type.
    fn as_empty_value() -> Value;
    /// Owned [`Value`] representation.
    fn as_value(self) -> Value;
    /// Attempt to convert a dynamic [`Value`] into `Self`.
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
    /// Parse the whole input as `Self`, surrounding whitespace is ignored.
    fn parse(input: impl AsRef<str>) -> Result<Self>
    where
        Self: Sized,
    {
        Err(Error::msg(format!(
            "Cannot parse `{}` as {}",
            truncate_long!(input.as_ref()),
            any::type_name::<Self>()
        )))
    }
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn cannot_convert<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {value:?} to {}",
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($($source:ty => $destination:path),+ $(,)?) => {$(
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self as _))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                #[allow(unreachable_patterns)]
                let wide: i128 = match &value {
                    $destination(Some(v)) => return Ok(*v as _),
                    Value::Boolean(Some(v)) => *v as _,
                    Value::Int8(Some(v)) => *v as _,
                    Value::Int16(Some(v)) => *v as _,
                    Value::Int32(Some(v)) => *v as _,
                    Value::Int64(Some(v)) => *v as _,
                    Value::UInt8(Some(v)) => *v as _,
                    Value::UInt16(Some(v)) => *v as _,
                    Value::UInt32(Some(v)) => *v as _,
                    Value::UInt64(Some(v)) => *v as _,
                    Value::Decimal(Some(v), ..) => {
                        if !v.is_integer() {
                            return Err(Error::msg(format!(
                                "Value {v}: Decimal is not an integer, cannot convert to {}",
                                any::type_name::<Self>()
                            )));
                        }
                        v.to_i128().ok_or_else(|| cannot_convert::<Self>(&value))?
                    }
                    Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => return <Self as AsValue>::parse(v),
                    _ => return Err(cannot_convert::<Self>(&value)),
                };
                <$source>::try_from(wide).map_err(|_| {
                    Error::msg(format!(
                        "Value {wide} is out of range for {}",
                        any::type_name::<Self>()
                    ))
                })
            }
            fn parse(input: impl AsRef<str>) -> Result<Self> {
                let input = input.as_ref();
                input.trim().parse::<$source>().with_context(|| {
                    format!(
                        "Cannot parse `{}` as {}",
                        truncate_long!(input),
                        any::type_name::<Self>()
                    )
                })
            }
        }
    )+};
}
impl_as_value_integer!(
    i8 => Value::Int8,
    i16 => Value::Int16,
    i32 => Value::Int32,
    i64 => Value::Int64,
    isize => Value::Int64,
    u8 => Value::UInt8,
    u16 => Value::UInt16,
    u32 => Value::UInt32,
    u64 => Value::UInt64,
    usize => Value::UInt64,
);

macro_rules! impl_as_value_float {
    ($($source:ty => $destination:path),+ $(,)?) => {$(
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Float32(Some(v)) => Ok(v as _),
                    Value::Float64(Some(v)) => Ok(v as _),
                    Value::Decimal(Some(v), ..) => v
                        .to_f64()
                        .map(|v| v as _)
                        .ok_or_else(|| cannot_convert::<Self>(&value)),
                    Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
                    ref v => i64::try_from_value(v.clone())
                        .map(|v| v as _)
                        .map_err(|_| cannot_convert::<Self>(&value)),
                }
            }
            fn parse(input: impl AsRef<str>) -> Result<Self> {
                let input = input.as_ref();
                input.trim().parse::<$source>().with_context(|| {
                    format!(
                        "Cannot extract a floating point value from `{}`",
                        truncate_long!(input)
                    )
                })
            }
        }
    )+};
}
impl_as_value_float!(f32 => Value::Float32, f64 => Value::Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            Value::Blob(Some(ref v)) => <Self as AsValue>::parse(String::from_utf8_lossy(v)),
            ref v => i64::try_from_value(v.clone())
                .map(|v| v != 0)
                .map_err(|_| cannot_convert::<Self>(&value)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        match input.as_ref().trim() {
            x if x.eq_ignore_ascii_case("true") || x.eq_ignore_ascii_case("t") || x == "1" => {
                Ok(true)
            }
            x if x.eq_ignore_ascii_case("false") || x.eq_ignore_ascii_case("f") || x == "0" => {
                Ok(false)
            }
            x => Err(Error::msg(format!(
                "Cannot parse boolean from `{}`",
                truncate_long!(x)
            ))),
        }
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Ok(v),
            Value::Blob(Some(v)) => String::from_utf8(v.into_vec())
                .context("Cannot convert a Value::Blob holding invalid UTF-8 into String"),
            Value::Json(Some(v)) => Ok(v.to_string()),
            ref v if v.is_null() => Err(cannot_convert::<Self>(v)),
            v => match v.to_json() {
                JsonValue::String(v) => Ok(v),
                v => Ok(v.to_string()),
            },
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        Ok(input.as_ref().to_owned())
    }
}

impl AsValue for Cow<'static, str> {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self.into_owned()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        String::try_from_value(value).map(Into::into)
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        Ok(Cow::Owned(input.as_ref().to_owned()))
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => Ok(v.into_bytes().into()),
            Value::Json(Some(v)) => Ok(v.to_string().into_bytes().into()),
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref().trim();
        let hex = input
            .strip_prefix("\\x")
            .or_else(|| input.strip_prefix("\\X"))
            .unwrap_or(input);
        hex::decode(hex).map(Into::into).with_context(|| {
            format!(
                "While decoding `{}` as {}",
                truncate_long!(input),
                any::type_name::<Self>()
            )
        })
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Box::<[u8]>::try_from_value(value).map(Into::into)
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        Box::<[u8]>::parse(input).map(Into::into)
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None, 0, 0)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self), 0, self.scale() as _)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(Some(v), ..) => Ok(v),
            Value::Float32(Some(v)) => {
                Decimal::from_f32(v).ok_or_else(|| cannot_convert::<Self>(&value))
            }
            Value::Float64(Some(v)) => {
                Decimal::from_f64(v).ok_or_else(|| cannot_convert::<Self>(&value))
            }
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            ref v => i64::try_from_value(v.clone())
                .map(Decimal::from)
                .map_err(|_| cannot_convert::<Self>(&value)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref();
        input.trim().parse::<Decimal>().with_context(|| {
            format!(
                "Could not create a Decimal from `{}`",
                truncate_long!(input)
            )
        })
    }
}

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            Value::Blob(Some(ref v)) if v.len() == 16 => {
                Uuid::from_slice(v).map_err(|_| cannot_convert::<Self>(&value))
            }
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref();
        Uuid::parse_str(input.trim()).with_context(|| {
            format!(
                "Cannot extract a uuid value from `{}`",
                truncate_long!(input)
            )
        })
    }
}

impl AsValue for JsonValue {
    fn as_empty_value() -> Value {
        Value::Json(None)
    }
    fn as_value(self) -> Value {
        Value::Json(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            Value::Blob(Some(ref v)) => {
                serde_json::from_slice(v).context("Cannot decode Value::Blob as json")
            }
            ref v if v.is_null() => Ok(JsonValue::Null),
            v => Ok(v.to_json()),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref();
        serde_json::from_str(input)
            .with_context(|| format!("Cannot parse `{}` as json", truncate_long!(input)))
    }
}

macro_rules! parse_time {
    ($value:expr, $($formats:literal),+ $(,)?) => {
        'value: {
            let value: &str = $value.trim();
            for format in [$($formats,)+] {
                let format = parse_borrowed::<2>(format)?;
                let mut parsed = Parsed::new();
                if let Ok(remaining) = parsed.parse_items(value.as_bytes(), &format)
                    && remaining.is_empty()
                    && let Ok(result) = parsed.try_into()
                {
                    break 'value Ok(result);
                }
            }
            Err(Error::msg(format!(
                "Cannot extract from `{}` as {}",
                truncate_long!(value),
                any::type_name::<Self>()
            )))
        }
    };
}

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            Value::TimestampWithTimezone(Some(v)) => Ok(v.date()),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_time!(input.as_ref(), "[year]-[month]-[day]")
    }
}

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.time()),
            Value::TimestampWithTimezone(Some(v)) => Ok(v.time()),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_time!(
            input.as_ref(),
            "[hour]:[minute]:[second].[subsecond]",
            "[hour]:[minute]:[second]",
            "[hour]:[minute]",
        )
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(Some(v)) => Ok(v),
            Value::TimestampWithTimezone(Some(v)) => Ok(PrimitiveDateTime::new(v.date(), v.time())),
            Value::Date(Some(v)) => Ok(v.midnight()),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        parse_time!(
            input.as_ref(),
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
            "[year]-[month]-[day]T[hour]:[minute]:[second]",
            "[year]-[month]-[day]T[hour]:[minute]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
            "[year]-[month]-[day] [hour]:[minute]:[second]",
            "[year]-[month]-[day] [hour]:[minute]",
        )
    }
}

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::TimestampWithTimezone(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.assume_utc()),
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            v => Err(cannot_convert::<Self>(&v)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref();
        let result: Result<Self> = parse_time!(
            input,
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]",
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]",
            "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
            "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]",
        );
        result.or_else(|_| {
            <PrimitiveDateTime as AsValue>::parse(input).map(PrimitiveDateTime::assume_utc)
        })
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let input = input.as_ref();
        if input.trim().eq_ignore_ascii_case("null") {
            return Ok(None);
        }
        T::parse(input).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn integers_widen_and_narrow() {
        assert_eq!(i64::try_from_value(Value::Int8(Some(-3))).unwrap(), -3);
        assert_eq!(u8::try_from_value(Value::Int64(Some(255))).unwrap(), 255);
        assert!(u8::try_from_value(Value::Int64(Some(256))).is_err());
        assert!(u32::try_from_value(Value::Int32(Some(-1))).is_err());
        assert_eq!(
            i32::try_from_value(Value::Varchar(Some(" 77 ".into()))).unwrap(),
            77
        );
        assert_eq!(
            i64::try_from_value(Decimal::new(1200, 2).as_value()).unwrap(),
            12
        );
        assert!(i64::try_from_value(Decimal::new(1201, 2).as_value()).is_err());
        assert!(i16::try_from_value(Value::Varchar(Some("12a".into()))).is_err());
    }

    #[test]
    fn booleans() {
        assert!(bool::try_from_value(Value::Int32(Some(2))).unwrap());
        assert!(!bool::try_from_value(Value::UInt8(Some(0))).unwrap());
        assert!(bool::try_from_value(Value::Varchar(Some("1".into()))).unwrap());
        assert!(bool::try_from_value(Value::Varchar(Some("TRUE".into()))).unwrap());
        assert!(!bool::try_from_value(Value::Varchar(Some("false".into()))).unwrap());
        assert!(bool::try_from_value(Value::Varchar(Some("yes".into()))).is_err());
    }

    #[test]
    fn strings() {
        assert_eq!(String::try_from_value(Value::Int64(Some(5))).unwrap(), "5");
        assert_eq!(
            String::try_from_value(Value::Blob(Some(b"abc".to_vec().into()))).unwrap(),
            "abc"
        );
        assert!(String::try_from_value(Value::Varchar(None)).is_err());
        assert_eq!(
            Option::<String>::try_from_value(Value::Varchar(None)).unwrap(),
            None
        );
    }

    #[test]
    fn blobs() {
        assert_eq!(
            &*Box::<[u8]>::parse("\\x0aff").unwrap(),
            &[0x0a_u8, 0xff][..]
        );
        assert!(Box::<[u8]>::parse("\\xzz").is_err());
    }

    #[test]
    fn times() {
        assert_eq!(<Date as AsValue>::parse("2024-02-29").unwrap(), date!(2024 - 02 - 29));
        assert_eq!(<Time as AsValue>::parse("10:20:30.5").unwrap(), time!(10:20:30.5));
        assert_eq!(
            <PrimitiveDateTime as AsValue>::parse("2024-01-02 03:04:05").unwrap(),
            datetime!(2024-01-02 03:04:05)
        );
        assert_eq!(
            <PrimitiveDateTime as AsValue>::parse("2024-01-02T03:04").unwrap(),
            datetime!(2024-01-02 03:04)
        );
        assert_eq!(
            <OffsetDateTime as AsValue>::parse("2024-01-02 03:04:05+02:00").unwrap(),
            datetime!(2024-01-02 03:04:05 +02:00)
        );
        assert_eq!(
            <OffsetDateTime as AsValue>::parse("2024-01-02 03:04:05").unwrap(),
            datetime!(2024-01-02 03:04:05 UTC)
        );
        assert!(<Date as AsValue>::parse("2024-13-01").is_err());
    }

    #[test]
    fn json_and_uuid() {
        assert_eq!(
            JsonValue::try_from_value(Value::Varchar(Some(r#"{"a":1}"#.into()))).unwrap(),
            serde_json::json!({"a": 1})
        );
        let uuid = Uuid::parse_str("5e915574-bb30-4430-98cf-c5854f61fbbd").unwrap();
        assert_eq!(
            Uuid::try_from_value(Value::Varchar(Some(uuid.to_string()))).unwrap(),
            uuid
        );
    }
}
