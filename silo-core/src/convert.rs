use crate::{AsValue, ColumnDescriptor, Error, Result, SqlType, Value, truncate_long};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use std::{any, borrow::Cow, fmt, sync::Arc};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::well_known::Rfc3339,
    macros::datetime,
};
use uuid::Uuid;

/// Zero value of time fields, also what zero sentinels read from a database turn into.
pub const ZERO_TIME: PrimitiveDateTime = datetime!(0001-01-01 0:00);

/// Encoder and decoder of `#[silo(json)]` fields.
pub trait JsonCodec: Send + Sync {
    fn encode(&self, value: &JsonValue) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> Result<JsonValue>;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn encode(&self, value: &JsonValue) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
    fn decode(&self, data: &[u8]) -> Result<JsonValue> {
        serde_json::from_slice(data).with_context(|| {
            format!(
                "Cannot decode `{}` as json",
                truncate_long!(String::from_utf8_lossy(data))
            )
        })
    }
}

/// Field types with their own storage format, the counterpart of `#[silo(conversion)]`.
pub trait Conversion {
    /// Receives the raw column, `None` when it is `NULL`.
    fn from_db(&mut self, data: Option<&[u8]>) -> Result<()>;
    /// `None` stores a `NULL`.
    fn to_db(&self) -> Result<Option<Vec<u8>>>;
}

/// Everything a field conversion may depend on besides the value itself.
#[derive(Clone)]
pub struct ScanContext {
    /// Zone times are presented in to the application.
    pub tz_location: UtcOffset,
    /// Zone times are stored in, unless the column declares its own.
    pub tz_database: UtcOffset,
    pub json: Arc<dyn JsonCodec>,
}

impl Default for ScanContext {
    fn default() -> Self {
        Self {
            tz_location: UtcOffset::UTC,
            tz_database: UtcOffset::UTC,
            json: Arc::new(SerdeJsonCodec),
        }
    }
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("tz_location", &self.tz_location)
            .field("tz_database", &self.tz_database)
            .finish_non_exhaustive()
    }
}

impl ScanContext {
    fn column_zone(&self, column: &ColumnDescriptor) -> UtcOffset {
        column.time_zone.unwrap_or(self.tz_database)
    }
}

/// Field types able to receive a column value.
pub trait FromColumn: Sized {
    /// Column type used when the field does not declare one.
    const SQL_TYPE: SqlType;
    const NULLABLE: bool = false;

    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext)
    -> Result<Self>;
}

/// Field types able to produce a column value for writes and primary key extraction.
pub trait IntoColumn {
    fn into_column(&self, column: &ColumnDescriptor, context: &ScanContext) -> Result<Value>;
}

macro_rules! impl_column {
    ($($source:ty => $sql_type:path),+ $(,)?) => {$(
        impl FromColumn for $source {
            const SQL_TYPE: SqlType = $sql_type;
            fn from_column(value: Value, _column: &ColumnDescriptor, _context: &ScanContext) -> Result<Self> {
                if value.is_null() {
                    return Ok(Default::default());
                }
                <Self as AsValue>::try_from_value(value)
            }
        }
        impl IntoColumn for $source {
            fn into_column(&self, _column: &ColumnDescriptor, _context: &ScanContext) -> Result<Value> {
                Ok(self.clone().as_value())
            }
        }
    )+};
}
impl_column!(
    bool => SqlType::Bool,
    i8 => SqlType::TinyInt,
    i16 => SqlType::SmallInt,
    i32 => SqlType::Int,
    i64 => SqlType::BigInt,
    isize => SqlType::BigInt,
    u8 => SqlType::UnsignedTinyInt,
    u16 => SqlType::UnsignedSmallInt,
    u32 => SqlType::UnsignedInt,
    u64 => SqlType::UnsignedBigInt,
    usize => SqlType::UnsignedBigInt,
    f32 => SqlType::Float,
    f64 => SqlType::Double,
    Decimal => SqlType::Decimal,
    String => SqlType::Varchar,
    Cow<'static, str> => SqlType::Varchar,
    Box<[u8]> => SqlType::Blob,
    Vec<u8> => SqlType::Blob,
    Uuid => SqlType::Uuid,
    JsonValue => SqlType::Json,
);

/// Time read from a column before it is shaped into the field type.
enum Moment {
    Zero,
    Instant(OffsetDateTime),
    Date(Date),
    Time(Time),
}

fn is_zero_sentinel(input: &str) -> bool {
    input.is_empty()
        || input.starts_with("0000-00-00")
        || matches!(
            input,
            "0001-01-01" | "0001-01-01 00:00:00" | "0001-01-01T00:00:00" | "0001-01-01T00:00:00Z"
        )
}

fn parse_moment(input: &str, zone: UtcOffset) -> Result<Moment> {
    let input = input.trim();
    if is_zero_sentinel(input) {
        return Ok(Moment::Zero);
    }
    if input.strip_prefix('-').unwrap_or(input).bytes().all(|v| v.is_ascii_digit()) {
        let seconds = i64::parse(input)?;
        return epoch(seconds);
    }
    if let Ok(v) = <PrimitiveDateTime as AsValue>::parse(input) {
        return Ok(Moment::Instant(v.assume_offset(zone)));
    }
    if let Ok(v) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(Moment::Instant(v));
    }
    if let Ok(v) = <OffsetDateTime as AsValue>::parse(input) {
        return Ok(Moment::Instant(v));
    }
    if let Ok(v) = <Date as AsValue>::parse(input) {
        return Ok(Moment::Date(v));
    }
    if let Ok(v) = <Time as AsValue>::parse(input) {
        return Ok(Moment::Time(v));
    }
    Err(Error::msg(format!(
        "Cannot interpret `{}` as a time",
        truncate_long!(input)
    )))
}

fn epoch(seconds: i64) -> Result<Moment> {
    if seconds == 0 {
        return Ok(Moment::Zero);
    }
    Ok(Moment::Instant(OffsetDateTime::from_unix_timestamp(seconds)?))
}

fn moment(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Moment> {
    let zone = context.column_zone(column);
    Ok(match value {
        v if v.is_null() => Moment::Zero,
        Value::TimestampWithTimezone(Some(v)) => Moment::Instant(v),
        Value::Timestamp(Some(v)) if v == ZERO_TIME => Moment::Zero,
        Value::Timestamp(Some(v)) => Moment::Instant(v.assume_offset(zone)),
        Value::Date(Some(v)) => Moment::Date(v),
        Value::Time(Some(v)) => Moment::Time(v),
        Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => parse_moment(&v, zone)?,
        Value::Blob(Some(v)) => parse_moment(&String::from_utf8_lossy(&v), zone)?,
        Value::Float32(Some(v)) => {
            Moment::Instant(OffsetDateTime::from_unix_timestamp_nanos((v as f64 * 1e9) as i128)?)
        }
        Value::Float64(Some(v)) => {
            Moment::Instant(OffsetDateTime::from_unix_timestamp_nanos((v * 1e9) as i128)?)
        }
        v => epoch(i64::try_from_value(v)?)?,
    })
}

impl FromColumn for OffsetDateTime {
    const SQL_TYPE: SqlType = SqlType::TimestampTz;
    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Self> {
        Ok(match moment(value, column, context)? {
            Moment::Zero => ZERO_TIME.assume_utc(),
            Moment::Instant(v) => v.to_offset(context.tz_location),
            Moment::Date(v) => v
                .midnight()
                .assume_offset(context.column_zone(column))
                .to_offset(context.tz_location),
            Moment::Time(v) => {
                return Err(Error::msg(format!(
                    "Cannot convert the time of day {v} into {}",
                    any::type_name::<Self>()
                )));
            }
        })
    }
}

impl FromColumn for PrimitiveDateTime {
    const SQL_TYPE: SqlType = SqlType::DateTime;
    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Self> {
        let value = OffsetDateTime::from_column(value, column, context)?;
        if value == ZERO_TIME.assume_utc() {
            return Ok(ZERO_TIME);
        }
        Ok(PrimitiveDateTime::new(value.date(), value.time()))
    }
}

impl FromColumn for Date {
    const SQL_TYPE: SqlType = SqlType::Date;
    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Self> {
        Ok(match moment(value, column, context)? {
            Moment::Zero => ZERO_TIME.date(),
            Moment::Instant(v) => v.to_offset(context.tz_location).date(),
            Moment::Date(v) => v,
            Moment::Time(v) => {
                return Err(Error::msg(format!(
                    "Cannot convert the time of day {v} into {}",
                    any::type_name::<Self>()
                )));
            }
        })
    }
}

impl FromColumn for Time {
    const SQL_TYPE: SqlType = SqlType::Time;
    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Self> {
        Ok(match moment(value, column, context)? {
            Moment::Zero | Moment::Date(..) => Time::MIDNIGHT,
            Moment::Instant(v) => v.to_offset(context.tz_location).time(),
            Moment::Time(v) => v,
        })
    }
}

impl IntoColumn for OffsetDateTime {
    fn into_column(&self, column: &ColumnDescriptor, context: &ScanContext) -> Result<Value> {
        let zero = *self == ZERO_TIME.assume_utc();
        Ok(match column.sql_type {
            v if v.is_integer() => Value::Int64(Some(if zero { 0 } else { self.unix_timestamp() })),
            _ if zero => Value::Timestamp(Some(ZERO_TIME)),
            SqlType::TimestampTz => Value::TimestampWithTimezone(Some(*self)),
            SqlType::Date => Value::Date(Some(self.to_offset(context.column_zone(column)).date())),
            _ => {
                let v = self.to_offset(context.column_zone(column));
                Value::Timestamp(Some(PrimitiveDateTime::new(v.date(), v.time())))
            }
        })
    }
}

impl IntoColumn for PrimitiveDateTime {
    fn into_column(&self, column: &ColumnDescriptor, context: &ScanContext) -> Result<Value> {
        if *self == ZERO_TIME {
            return ZERO_TIME.assume_utc().into_column(column, context);
        }
        self.assume_offset(context.tz_location)
            .into_column(column, context)
    }
}

impl IntoColumn for Date {
    fn into_column(&self, _column: &ColumnDescriptor, _context: &ScanContext) -> Result<Value> {
        Ok(Value::Date(Some(*self)))
    }
}

impl IntoColumn for Time {
    fn into_column(&self, _column: &ColumnDescriptor, _context: &ScanContext) -> Result<Value> {
        Ok(Value::Time(Some(*self)))
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
    fn from_column(value: Value, column: &ColumnDescriptor, context: &ScanContext) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_column(value, column, context).map(Some)
    }
}

impl<T: IntoColumn> IntoColumn for Option<T> {
    fn into_column(&self, column: &ColumnDescriptor, context: &ScanContext) -> Result<Value> {
        match self {
            Some(v) => v.into_column(column, context),
            None => Ok(Value::Null),
        }
    }
}

/// Raw bytes of a column as a [`Conversion`] or a [`JsonCodec`] receives them.
pub fn column_bytes(value: &Value) -> Option<Cow<'_, [u8]>> {
    if value.is_null() {
        return None;
    }
    value.as_bytes().or_else(|| {
        Some(Cow::Owned(
            match value.to_json() {
                JsonValue::String(v) => v,
                v => v.to_string(),
            }
            .into_bytes(),
        ))
    })
}

/// Decodes a `#[silo(json)]` field, `NULL` and empty columns give the default value.
pub fn from_json_column<T: DeserializeOwned + Default>(
    value: Value,
    context: &ScanContext,
) -> Result<T> {
    let context_msg = || format!("While decoding json into {}", any::type_name::<T>());
    let json = match value {
        v if v.is_null() => return Ok(T::default()),
        Value::Json(Some(v)) => v,
        v => {
            let Some(data) = column_bytes(&v) else {
                return Ok(T::default());
            };
            if data.iter().all(u8::is_ascii_whitespace) {
                return Ok(T::default());
            }
            context.json.decode(&data).with_context(context_msg)?
        }
    };
    serde_json::from_value(json).with_context(context_msg)
}

pub fn into_json_column<T: Serialize>(
    value: &T,
    column: &ColumnDescriptor,
    context: &ScanContext,
) -> Result<Value> {
    let json = serde_json::to_value(value)
        .with_context(|| format!("While encoding {} as json", any::type_name::<T>()))?;
    let data = context.json.encode(&json)?;
    if column.sql_type.is_blob() {
        return Ok(Value::Blob(Some(data.into())));
    }
    Ok(Value::Varchar(Some(String::from_utf8(data)?)))
}

/// Feeds a column into a [`Conversion`] field, `NULL` included.
pub fn from_conversion_column<T: Conversion>(field: &mut T, value: Value) -> Result<()> {
    let data = column_bytes(&value);
    field
        .from_db(data.as_deref())
        .with_context(|| format!("While converting into {}", any::type_name::<T>()))
}

pub fn into_conversion_column<T: Conversion>(field: &T, column: &ColumnDescriptor) -> Result<Value> {
    Ok(match field.to_db()? {
        None => Value::Null,
        Some(data) if column.sql_type.is_blob() => Value::Blob(Some(data.into())),
        Some(data) => match String::from_utf8(data) {
            Ok(v) => Value::Varchar(Some(v)),
            Err(e) => Value::Blob(Some(e.into_bytes().into())),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    fn column(sql_type: SqlType) -> ColumnDescriptor {
        ColumnDescriptor {
            sql_type,
            ..ColumnDescriptor::new("c", vec![0])
        }
    }

    fn context() -> ScanContext {
        ScanContext {
            tz_location: offset!(+2),
            tz_database: offset!(-5),
            ..Default::default()
        }
    }

    #[test]
    fn null_keeps_zero_value() {
        let ctx = ScanContext::default();
        let c = column(SqlType::Int);
        assert_eq!(i32::from_column(Value::Null, &c, &ctx).unwrap(), 0);
        assert_eq!(
            String::from_column(Value::Varchar(None), &c, &ctx).unwrap(),
            ""
        );
        assert_eq!(
            Option::<i32>::from_column(Value::Int32(None), &c, &ctx).unwrap(),
            None
        );
        assert_eq!(
            Option::<i32>::from_column(Value::Int64(Some(3)), &c, &ctx).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn times_move_between_zones() {
        let ctx = context();
        let c = column(SqlType::DateTime);
        let read = OffsetDateTime::from_column(
            Value::Varchar(Some("2024-03-01 10:00:00".into())),
            &c,
            &ctx,
        )
        .unwrap();
        assert_eq!(read, datetime!(2024-03-01 10:00 -5));
        assert_eq!(read.offset(), offset!(+2));
        let written = read.into_column(&c, &ctx).unwrap();
        assert_eq!(written, Value::Timestamp(Some(datetime!(2024-03-01 10:00))));

        let c = ColumnDescriptor {
            time_zone: Some(UtcOffset::UTC),
            ..column(SqlType::Timestamp)
        };
        let read = PrimitiveDateTime::from_column(
            Value::Timestamp(Some(datetime!(2024-03-01 10:00))),
            &c,
            &ctx,
        )
        .unwrap();
        assert_eq!(read, datetime!(2024-03-01 12:00));
    }

    #[test]
    fn zero_sentinels() {
        let ctx = context();
        let c = column(SqlType::DateTime);
        for raw in ["0000-00-00 00:00:00", "0001-01-01 00:00:00", ""] {
            assert_eq!(
                PrimitiveDateTime::from_column(Value::Varchar(Some(raw.into())), &c, &ctx)
                    .unwrap(),
                ZERO_TIME
            );
        }
        assert_eq!(
            PrimitiveDateTime::from_column(Value::Int64(Some(0)), &column(SqlType::BigInt), &ctx)
                .unwrap(),
            ZERO_TIME
        );
        assert_eq!(
            Date::from_column(Value::Null, &column(SqlType::Date), &ctx).unwrap(),
            ZERO_TIME.date()
        );
    }

    #[test]
    fn epoch_columns() {
        let ctx = context();
        let c = column(SqlType::BigInt);
        let read = OffsetDateTime::from_column(Value::Int64(Some(86400)), &c, &ctx).unwrap();
        assert_eq!(read, datetime!(1970-01-02 0:00 UTC));
        assert_eq!(read.into_column(&c, &ctx).unwrap(), Value::Int64(Some(86400)));
        let read = OffsetDateTime::from_column(Value::Varchar(Some("86400".into())), &c, &ctx)
            .unwrap();
        assert_eq!(read, datetime!(1970-01-02 0:00 UTC));
    }

    #[test]
    fn json_fields() {
        let ctx = ScanContext::default();
        let c = column(SqlType::Json);
        let v: Vec<i32> = from_json_column(Value::Varchar(Some("[1,2]".into())), &ctx).unwrap();
        assert_eq!(v, [1, 2]);
        let v: Vec<i32> = from_json_column(Value::Varchar(Some("".into())), &ctx).unwrap();
        assert!(v.is_empty());
        let v: Vec<i32> = from_json_column(Value::Null, &ctx).unwrap();
        assert!(v.is_empty());
        assert!(from_json_column::<Vec<i32>>(Value::Varchar(Some("{".into())), &ctx).is_err());
        assert_eq!(
            into_json_column(&vec![3, 4], &c, &ctx).unwrap(),
            Value::Varchar(Some("[3,4]".into()))
        );
    }

    #[derive(Default, Debug, PartialEq)]
    struct Flags(Option<Vec<u8>>);

    impl Conversion for Flags {
        fn from_db(&mut self, data: Option<&[u8]>) -> Result<()> {
            self.0 = data.map(|v| v.iter().rev().copied().collect());
            Ok(())
        }
        fn to_db(&self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.as_ref().map(|v| v.iter().rev().copied().collect()))
        }
    }

    #[test]
    fn conversion_fields() {
        let mut flags = Flags(Some(vec![1]));
        from_conversion_column(&mut flags, Value::Null).unwrap();
        assert_eq!(flags, Flags(None));
        from_conversion_column(&mut flags, Value::Varchar(Some("ab".into()))).unwrap();
        assert_eq!(flags, Flags(Some(b"ba".to_vec())));
        assert_eq!(
            into_conversion_column(&flags, &column(SqlType::Varchar)).unwrap(),
            Value::Varchar(Some("ab".into()))
        );
        from_conversion_column(&mut flags, Value::Int32(Some(12))).unwrap();
        assert_eq!(flags, Flags(Some(b"21".to_vec())));
    }
}
