use crate::{AsValue, ColumnLabel, Error, Result, Value};
use anyhow::Context;
use std::{borrow::Cow, fmt};
use time::UtcOffset;
use uuid::Uuid;

/// Semantic type of a column, either declared on a bean field or reported by a driver.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    UnsignedTinyInt,
    UnsignedSmallInt,
    UnsignedInt,
    UnsignedBigInt,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    Text,
    Blob,
    Date,
    Time,
    DateTime,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    #[default]
    Unknown,
}

impl SqlType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Int
                | SqlType::BigInt
                | SqlType::UnsignedTinyInt
                | SqlType::UnsignedSmallInt
                | SqlType::UnsignedInt
                | SqlType::UnsignedBigInt
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, SqlType::Float | SqlType::Double | SqlType::Decimal)
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            SqlType::Char | SqlType::Varchar | SqlType::Text | SqlType::Json | SqlType::Uuid
        )
    }

    pub fn is_blob(self) -> bool {
        matches!(self, SqlType::Blob)
    }

    pub fn is_time(self) -> bool {
        matches!(
            self,
            SqlType::Date
                | SqlType::Time
                | SqlType::DateTime
                | SqlType::Timestamp
                | SqlType::TimestampTz
        )
    }

    /// Maps a driver reported type name (`"VARCHAR(255)"`, `"timestamp with time zone"`,
    /// `"int unsigned"`, ...) to its semantic type. Unrecognized names give `Unknown`.
    pub fn parse(name: &str) -> SqlType {
        let name = name.trim();
        let base = name.split('(').next().unwrap_or(name).trim();
        let unsigned = name.to_ascii_lowercase().contains("unsigned");
        let base = base
            .split_whitespace()
            .filter(|v| !v.eq_ignore_ascii_case("unsigned"))
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let signed = match base.as_str() {
            "BOOL" | "BOOLEAN" | "BIT" => SqlType::Bool,
            "TINYINT" | "INT1" => SqlType::TinyInt,
            "SMALLINT" | "INT2" | "SMALLSERIAL" => SqlType::SmallInt,
            "INT" | "INTEGER" | "INT4" | "MEDIUMINT" | "SERIAL" => SqlType::Int,
            "BIGINT" | "INT8" | "BIGSERIAL" => SqlType::BigInt,
            "UTINYINT" => SqlType::UnsignedTinyInt,
            "USMALLINT" => SqlType::UnsignedSmallInt,
            "UINTEGER" | "UINT" => SqlType::UnsignedInt,
            "UBIGINT" => SqlType::UnsignedBigInt,
            "FLOAT" | "FLOAT4" | "REAL" => SqlType::Float,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => SqlType::Double,
            "DECIMAL" | "NUMERIC" | "MONEY" => SqlType::Decimal,
            "CHAR" | "NCHAR" | "CHARACTER" => SqlType::Char,
            "VARCHAR" | "NVARCHAR" | "CHARACTER VARYING" | "STRING" => SqlType::Varchar,
            "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "CLOB" => SqlType::Text,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BYTEA" | "BINARY"
            | "VARBINARY" => SqlType::Blob,
            "DATE" => SqlType::Date,
            "TIME" | "TIME WITHOUT TIME ZONE" => SqlType::Time,
            "DATETIME" => SqlType::DateTime,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => SqlType::Timestamp,
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => SqlType::TimestampTz,
            "UUID" => SqlType::Uuid,
            "JSON" | "JSONB" => SqlType::Json,
            _ => SqlType::Unknown,
        };
        if !unsigned {
            return signed;
        }
        match signed {
            SqlType::TinyInt => SqlType::UnsignedTinyInt,
            SqlType::SmallInt => SqlType::UnsignedSmallInt,
            SqlType::Int => SqlType::UnsignedInt,
            SqlType::BigInt => SqlType::UnsignedBigInt,
            v => v,
        }
    }

    /// Type a driver would report for this value.
    pub fn of_value(value: &Value) -> SqlType {
        match value {
            Value::Null | Value::Unknown(..) => SqlType::Unknown,
            Value::Boolean(..) => SqlType::Bool,
            Value::Int8(..) => SqlType::TinyInt,
            Value::Int16(..) => SqlType::SmallInt,
            Value::Int32(..) => SqlType::Int,
            Value::Int64(..) => SqlType::BigInt,
            Value::UInt8(..) => SqlType::UnsignedTinyInt,
            Value::UInt16(..) => SqlType::UnsignedSmallInt,
            Value::UInt32(..) => SqlType::UnsignedInt,
            Value::UInt64(..) => SqlType::UnsignedBigInt,
            Value::Float32(..) => SqlType::Float,
            Value::Float64(..) => SqlType::Double,
            Value::Decimal(..) => SqlType::Decimal,
            Value::Varchar(..) => SqlType::Varchar,
            Value::Blob(..) => SqlType::Blob,
            Value::Date(..) => SqlType::Date,
            Value::Time(..) => SqlType::Time,
            Value::Timestamp(..) => SqlType::Timestamp,
            Value::TimestampWithTimezone(..) => SqlType::TimestampTz,
            Value::Uuid(..) => SqlType::Uuid,
            Value::Json(..) => SqlType::Json,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SqlType::Bool => "BOOLEAN",
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Int => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::UnsignedTinyInt => "UTINYINT",
            SqlType::UnsignedSmallInt => "USMALLINT",
            SqlType::UnsignedInt => "UINTEGER",
            SqlType::UnsignedBigInt => "UBIGINT",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::DateTime => "DATETIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Uuid => "UUID",
            SqlType::Json => "JSON",
            SqlType::Unknown => "UNKNOWN",
        })
    }
}

/// Metadata of one mapped bean field.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name as written in SQL.
    pub name: Cow<'static, str>,
    /// Field positions from the root struct down to the field, one step per `extends` embedding.
    pub field_path: Cow<'static, [usize]>,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    /// Soft delete marker, rows with a non `NULL` value here are considered deleted.
    pub deleted: bool,
    /// Optimistic lock counter.
    pub version: bool,
    /// Field is stored as a json document.
    pub json: bool,
    /// Zone the stored times are expressed in, overrides the database zone.
    pub time_zone: Option<UtcOffset>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>, field_path: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            field_path: field_path.into(),
            ..Default::default()
        }
    }

    /// Same column seen from a struct that embeds the owner at field `index`.
    pub fn nested(mut self, index: usize) -> Self {
        let mut path = Vec::with_capacity(self.field_path.len() + 1);
        path.push(index);
        path.extend_from_slice(&self.field_path);
        self.field_path = path.into();
        self
    }

    /// Descriptor synthesized from a driver label, used by positional scans.
    pub fn positional(index: usize, label: &ColumnLabel) -> Self {
        Self {
            name: label.name.clone().into(),
            field_path: vec![index].into(),
            sql_type: label.sql_type,
            nullable: true,
            ..Default::default()
        }
    }

    /// Normalizes a primary key value read back from a driver so that it compares
    /// equal to the key computed from a bean field.
    pub fn convert_id(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            let error = Error::msg(format!("Primary key column `{}` is NULL", self.name));
            log::error!("{:#}", error);
            return Err(error);
        }
        let context = || format!("While converting the primary key column `{}`", self.name);
        Ok(match self.sql_type {
            SqlType::UnsignedTinyInt
            | SqlType::UnsignedSmallInt
            | SqlType::UnsignedInt
            | SqlType::UnsignedBigInt => u64::try_from_value(value).with_context(context)?.as_value(),
            v if v.is_integer() || v == SqlType::Bool => {
                i64::try_from_value(value).with_context(context)?.as_value()
            }
            SqlType::Uuid => Uuid::try_from_value(value).with_context(context)?.as_value(),
            v if v.is_text() => String::try_from_value(value).with_context(context)?.as_value(),
            _ => value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_driver_types() {
        assert_eq!(SqlType::parse("VARCHAR(255)"), SqlType::Varchar);
        assert_eq!(SqlType::parse("int unsigned"), SqlType::UnsignedInt);
        assert_eq!(SqlType::parse("BIGINT UNSIGNED"), SqlType::UnsignedBigInt);
        assert_eq!(
            SqlType::parse("timestamp with time zone"),
            SqlType::TimestampTz
        );
        assert_eq!(SqlType::parse("DECIMAL(10, 2)"), SqlType::Decimal);
        assert_eq!(SqlType::parse("GEOMETRY"), SqlType::Unknown);
        assert!(SqlType::parse("datetime").is_time());
        assert!(SqlType::BigInt.is_numeric());
        assert!(!SqlType::Blob.is_text());
    }

    #[test]
    fn nested_path() {
        let column = ColumnDescriptor::new("name", vec![2]).nested(1).nested(0);
        assert_eq!(&*column.field_path, &[0, 1, 2]);
    }

    #[test]
    fn convert_id_normalizes() {
        let column = ColumnDescriptor {
            sql_type: SqlType::Int,
            ..ColumnDescriptor::new("id", vec![0])
        };
        assert_eq!(
            column.convert_id(Value::Varchar(Some("17".into()))).unwrap(),
            Value::Int64(Some(17))
        );
        assert_eq!(
            column.convert_id(Value::Int32(Some(17))).unwrap(),
            Value::Int64(Some(17))
        );
        assert!(column.convert_id(Value::Int32(None)).is_err());
        let column = ColumnDescriptor {
            sql_type: SqlType::Varchar,
            ..ColumnDescriptor::new("code", vec![0])
        };
        assert_eq!(
            column.convert_id(Value::Int32(Some(5))).unwrap(),
            Value::Varchar(Some("5".into()))
        );
    }
}
