use crate::{AsValue, Error, Result, Value};
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

/// Ordered primary key values of one bean.
///
/// Two keys are equal when their canonical form is, so `Int32(1)` read by a driver
/// and `Int64(1)` computed from a bean field address the same cache entry.
#[derive(Debug, Clone)]
pub struct PrimaryKey {
    values: Vec<Value>,
    canonical: String,
}

impl PrimaryKey {
    pub fn new(values: Vec<Value>) -> Self {
        let canonical =
            serde_json::Value::Array(values.iter().map(Value::to_json).collect()).to_string();
        Self { values, canonical }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON array form, stable across integer widths.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PrimaryKey {}

impl Hash for PrimaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<Vec<Value>> for PrimaryKey {
    fn from(value: Vec<Value>) -> Self {
        PrimaryKey::new(value)
    }
}

/// Key type of a map destination, built from the primary key of each element.
pub trait MapKey: Sized {
    /// Whether the key holds several primary key columns.
    const COMPOSITE: bool;
    /// Number of key columns the key holds, `None` when it adapts to the table.
    const ARITY: Option<usize> = None;

    fn from_primary_key(key: &PrimaryKey) -> Result<Self>;
}

fn single<T: AsValue>(key: &PrimaryKey) -> Result<T> {
    match key.values() {
        [value] => T::try_from_value(value.clone()),
        _ => Err(Error::msg(format!(
            "Primary key {key} has {} columns, a single column key was expected",
            key.len()
        ))),
    }
}

macro_rules! impl_map_key {
    ($($source:ty),+ $(,)?) => {$(
        impl MapKey for $source {
            const COMPOSITE: bool = false;
            fn from_primary_key(key: &PrimaryKey) -> Result<Self> {
                single(key)
            }
        }
    )+};
}
impl_map_key!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    String,
    uuid::Uuid,
    rust_decimal::Decimal,
    time::Date,
    time::PrimitiveDateTime,
);

impl<T: AsValue, const N: usize> MapKey for [T; N] {
    const COMPOSITE: bool = true;
    const ARITY: Option<usize> = Some(N);
    fn from_primary_key(key: &PrimaryKey) -> Result<Self> {
        let values = key
            .values()
            .iter()
            .cloned()
            .map(T::try_from_value)
            .collect::<Result<Vec<_>>>()?;
        values.try_into().map_err(|v: Vec<T>| {
            Error::msg(format!(
                "Primary key {key} has {} columns, the map key expects {N}",
                v.len()
            ))
        })
    }
}

impl<T: AsValue> MapKey for Vec<T> {
    const COMPOSITE: bool = true;
    fn from_primary_key(key: &PrimaryKey) -> Result<Self> {
        key.values()
            .iter()
            .cloned()
            .map(T::try_from_value)
            .collect()
    }
}
