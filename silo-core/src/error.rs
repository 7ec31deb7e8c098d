use thiserror::Error;

/// Destination container that cannot hold the requested elements.
///
/// Always reported before the database is queried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("Map destinations need bean elements, `{0}` is not a bean")]
    NotBean(&'static str),
    #[error("Table `{0}` has no primary key, its rows cannot be collected into a map")]
    MissingPrimaryKey(String),
    #[error(
        "Table `{table}` has a primary key of {columns} columns but the map key `{key}` holds a single value"
    )]
    KeyNotComposite {
        table: String,
        columns: usize,
        key: &'static str,
    },
    #[error(
        "Table `{table}` has a primary key of {columns} columns but the map key `{key}` holds {arity}"
    )]
    KeyArity {
        table: String,
        columns: usize,
        key: &'static str,
        arity: usize,
    },
}

/// Optimistic lock failure: the row changed (or vanished) since the bean was read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Version conflict updating `{table}` with key {key}, version {version} is no longer current")]
pub struct VersionConflict {
    pub table: String,
    pub key: String,
    pub version: i64,
}
