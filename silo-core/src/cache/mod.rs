//! Object cache: id lists keyed by statement fingerprint and beans keyed by primary key,
//! both scoped by table name.

mod lru;
mod manager;

pub use lru::*;
pub use manager::*;

use crate::{PrimaryKey, Value};
use std::{any::Any, sync::Arc};

/// Type erased bean as stored in a [`Cacher`], downcast back to the concrete type on hit.
pub type CachedBean = Arc<dyn Any + Send + Sync>;

/// Store behind the object cache. Implementations synchronize themselves, callers never
/// lock around them.
pub trait Cacher: Send + Sync {
    fn get_ids(&self, table: &str, fingerprint: &str) -> Option<Arc<[PrimaryKey]>>;
    fn put_ids(&self, table: &str, fingerprint: &str, ids: Arc<[PrimaryKey]>);
    fn del_ids(&self, table: &str, fingerprint: &str);
    /// Drops every id list of the table.
    fn clear_ids(&self, table: &str);

    fn get_bean(&self, table: &str, key: &PrimaryKey) -> Option<CachedBean>;
    fn put_bean(&self, table: &str, key: &PrimaryKey, bean: CachedBean);
    fn del_bean(&self, table: &str, key: &PrimaryKey);
    /// Drops every bean of the table.
    fn clear_beans(&self, table: &str);
}

/// Cache key of an id list: the rewritten statement followed by its arguments.
pub fn fingerprint(sql: &str, args: &[Value]) -> String {
    let args = serde_json::Value::Array(args.iter().map(Value::to_json).collect());
    format!("{sql}-{args}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_args() {
        let sql = r#"SELECT "id" FROM "users" WHERE "age" > ?"#;
        let a = fingerprint(sql, &[Value::Int32(Some(18))]);
        let b = fingerprint(sql, &[Value::Int64(Some(18))]);
        let c = fingerprint(sql, &[Value::Int64(Some(21))]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(sql));
    }
}
