use crate::ColumnDescriptor;
use std::{borrow::Cow, collections::HashMap};

/// Static metadata of a bean type: its table and mapped columns.
///
/// Built once per type from [`Bean::describe`](crate::Bean::describe) and shared
/// through the [`SchemaRegistry`](crate::SchemaRegistry), never mutated by a query.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: Cow<'static, str>,
    pub type_name: &'static str,
    pub columns: Box<[ColumnDescriptor]>,
    /// Indices into `columns`, in declaration order.
    pub primary_keys: Box<[usize]>,
    pub deleted: Option<usize>,
    pub version: Option<usize>,
    pub auto_increment: Option<usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl TableDescriptor {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        type_name: &'static str,
        columns: Vec<ColumnDescriptor>,
    ) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            by_name
                .entry(column.name.to_lowercase())
                .or_default()
                .push(i);
        }
        let position = |f: fn(&ColumnDescriptor) -> bool| columns.iter().position(f);
        Self {
            name: name.into(),
            type_name,
            primary_keys: columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.primary_key)
                .map(|(i, _)| i)
                .collect(),
            deleted: position(|c| c.deleted),
            version: position(|c| c.version),
            auto_increment: position(|c| c.auto_increment),
            columns: columns.into(),
            by_name,
        }
    }

    /// Same descriptor bound to a different table name.
    pub fn with_name(&self, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Index of the `occurrence`-th column named `name` (case insensitive), in struct order.
    pub fn column_idx(&self, name: &str, occurrence: usize) -> Option<usize> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|v| v.get(occurrence))
            .copied()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.column_idx(name, 0).map(|i| &self.columns[i])
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.primary_keys.iter().map(|i| &self.columns[*i])
    }

    pub fn deleted_column(&self) -> Option<&ColumnDescriptor> {
        self.deleted.map(|i| &self.columns[i])
    }

    pub fn version_column(&self) -> Option<&ColumnDescriptor> {
        self.version.map(|i| &self.columns[i])
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnDescriptor> {
        self.auto_increment.map(|i| &self.columns[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices() {
        let table = TableDescriptor::new(
            "people",
            "Person",
            vec![
                ColumnDescriptor {
                    primary_key: true,
                    auto_increment: true,
                    ..ColumnDescriptor::new("id", vec![0])
                },
                ColumnDescriptor::new("Name", vec![1]),
                ColumnDescriptor::new("name", vec![2, 0]),
                ColumnDescriptor {
                    version: true,
                    ..ColumnDescriptor::new("version", vec![3])
                },
            ],
        );
        assert_eq!(&*table.primary_keys, &[0]);
        assert_eq!(table.auto_increment, Some(0));
        assert_eq!(table.version, Some(3));
        assert_eq!(table.deleted, None);
        assert_eq!(table.column_idx("NAME", 0), Some(1));
        assert_eq!(table.column_idx("name", 1), Some(2));
        assert_eq!(table.column_idx("name", 2), None);
        assert_eq!(table.with_name("others").name, "others");
    }
}
