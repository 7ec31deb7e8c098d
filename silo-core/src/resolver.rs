use crate::{ColumnDescriptor, RowLabels, SqlType, TableDescriptor};
use std::{collections::HashMap, sync::Arc};

/// One column of a result, as bound for the current query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueriedField {
    pub name: String,
    pub lower_name: String,
    pub sql_type: SqlType,
    /// How many columns with the same (case insensitive) name precede this one.
    pub occurrence: usize,
    /// Index into the table columns, `None` when the column maps to no field.
    pub column: Option<usize>,
}

/// Binding of a result's columns to the destination, computed once per label set.
#[derive(Debug, Clone)]
pub struct ColumnsSchema {
    pub labels: RowLabels,
    pub fields: Box<[QueriedField]>,
    /// Descriptor of the destination bean, `None` for scalar, tuple and map destinations.
    pub table: Option<Arc<TableDescriptor>>,
    /// Descriptors synthesized from the driver types, one per column.
    pub positional: Box<[ColumnDescriptor]>,
}

impl ColumnsSchema {
    pub fn resolve(labels: &RowLabels, table: Option<&Arc<TableDescriptor>>) -> Self {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let fields = labels
            .iter()
            .map(|label| {
                let lower_name = label.name.to_lowercase();
                let occurrence = {
                    let count = seen.entry(lower_name.clone()).or_default();
                    *count += 1;
                    *count - 1
                };
                let column = table.and_then(|t| t.column_idx(&lower_name, occurrence));
                if column.is_none() && table.is_some() {
                    log::trace!(
                        "Column `{}` (occurrence {}) has no matching field",
                        label.name,
                        occurrence
                    );
                }
                QueriedField {
                    name: label.name.clone(),
                    lower_name,
                    sql_type: label.sql_type,
                    occurrence,
                    column,
                }
            })
            .collect();
        let positional = labels
            .iter()
            .enumerate()
            .map(|(i, label)| ColumnDescriptor::positional(i, label))
            .collect();
        Self {
            labels: labels.clone(),
            fields,
            table: table.cloned(),
            positional,
        }
    }

    /// Whether this schema was computed for `labels`.
    pub fn matches(&self, labels: &RowLabels) -> bool {
        Arc::ptr_eq(&self.labels, labels) || *self.labels == **labels
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Keeps the schema of the label set currently streaming, recomputing it only when the
/// labels change.
#[derive(Debug, Default)]
pub struct Resolver {
    table: Option<Arc<TableDescriptor>>,
    current: Option<ColumnsSchema>,
}

impl Resolver {
    pub fn new(table: Option<Arc<TableDescriptor>>) -> Self {
        Self {
            table,
            current: None,
        }
    }

    pub fn resolve(&mut self, labels: &RowLabels) -> &ColumnsSchema {
        if self.current.as_ref().is_some_and(|v| !v.matches(labels)) {
            self.current = None;
        }
        let table = &self.table;
        self.current
            .get_or_insert_with(|| ColumnsSchema::resolve(labels, table.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnLabel;

    fn labels(names: &[&str]) -> RowLabels {
        names
            .iter()
            .map(|v| ColumnLabel::new(*v, SqlType::Varchar))
            .collect()
    }

    #[test]
    fn duplicate_names_bind_by_occurrence() {
        let table = Arc::new(TableDescriptor::new(
            "t",
            "T",
            vec![
                ColumnDescriptor::new("id", vec![0]),
                ColumnDescriptor::new("name", vec![1]),
                ColumnDescriptor::new("name", vec![2, 0]),
            ],
        ));
        let schema = ColumnsSchema::resolve(
            &labels(&["ID", "Name", "extra", "NAME", "name"]),
            Some(&table),
        );
        let bound = schema.fields.iter().map(|v| v.column).collect::<Vec<_>>();
        assert_eq!(bound, [Some(0), Some(1), None, Some(2), None]);
        let occurrences = schema
            .fields
            .iter()
            .map(|v| v.occurrence)
            .collect::<Vec<_>>();
        assert_eq!(occurrences, [0, 0, 0, 1, 2]);
    }

    #[test]
    fn without_table_nothing_binds() {
        let schema = ColumnsSchema::resolve(&labels(&["a", "b"]), None);
        assert!(schema.fields.iter().all(|v| v.column.is_none()));
        assert_eq!(schema.positional.len(), 2);
        assert_eq!(&*schema.positional[1].field_path, &[1]);
    }

    #[test]
    fn recomputed_only_on_new_labels() {
        let mut resolver = Resolver::new(None);
        let first = labels(&["a"]);
        let same = first.clone();
        assert!(Arc::ptr_eq(&resolver.resolve(&first).labels, &first));
        assert!(Arc::ptr_eq(&resolver.resolve(&same).labels, &first));
        let other = labels(&["b"]);
        assert!(Arc::ptr_eq(&resolver.resolve(&other).labels, &other));
    }
}
