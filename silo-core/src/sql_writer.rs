use crate::{PrimaryKey, Query, TableDescriptor, Value, separated_by, split_n_no_case};

/// Generates the few statements the core issues by itself: bean reads, writes by primary
/// key, batch lookups of cached ids.
///
/// Drivers override the pieces where their dialect differs (quoting, placeholders).
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// Appends a placeholder and binds `value` to it.
    fn write_placeholder(&self, query: &mut Query, value: Value) {
        query.sql.push('?');
        query.args.push(value);
    }

    fn write_column_list(&self, out: &mut String, table: &TableDescriptor, columns: &[usize]) {
        separated_by(
            out,
            columns,
            |out, i| self.write_identifier_quoted(out, &table.columns[*i].name),
            ", ",
        );
    }

    fn write_soft_delete_scope(&self, out: &mut String, table: &TableDescriptor) -> bool {
        let Some(column) = table.deleted_column() else {
            return false;
        };
        self.write_identifier_quoted(out, &column.name);
        out.push_str(" IS NULL");
        true
    }

    /// `SELECT` of the given columns, all of them when `columns` is empty.
    fn write_select(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        columns: &[usize],
        distinct: bool,
    ) {
        let out = &mut query.sql;
        out.push_str("SELECT ");
        if distinct {
            out.push_str("DISTINCT ");
        }
        if columns.is_empty() {
            let all = (0..table.columns.len()).collect::<Vec<_>>();
            self.write_column_list(out, table, &all);
        } else {
            self.write_column_list(out, table, columns);
        }
        out.push_str(" FROM ");
        self.write_identifier_quoted(out, &table.name);
    }

    /// `WHERE` clause restricting to the live rows when `scoped`, and to `condition`.
    fn write_filter(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        scoped: bool,
        condition: Option<&Query>,
    ) {
        let scoped = scoped && table.deleted.is_some();
        if !scoped && condition.is_none() {
            return;
        }
        query.sql.push_str(" WHERE ");
        if scoped {
            self.write_soft_delete_scope(&mut query.sql, table);
        }
        if let Some(condition) = condition {
            if scoped {
                query.sql.push_str(" AND (");
            }
            query.sql.push_str(&condition.sql);
            if scoped {
                query.sql.push(')');
            }
            query.args.extend(condition.args.iter().cloned());
        }
    }

    fn write_order_limit(&self, query: &mut Query, order_by: &[String], limit: Option<u64>) {
        if !order_by.is_empty() {
            query.sql.push_str(" ORDER BY ");
            separated_by(&mut query.sql, order_by, |out, v| out.push_str(v), ", ");
        }
        if let Some(limit) = limit {
            query.sql.push_str(" LIMIT ");
            query.sql.push_str(&limit.to_string());
        }
    }

    /// Condition matching any of `keys`: `pk IN (..)` for single column keys,
    /// `(a = ? AND b = ?) OR ...` for composite ones.
    fn write_primary_keys_condition(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        keys: &[PrimaryKey],
    ) {
        if let [idx] = &*table.primary_keys {
            self.write_identifier_quoted(&mut query.sql, &table.columns[*idx].name);
            query.sql.push_str(" IN (");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    query.sql.push_str(", ");
                }
                let value = key.values().first().cloned().unwrap_or_default();
                self.write_placeholder(query, value);
            }
            query.sql.push(')');
            return;
        }
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                query.sql.push_str(" OR ");
            }
            self.write_primary_key_match(query, table, key, true);
        }
    }

    fn write_primary_key_match(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        key: &PrimaryKey,
        parenthesized: bool,
    ) {
        if parenthesized {
            query.sql.push('(');
        }
        for (i, (column, value)) in table
            .primary_key_columns()
            .zip(key.values().iter())
            .enumerate()
        {
            if i > 0 {
                query.sql.push_str(" AND ");
            }
            self.write_identifier_quoted(&mut query.sql, &column.name);
            query.sql.push_str(" = ");
            self.write_placeholder(query, value.clone());
        }
        if parenthesized {
            query.sql.push(')');
        }
    }

    /// Isolated batch read of the rows with the given keys, no caller condition is inherited.
    fn write_select_by_primary_keys(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        keys: &[PrimaryKey],
    ) {
        query.sql.push_str("SELECT * FROM ");
        self.write_identifier_quoted(&mut query.sql, &table.name);
        query.sql.push_str(" WHERE ");
        self.write_primary_keys_condition(query, table, keys);
    }

    fn write_insert(&self, query: &mut Query, table: &TableDescriptor, values: Vec<(usize, Value)>) {
        query.sql.push_str("INSERT INTO ");
        self.write_identifier_quoted(&mut query.sql, &table.name);
        query.sql.push_str(" (");
        let columns = values.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        self.write_column_list(&mut query.sql, table, &columns);
        query.sql.push_str(") VALUES (");
        for (i, (_, value)) in values.into_iter().enumerate() {
            if i > 0 {
                query.sql.push_str(", ");
            }
            self.write_placeholder(query, value);
        }
        query.sql.push(')');
    }

    /// `UPDATE` by primary key, with the optimistic lock check when `version` is given.
    fn write_update(
        &self,
        query: &mut Query,
        table: &TableDescriptor,
        values: Vec<(usize, Value)>,
        key: &PrimaryKey,
        version: Option<Value>,
    ) {
        query.sql.push_str("UPDATE ");
        self.write_identifier_quoted(&mut query.sql, &table.name);
        query.sql.push_str(" SET ");
        for (i, (idx, value)) in values.into_iter().enumerate() {
            if i > 0 {
                query.sql.push_str(", ");
            }
            self.write_identifier_quoted(&mut query.sql, &table.columns[idx].name);
            query.sql.push_str(" = ");
            self.write_placeholder(query, value);
        }
        query.sql.push_str(" WHERE ");
        self.write_primary_key_match(query, table, key, false);
        if let (Some(column), Some(version)) = (table.version_column(), version) {
            query.sql.push_str(" AND ");
            self.write_identifier_quoted(&mut query.sql, &column.name);
            query.sql.push_str(" = ");
            self.write_placeholder(query, version);
        }
    }

    fn write_delete(&self, query: &mut Query, table: &TableDescriptor, key: &PrimaryKey) {
        query.sql.push_str("DELETE FROM ");
        self.write_identifier_quoted(&mut query.sql, &table.name);
        query.sql.push_str(" WHERE ");
        self.write_primary_key_match(query, table, key, false);
    }

    fn write_truncate(&self, query: &mut Query, table: &TableDescriptor) {
        query.sql.push_str("TRUNCATE TABLE ");
        self.write_identifier_quoted(&mut query.sql, &table.name);
    }

    /// Rewrites the projection of a `SELECT` to the primary key columns, everything from
    /// the first ` FROM ` on is kept. `None` when the table has no primary key or the
    /// statement has no ` FROM `.
    fn convert_id_sql(&self, sql: &str, table: &TableDescriptor) -> Option<String> {
        if !table.has_primary_key() {
            return None;
        }
        let [_, tail] = split_n_no_case(sql, " from ", 2)[..] else {
            return None;
        };
        let mut out = String::with_capacity(sql.len());
        out.push_str("SELECT ");
        self.write_column_list(&mut out, table, &table.primary_keys);
        out.push_str(" FROM ");
        out.push_str(tail);
        Some(out)
    }
}

/// Writer for engines accepting standard double quoted identifiers and `?` placeholders.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter;

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
