use crate::{
    AsValue, Bean, CacheOutcome, Container, Element, Engine, Error, Executor, IntoColumn,
    Pipeline, Query, Resolver, Result, RowsAffected, SqlWriter, Stage, TableDescriptor, Value,
    VersionConflict, bean_primary_key, bean_values, cache_find, materialize, resolve_shape,
    stream::{StreamExt, TryStreamExt},
};
use anyhow::Context;
use futures::pin_mut;
use std::{any::Any, sync::Arc};
use time::OffsetDateTime;

/// Statement state accumulated by the builder methods, dropped after every call.
#[derive(Default, Debug, Clone)]
pub(crate) struct Statement {
    pub(crate) raw: Option<Query>,
    pub(crate) table: Option<String>,
    pub(crate) condition: Option<Query>,
    pub(crate) order_by: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) distinct: bool,
    pub(crate) unscoped: bool,
    pub(crate) no_cache: bool,
    pub(crate) columns: Vec<String>,
}

/// Unit of work over one executor.
///
/// Builder methods (`sql`, `table`, `filter`, ...) configure the next call only: reads and
/// writes reset the statement and the registered closures once done, whatever the outcome.
pub struct Session<'a, E: Executor> {
    pub(crate) engine: &'a Engine,
    pub(crate) executor: &'a mut E,
    pub(crate) statement: Statement,
    pub(crate) pipeline: Pipeline,
}

impl<'a, E: Executor> Session<'a, E> {
    pub fn new(engine: &'a Engine, executor: &'a mut E) -> Self {
        Self {
            engine,
            executor,
            statement: Default::default(),
            pipeline: Default::default(),
        }
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Raw statement, run as is by the next read or `exec`.
    pub fn sql(&mut self, sql: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.statement.raw = Some(Query::new(sql, args));
        self
    }

    /// Table name overriding the one of the bean.
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.statement.table = Some(name.into());
        self
    }

    /// Condition of the generated `SELECT`, successive calls are joined with `AND`.
    pub fn filter(&mut self, condition: impl AsRef<str>, args: Vec<Value>) -> &mut Self {
        let condition = condition.as_ref();
        match &mut self.statement.condition {
            Some(query) => {
                query.sql = format!("({}) AND ({})", query.sql, condition);
                query.args.extend(args);
            }
            None => self.statement.condition = Some(Query::new(condition, args)),
        }
        self
    }

    pub fn order_by(&mut self, expression: impl Into<String>) -> &mut Self {
        self.statement.order_by.push(expression.into());
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.statement.limit = Some(limit);
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.statement.distinct = true;
        self
    }

    /// Includes soft deleted rows in reads, deletes physically.
    pub fn unscoped(&mut self) -> &mut Self {
        self.statement.unscoped = true;
        self
    }

    pub fn no_cache(&mut self) -> &mut Self {
        self.statement.no_cache = true;
        self
    }

    /// Restricts the columns read, or written by `update`.
    pub fn cols<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement
            .columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Closure run on the bean ahead of the `Before*` processors of the next write.
    pub fn before(&mut self, closure: impl FnMut(&mut dyn Any) + Send + 'static) -> &mut Self {
        self.pipeline.before(closure);
        self
    }

    /// Closure run on the beans ahead of the `After*` processors of the next call.
    pub fn after(&mut self, closure: impl FnMut(&mut dyn Any) + Send + 'static) -> &mut Self {
        self.pipeline.after(closure);
        self
    }

    fn reset(&mut self) {
        self.statement = Default::default();
        self.pipeline.clear();
    }

    /// Descriptor of `T` under the table name in use.
    pub(crate) fn bound_table(&self, table: &Arc<TableDescriptor>) -> Arc<TableDescriptor> {
        match &self.statement.table {
            Some(name) if *name != table.name => Arc::new(table.with_name(name.clone())),
            _ => table.clone(),
        }
    }

    fn column_indexes(&self, table: &TableDescriptor, keyed: bool) -> Result<Vec<usize>> {
        if self.statement.columns.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = Vec::with_capacity(self.statement.columns.len());
        for name in &self.statement.columns {
            let Some(idx) = table.column_idx(&name.to_lowercase(), 0) else {
                let error = Error::msg(format!(
                    "Table `{}` ({}) has no column `{}`",
                    table.name, table.type_name, name
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            result.push(idx);
        }
        if keyed {
            for idx in table.primary_keys.iter() {
                if !result.contains(idx) {
                    result.push(*idx);
                }
            }
        }
        Ok(result)
    }

    fn read_query(&self, table: Option<&TableDescriptor>, keyed: bool) -> Result<Query> {
        if let Some(raw) = &self.statement.raw {
            return Ok(raw.clone());
        }
        let Some(table) = table else {
            let error = Error::msg("Reading into projections needs a sql statement");
            log::error!("{:#}", error);
            return Err(error);
        };
        let writer = self.executor.sql_writer();
        let columns = self.column_indexes(table, keyed)?;
        let mut query = Query::default();
        writer.write_select(&mut query, table, &columns, self.statement.distinct);
        writer.write_filter(
            &mut query,
            table,
            !self.statement.unscoped,
            self.statement.condition.as_ref(),
        );
        writer.write_order_limit(&mut query, &self.statement.order_by, self.statement.limit);
        Ok(query)
    }

    /// Reads the rows of the statement into `container`, through the object cache when
    /// the statement allows it. Returns the number of elements read.
    ///
    /// Without `sql(..)` the statement selects the table of the container's beans. On
    /// error `container` is left as it was.
    pub async fn find<C: Container>(&mut self, container: &mut C) -> Result<u64> {
        let result = self.find_into(container, None).await;
        self.reset();
        result
    }

    /// First element of the statement. Generated statements read a single row.
    pub async fn get<T: Element>(&mut self) -> Result<Option<T>> {
        if self.statement.raw.is_none() && self.statement.limit.is_none() {
            self.statement.limit = Some(1);
        }
        let mut result = Vec::<T>::with_capacity(1);
        let outcome = self.find_into(&mut result, Some(1)).await;
        self.reset();
        outcome?;
        Ok(result.into_iter().next())
    }

    async fn find_into<C: Container>(
        &mut self,
        container: &mut C,
        limit: Option<usize>,
    ) -> Result<u64> {
        let engine = self.engine;
        let context = || format!("While reading into {}", std::any::type_name::<C>());
        let shape = resolve_shape::<C>(engine.registry()).with_context(context)?;
        let table = shape.table().map(|v| self.bound_table(v));
        let query = self.read_query(table.as_deref(), C::KEYED)?;
        if let Some(table) = &table {
            match cache_find(self, &query, table, container, limit).await? {
                CacheOutcome::Served(count) => return Ok(count),
                CacheOutcome::Bypass => {}
            }
        }
        let rows = self.executor.fetch(query).take(limit.unwrap_or(usize::MAX));
        materialize(
            rows,
            container,
            engine.registry(),
            engine.context(),
            &mut self.pipeline,
        )
        .await
        .map_err(|e| {
            let e = e.context(context());
            log::error!("{:#}", e);
            e
        })
    }

    /// Streams the elements of the statement into `f`, one at a time, bypassing the
    /// object cache. Returns the number of elements visited.
    pub async fn iterate<T, F>(&mut self, f: F) -> Result<u64>
    where
        T: Element,
        F: FnMut(usize, T) -> Result<()>,
    {
        let result = self.iterate_rows(f).await;
        self.reset();
        result
    }

    async fn iterate_rows<T, F>(&mut self, mut f: F) -> Result<u64>
    where
        T: Element,
        F: FnMut(usize, T) -> Result<()>,
    {
        let engine = self.engine;
        let shape = T::shape(engine.registry());
        let table = shape.table().map(|v| self.bound_table(v));
        let query = self.read_query(table.as_deref(), false)?;
        let mut resolver = Resolver::new(shape.table().cloned());
        let rows = self.executor.fetch(query);
        pin_mut!(rows);
        let mut count = 0;
        while let Some(row) = rows.try_next().await? {
            let schema = resolver.resolve(&row.labels);
            let mut element = T::from_row(row.values, schema, engine.context())?;
            element.process(Stage::AfterLoad, &mut self.pipeline);
            f(count, element)?;
            count += 1;
        }
        Ok(count as u64)
    }

    fn invalidate(&self, table: &str, key: Option<&crate::PrimaryKey>, beans: bool) {
        let Some(cacher) = self.engine.get_cacher(table) else {
            return;
        };
        log::debug!("Clearing the cached ids of `{}`", table);
        cacher.clear_ids(table);
        if let Some(key) = key {
            cacher.del_bean(table, key);
        }
        if beans {
            cacher.clear_beans(table);
        }
    }

    /// Inserts the bean. The version column starts at 1 and an unset auto increment
    /// column receives the id generated by the database.
    pub async fn insert<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let result = self.insert_bean(bean).await;
        self.reset();
        result
    }

    async fn insert_bean<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let engine = self.engine;
        let context = engine.context();
        let table = self.bound_table(&engine.table_info::<T>());
        self.pipeline.run(Stage::BeforeInsert, bean, &T::hooks());
        if let Some(column) = table.version_column() {
            bean.set_field(&column.field_path, Value::Int64(Some(1)), column, context)?;
        }
        let mut values = Vec::with_capacity(table.columns.len());
        let mut generated = None;
        for (idx, (column, value)) in table
            .columns
            .iter()
            .zip(bean_values(bean, &table, context)?)
            .enumerate()
        {
            if column.deleted {
                values.push((idx, Value::Null));
                continue;
            }
            if column.auto_increment
                && (value.is_null() || i64::try_from_value(value.clone()).is_ok_and(|v| v == 0))
            {
                generated = Some(column);
                continue;
            }
            values.push((idx, value));
        }
        let mut query = Query::default();
        self.executor
            .sql_writer()
            .write_insert(&mut query, &table, values);
        let result = self.executor.execute(query).await.map_err(|e| {
            let e = e.context(format!("While inserting into `{}`", table.name));
            log::error!("{:#}", e);
            e
        })?;
        self.invalidate(&table.name, None, false);
        if let (Some(column), Some(id)) = (generated, result.last_affected_id) {
            bean.set_field(&column.field_path, Value::Int64(Some(id)), column, context)?;
        }
        self.pipeline.run(Stage::AfterInsert, bean, &T::hooks());
        Ok(result)
    }

    /// Updates the row of the bean by primary key.
    ///
    /// With a version column the row must still hold the version of the bean, which is
    /// then incremented; otherwise the update fails with [`VersionConflict`].
    pub async fn update<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let result = self.update_bean(bean).await;
        self.reset();
        result
    }

    async fn update_bean<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let engine = self.engine;
        let context = engine.context();
        let table = self.bound_table(&engine.table_info::<T>());
        self.pipeline.run(Stage::BeforeUpdate, bean, &T::hooks());
        let key = bean_primary_key(bean, &table, context)?;
        let only = self.column_indexes(&table, false)?;
        let version = match table.version_column() {
            Some(column) => Some(i64::try_from_value(bean.field_value(
                &column.field_path,
                column,
                context,
            )?)?),
            None => None,
        };
        let mut values = Vec::new();
        for (idx, (column, value)) in table
            .columns
            .iter()
            .zip(bean_values(bean, &table, context)?)
            .enumerate()
        {
            if column.primary_key || column.deleted || column.auto_increment {
                continue;
            }
            if column.version {
                values.push((idx, Value::Int64(version.map(|v| v + 1))));
                continue;
            }
            if only.is_empty() || only.contains(&idx) {
                values.push((idx, value));
            }
        }
        let writer = self.executor.sql_writer();
        let mut query = Query::default();
        writer.write_update(
            &mut query,
            &table,
            values,
            &key,
            version.map(|v| Value::Int64(Some(v))),
        );
        if !self.statement.unscoped && table.deleted.is_some() {
            query.sql.push_str(" AND ");
            writer.write_soft_delete_scope(&mut query.sql, &table);
        }
        let result = self.executor.execute(query).await.map_err(|e| {
            let e = e.context(format!("While updating `{}` with key {}", table.name, key));
            log::error!("{:#}", e);
            e
        })?;
        self.invalidate(&table.name, Some(&key), false);
        if let Some(version) = version {
            if result.rows_affected == 0 {
                let error = VersionConflict {
                    table: table.name.to_string(),
                    key: key.to_string(),
                    version,
                };
                log::error!("{}", error);
                return Err(error.into());
            }
            if let Some(column) = table.version_column() {
                bean.set_field(
                    &column.field_path,
                    Value::Int64(Some(version + 1)),
                    column,
                    context,
                )?;
            }
        }
        self.pipeline.run(Stage::AfterUpdate, bean, &T::hooks());
        Ok(result)
    }

    /// Deletes the row of the bean by primary key. Tables with a soft delete column get
    /// the column set to the current time instead, unless the session is `unscoped`.
    pub async fn delete<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let result = self.delete_bean(bean).await;
        self.reset();
        result
    }

    async fn delete_bean<T: Bean>(&mut self, bean: &mut T) -> Result<RowsAffected> {
        let engine = self.engine;
        let context = engine.context();
        let table = self.bound_table(&engine.table_info::<T>());
        self.pipeline.run(Stage::BeforeDelete, bean, &T::hooks());
        let key = bean_primary_key(bean, &table, context)?;
        let writer = self.executor.sql_writer();
        let mut query = Query::default();
        let mut deleted_at = None;
        match table.deleted.filter(|_| !self.statement.unscoped) {
            Some(idx) => {
                let column = &table.columns[idx];
                let now = OffsetDateTime::now_utc().into_column(column, context)?;
                writer.write_update(&mut query, &table, vec![(idx, now.clone())], &key, None);
                query.sql.push_str(" AND ");
                writer.write_soft_delete_scope(&mut query.sql, &table);
                deleted_at = Some((column, now));
            }
            None => writer.write_delete(&mut query, &table, &key),
        }
        let result = self.executor.execute(query).await.map_err(|e| {
            let e = e.context(format!("While deleting from `{}` the key {}", table.name, key));
            log::error!("{:#}", e);
            e
        })?;
        self.invalidate(&table.name, Some(&key), false);
        if let Some((column, value)) = deleted_at {
            bean.set_field(&column.field_path, value, column, context)?;
        }
        self.pipeline.run(Stage::AfterDelete, bean, &T::hooks());
        Ok(result)
    }

    /// Removes every row of the table of `T`, and its cache.
    pub async fn truncate<T: Bean>(&mut self) -> Result<RowsAffected> {
        let engine = self.engine;
        let table = self.bound_table(&engine.table_info::<T>());
        let mut query = Query::default();
        self.executor.sql_writer().write_truncate(&mut query, &table);
        let result = self.executor.execute(query).await;
        self.invalidate(&table.name, None, true);
        self.reset();
        result.map_err(|e| {
            let e = e.context(format!("While truncating `{}`", table.name));
            log::error!("{:#}", e);
            e
        })
    }

    /// Runs the raw statement set with `sql(..)`. When `table(..)` names the table it
    /// modifies, the cache of that table is dropped.
    pub async fn exec(&mut self) -> Result<RowsAffected> {
        let result = self.exec_raw().await;
        self.reset();
        result
    }

    async fn exec_raw(&mut self) -> Result<RowsAffected> {
        let Some(query) = self.statement.raw.take() else {
            let error = Error::msg("Nothing to execute, set a statement with `sql(..)` first");
            log::error!("{:#}", error);
            return Err(error);
        };
        let context = format!("While executing `{}`", query);
        let result = self.executor.execute(query).await;
        if let Some(table) = self.statement.table.take() {
            self.invalidate(&table, None, true);
        }
        result.map_err(|e| {
            let e = e.context(context);
            log::error!("{:#}", e);
            e
        })
    }
}

impl<E: Executor> std::fmt::Debug for Session<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("statement", &self.statement)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
