use crate::{
    Container, Element, Error, Executor, PrimaryKey, Query, Result, Session, SqlWriter,
    TableDescriptor, cache::fingerprint, index_no_case, materialize,
    stream::TryStreamExt,
};
use futures::pin_mut;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Result of a cache assisted read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The container was filled, with this many elements.
    Served(u64),
    /// The statement cannot go through the cache, read it directly.
    Bypass,
}

/// Whether `sql` groups rows, id lists of grouped statements do not identify beans.
pub fn is_grouped(sql: &str) -> bool {
    index_no_case(sql, "group by").is_some() || index_no_case(sql, "having").is_some()
}

/// Reads the statement `query` of `session` through the object cache of `table`.
///
/// The statement is first reduced to the primary keys it selects, the id list being
/// cached by statement and arguments. Beans found in the cache are reused, the others
/// are read with one query by key and cached. Elements are composed in id list order,
/// ids whose row vanished in the meantime are skipped.
pub async fn cache_find<E: Executor, C: Container>(
    session: &mut Session<'_, E>,
    query: &Query,
    table: &Arc<TableDescriptor>,
    container: &mut C,
    limit: Option<usize>,
) -> Result<CacheOutcome> {
    let engine = session.engine;
    let statement = &session.statement;
    let Some(cacher) = engine.get_cacher(&table.name) else {
        return Ok(CacheOutcome::Bypass);
    };
    if statement.raw.is_some()
        || statement.no_cache
        || statement.distinct
        || statement.unscoped
        || !statement.columns.is_empty()
        || !table.has_primary_key()
        || is_grouped(&query.sql)
    {
        log::debug!("Statement `{}` is not cacheable", query);
        return Ok(CacheOutcome::Bypass);
    }
    let writer = session.executor.sql_writer();
    let Some(id_sql) = writer.convert_id_sql(&query.sql, table) else {
        log::warn!("Cannot reduce `{}` to its primary keys", query);
        return Ok(CacheOutcome::Bypass);
    };
    let context = engine.context();

    // Ids
    let fingerprint = fingerprint(&id_sql, &query.args);
    let ids = match cacher.get_ids(&table.name, &fingerprint) {
        Some(ids) => {
            log::debug!("Cache hit of {} ids for `{}`", ids.len(), fingerprint);
            ids
        }
        None => {
            let max = engine.config().max_cached_ids;
            let mut ids = Vec::new();
            let rows = session
                .executor
                .fetch(Query::new(id_sql, query.args.clone()));
            pin_mut!(rows);
            while let Some(row) = rows.try_next().await? {
                if ids.len() >= max {
                    log::warn!(
                        "Statement `{}` selects more than {} ids, reading it without cache",
                        query,
                        max
                    );
                    return Ok(CacheOutcome::Bypass);
                }
                if row.values.len() != table.primary_keys.len() {
                    let error = Error::msg(format!(
                        "Expected {} primary key columns of `{}`, the row has {}",
                        table.primary_keys.len(),
                        table.name,
                        row.values.len()
                    ));
                    log::error!("{:#}", error);
                    return Err(error);
                }
                let key = table
                    .primary_key_columns()
                    .zip(row.values.into_vec())
                    .map(|(column, value)| column.convert_id(value))
                    .collect::<Result<Vec<_>>>()?;
                ids.push(PrimaryKey::new(key));
            }
            let ids: Arc<[PrimaryKey]> = ids.into();
            log::debug!("Caching {} ids for `{}`", ids.len(), fingerprint);
            cacher.put_ids(&table.name, &fingerprint, ids.clone());
            ids
        }
    };

    // Beans, only of the ids the composition can use
    let wanted = &ids[..limit.map_or(ids.len(), |v| v.min(ids.len()))];
    let mut slots: Vec<Option<C::Element>> = Vec::with_capacity(wanted.len());
    let mut missing = Vec::new();
    let mut requested = HashSet::new();
    for id in wanted {
        let Some(cached) = cacher.get_bean(&table.name, id) else {
            if requested.insert(id.clone()) {
                missing.push(id.clone());
            }
            slots.push(None);
            continue;
        };
        let Some(element) = C::Element::from_cached(&cached) else {
            log::error!(
                "Cache entry {} of `{}` does not hold a {}",
                id,
                table.name,
                table.type_name
            );
            return Ok(CacheOutcome::Bypass);
        };
        let key = element.primary_key(table, context)?;
        if key.as_ref() != Some(id) {
            log::error!(
                "Cache entry {} of `{}` holds the bean with key {}",
                id,
                table.name,
                key.map(|v| v.to_string()).unwrap_or_default()
            );
            return Ok(CacheOutcome::Bypass);
        }
        log::debug!("Cache hit of {} in `{}`", id, table.name);
        slots.push(Some(element));
    }

    // Backfill
    let mut fetched = HashMap::new();
    if !missing.is_empty() {
        let mut backfill = Query::default();
        writer.write_select_by_primary_keys(&mut backfill, table, &missing);
        let mut beans = Vec::<C::Element>::with_capacity(missing.len());
        materialize(
            session.executor.fetch(backfill),
            &mut beans,
            engine.registry(),
            context,
            &mut session.pipeline,
        )
        .await?;
        for bean in beans {
            let Some(key) = bean.primary_key(table, context)? else {
                continue;
            };
            if let Some(cached) = bean.to_cached() {
                log::debug!("Caching {} of `{}`", key, table.name);
                cacher.put_bean(&table.name, &key, cached);
            }
            fetched.insert(key, bean);
        }
    }

    // Composition
    let mut staged = C::default();
    let mut count = 0;
    for (id, slot) in wanted.iter().zip(slots) {
        if limit.is_some_and(|v| count >= v as u64) {
            break;
        }
        let element = match slot {
            Some(element) => element,
            None => match fetched.remove(id) {
                Some(element) => element,
                // Repeated id, the first occurrence took the fetched bean
                None => match cacher
                    .get_bean(&table.name, id)
                    .and_then(|v| C::Element::from_cached(&v))
                {
                    Some(element) => element,
                    None => {
                        log::warn!("Row {} of `{}` vanished, skipping it", id, table.name);
                        continue;
                    }
                },
            },
        };
        staged.insert(element, Some(id))?;
        count += 1;
    }
    container.merge(staged);
    Ok(CacheOutcome::Served(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_statements() {
        assert!(is_grouped(r#"SELECT "a" FROM "t" GROUP BY "a""#));
        assert!(is_grouped(r#"select a from t group by a having count(*) > 1"#));
        assert!(!is_grouped(r#"SELECT "group_id" FROM "t""#));
    }
}
