#[cfg(test)]
mod tests {
    use silo::{Bean, Engine, EngineConfig, Executor, LruCacher, Query, ShapeError};
    use silo_tests::{Account, MemoryExecutor, init_logs};
    use std::{collections::HashMap, sync::Arc, time::Duration};

    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    #[silo(table = "items")]
    struct Item {
        #[silo(pk, auto_increment)]
        id: i64,
        name: String,
        price: i64,
    }

    /// Same table as `Item`, different bean type.
    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    #[silo(table = "items")]
    struct ItemName {
        #[silo(pk)]
        id: i64,
        name: String,
    }

    const SELECT_IDS: &str = r#"SELECT "id" FROM "items""#;
    const SELECT_ITEMS: &str = r#"SELECT "id", "name", "price" FROM "items""#;

    fn setup(config: EngineConfig) -> (Engine, MemoryExecutor) {
        init_logs();
        let executor = MemoryExecutor::new();
        executor.create_table::<Item>();
        (Engine::new(config), executor)
    }

    fn cached() -> (Engine, MemoryExecutor) {
        setup(EngineConfig::new().cache_size(100))
    }

    async fn insert_items(engine: &Engine, executor: &mut MemoryExecutor, count: usize) -> Vec<Item> {
        let mut session = engine.session(executor);
        let mut result = Vec::with_capacity(count);
        for i in 0..count {
            let mut item = Item {
                name: format!("item {i}"),
                price: i as i64 * 10,
                ..Default::default()
            };
            session.insert(&mut item).await.expect("Failed to insert");
            result.push(item);
        }
        executor.clear_log();
        result
    }

    async fn find_all(engine: &Engine, executor: &mut MemoryExecutor) -> Vec<Item> {
        let mut items = Vec::new();
        engine
            .session(executor)
            .find(&mut items)
            .await
            .expect("Failed to find the items");
        items
    }

    #[tokio::test]
    async fn fetch_after_insert_goes_through_the_cache() {
        let (engine, mut executor) = cached();
        let items = insert_items(&engine, &mut executor, 2).await;
        assert_eq!(find_all(&engine, &mut executor).await, items);
        let queries = executor.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], SELECT_IDS);
        assert_eq!(
            queries[1],
            r#"SELECT * FROM "items" WHERE "id" IN (?, ?)"#
        );

        // Served entirely from the cache
        executor.clear_log();
        assert_eq!(find_all(&engine, &mut executor).await, items);
        let mut map = HashMap::<i64, Item>::new();
        engine
            .session(&mut executor)
            .find(&mut map)
            .await
            .expect("Failed to find the items by id");
        assert_eq!(map.len(), 2);
        assert_eq!(map[&items[1].id], items[1]);
        assert!(executor.queries().is_empty());
    }

    #[tokio::test]
    async fn cached_beans_are_reused_across_statements() {
        let (engine, mut executor) = cached();
        let items = insert_items(&engine, &mut executor, 2).await;
        find_all(&engine, &mut executor).await;
        executor.clear_log();
        let item = engine
            .session(&mut executor)
            .filter(r#""id" = ?"#, vec![items[1].id.into()])
            .get::<Item>()
            .await
            .expect("Failed to get the item")
            .expect("The item exists");
        assert_eq!(item, items[1]);
        assert_eq!(
            executor.queries(),
            [r#"SELECT "id" FROM "items" WHERE "id" = ? LIMIT 1"#]
        );
    }

    #[tokio::test]
    async fn get_reads_a_single_row() {
        let (engine, mut executor) = cached();
        let items = insert_items(&engine, &mut executor, 501).await;
        for _ in 0..2 {
            let item = engine
                .session(&mut executor)
                .get::<Item>()
                .await
                .expect("Failed to get the item")
                .expect("The item exists");
            assert_eq!(item, items[0]);
        }
        assert_eq!(
            executor.queries(),
            [
                r#"SELECT "id" FROM "items" LIMIT 1"#,
                r#"SELECT * FROM "items" WHERE "id" IN (?)"#,
            ]
        );

        // An explicit limit is kept, only the first bean is needed and it is cached
        executor.clear_log();
        let item = engine
            .session(&mut executor)
            .limit(3)
            .get::<Item>()
            .await
            .expect("Failed to get the item");
        assert_eq!(item.as_ref(), Some(&items[0]));
        assert_eq!(executor.queries(), [r#"SELECT "id" FROM "items" LIMIT 3"#]);
    }

    #[tokio::test]
    async fn writes_invalidate() {
        let (engine, mut executor) = cached();
        let mut items = insert_items(&engine, &mut executor, 2).await;
        find_all(&engine, &mut executor).await;
        items[1].price = 999;
        engine
            .session(&mut executor)
            .update(&mut items[1])
            .await
            .expect("Failed to update");
        executor.clear_log();
        assert_eq!(find_all(&engine, &mut executor).await, items);
        assert_eq!(
            executor.queries(),
            [SELECT_IDS, r#"SELECT * FROM "items" WHERE "id" IN (?)"#]
        );

        // Raw statements naming their table
        engine
            .session(&mut executor)
            .sql(r#"UPDATE "items" SET "price" = ?"#, vec![0_i64.into()])
            .table("items")
            .exec()
            .await
            .expect("Failed to reset the prices");
        assert!(
            find_all(&engine, &mut executor)
                .await
                .iter()
                .all(|v| v.price == 0)
        );

        // Truncate
        engine
            .session(&mut executor)
            .truncate::<Item>()
            .await
            .expect("Failed to truncate");
        executor.clear_log();
        assert!(find_all(&engine, &mut executor).await.is_empty());
        assert_eq!(executor.queries(), [SELECT_IDS]);
    }

    #[tokio::test]
    async fn too_many_ids_fall_back_to_a_direct_read() {
        let (engine, mut executor) = cached();
        assert_eq!(engine.config().max_cached_ids, 500);
        insert_items(&engine, &mut executor, 501).await;
        for _ in 0..2 {
            assert_eq!(find_all(&engine, &mut executor).await.len(), 501);
            assert_eq!(executor.queries(), [SELECT_IDS, SELECT_ITEMS]);
            executor.clear_log();
        }
    }

    #[tokio::test]
    async fn uncacheable_statements_bypass() {
        let (engine, mut executor) = cached();
        insert_items(&engine, &mut executor, 3).await;
        let mut items = Vec::<Item>::new();
        let mut session = engine.session(&mut executor);
        session.no_cache().find(&mut items).await.unwrap();
        session.distinct().find(&mut items).await.unwrap();
        session.unscoped().find(&mut items).await.unwrap();
        session.cols(["name"]).find(&mut items).await.unwrap();
        session
            .sql(r#"SELECT * FROM "items""#, Vec::new())
            .find(&mut items)
            .await
            .unwrap();
        assert_eq!(items.len(), 15);
        assert_eq!(executor.queries().len(), 5);
        assert_eq!(executor.count_queries(SELECT_IDS), 0);
        let queries = executor.queries();
        assert_eq!(queries[1], r#"SELECT DISTINCT "id", "name", "price" FROM "items""#);
        assert_eq!(queries[3], r#"SELECT "name" FROM "items""#);
    }

    #[tokio::test]
    async fn cachers_per_table() {
        let (engine, mut executor) = setup(
            EngineConfig::new()
                .cache_size(100)
                .disable_global_cache(true),
        );
        let items = insert_items(&engine, &mut executor, 2).await;
        find_all(&engine, &mut executor).await;
        find_all(&engine, &mut executor).await;
        assert_eq!(executor.queries(), [SELECT_ITEMS, SELECT_ITEMS]);

        // A cacher of its own, evicting all but one bean
        let cacher = Arc::new(LruCacher::new(1));
        engine.map_cacher::<Item>(Some(cacher.clone()));
        assert_eq!(find_all(&engine, &mut executor).await, items);
        assert_eq!(cacher.len(), (1, 1));
        executor.clear_log();
        assert_eq!(find_all(&engine, &mut executor).await, items);
        assert_eq!(
            executor.queries(),
            [r#"SELECT * FROM "items" WHERE "id" IN (?)"#]
        );

        // Mapped to none
        engine.set_cacher("items", None);
        executor.clear_log();
        find_all(&engine, &mut executor).await;
        assert_eq!(executor.queries(), [SELECT_ITEMS]);
    }

    #[tokio::test]
    async fn entries_expire() {
        let (engine, mut executor) = setup(
            EngineConfig::new()
                .cache_size(100)
                .cache_expiry(Duration::from_millis(30)),
        );
        insert_items(&engine, &mut executor, 1).await;
        find_all(&engine, &mut executor).await;
        find_all(&engine, &mut executor).await;
        assert_eq!(executor.queries().len(), 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        executor.clear_log();
        find_all(&engine, &mut executor).await;
        assert_eq!(executor.queries().len(), 2);
    }

    #[tokio::test]
    async fn vanished_rows_are_skipped() {
        let (engine, mut executor) = cached();
        let items = insert_items(&engine, &mut executor, 2).await;
        find_all(&engine, &mut executor).await;
        // Behind the back of the engine
        executor
            .execute(Query::new(
                r#"DELETE FROM "items" WHERE "id" = ?"#,
                vec![items[0].id.into()],
            ))
            .await
            .expect("Failed to delete");
        let cacher = engine.get_cacher("items").expect("Items are cached");
        cacher.clear_beans("items");
        executor.clear_log();
        assert_eq!(find_all(&engine, &mut executor).await, [items[1].clone()]);
        assert_eq!(
            executor.queries(),
            [r#"SELECT * FROM "items" WHERE "id" IN (?, ?)"#]
        );
    }

    #[tokio::test]
    async fn foreign_cache_entries_bypass() {
        let (engine, mut executor) = cached();
        let items = insert_items(&engine, &mut executor, 2).await;
        find_all(&engine, &mut executor).await;
        executor.clear_log();
        let mut names = Vec::<ItemName>::new();
        engine
            .session(&mut executor)
            .find(&mut names)
            .await
            .expect("Failed to find the names");
        assert_eq!(
            names,
            items
                .iter()
                .map(|v| ItemName {
                    id: v.id,
                    name: v.name.clone()
                })
                .collect::<Vec<_>>()
        );
        assert_eq!(executor.queries(), [r#"SELECT "id", "name" FROM "items""#]);
    }

    #[tokio::test]
    async fn shape_errors_come_before_any_query() {
        let (engine, mut executor) = cached();
        executor.create_table::<Account>();
        let mut session = engine.session(&mut executor);
        let mut by_number = HashMap::<i64, Account>::new();
        let error = session.find(&mut by_number).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::KeyNotComposite { .. })
        ));
        let mut projections = HashMap::<i64, (i64, String)>::new();
        let error = session
            .sql(r#"SELECT "id", "name" FROM "items""#, Vec::new())
            .find(&mut projections)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::NotBean(..))
        ));
        assert!(executor.queries().is_empty());
    }
}
