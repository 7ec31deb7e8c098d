#[cfg(test)]
mod tests {
    use silo::{Engine, EngineConfig};
    use silo_tests::{MemoryExecutor, create_tables, execute_tests, init_logs};

    #[tokio::test]
    async fn without_cache() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        create_tables(&executor);
        let engine = Engine::default();
        execute_tests(&engine, &mut executor).await;
    }

    #[tokio::test]
    async fn with_cache() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        create_tables(&executor);
        let engine = Engine::new(EngineConfig::new().cache_size(1000));
        execute_tests(&engine, &mut executor).await;
        assert!(executor.count_queries("SELECT * FROM") > 0);
    }

    #[tokio::test]
    async fn with_small_cache() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        create_tables(&executor);
        let engine = Engine::from_url("silo://?cache_size=1&max_cached_ids=1")
            .expect("Failed to configure the engine");
        execute_tests(&engine, &mut executor).await;
    }
}
