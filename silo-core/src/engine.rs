use crate::{
    Bean, Cacher, CacherManager, EngineConfig, Executor, JsonCodec, LruCacher, PrimaryKey,
    Result, ScanContext, SchemaRegistry, Session, TableDescriptor,
};
use std::sync::Arc;

/// Shared state of every session: table descriptors, cachers and configuration.
///
/// Sessions borrow the engine, wrap it in an `Arc` to share it across tasks.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    context: ScanContext,
    registry: SchemaRegistry,
    cachers: CacherManager,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let cachers = CacherManager::new();
        cachers.set_disable_global(config.disable_global_cache);
        if let Some(size) = config.cache_size {
            let mut cacher = LruCacher::new(size);
            if let Some(expiry) = config.cache_expiry {
                cacher = cacher.with_expiry(expiry);
            }
            cachers.set_default_cacher(Some(Arc::new(cacher)));
        }
        let context = ScanContext {
            tz_location: config.tz_location,
            tz_database: config.tz_database,
            ..Default::default()
        };
        log::debug!("Engine created with {:?}", config);
        Self {
            config,
            context,
            registry: SchemaRegistry::new(),
            cachers,
        }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        EngineConfig::from_url(url).map(Self::new)
    }

    /// Replaces the codec of `#[silo(json)]` fields.
    pub fn with_json_codec(mut self, codec: Arc<dyn JsonCodec>) -> Self {
        self.context.json = codec;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn cachers(&self) -> &CacherManager {
        &self.cachers
    }

    pub fn session<'a, E: Executor>(&'a self, executor: &'a mut E) -> Session<'a, E> {
        Session::new(self, executor)
    }

    pub fn set_default_cacher(&self, cacher: Option<Arc<dyn Cacher>>) {
        self.cachers.set_default_cacher(cacher);
    }

    /// Cacher of one table, `None` disables caching of the table.
    pub fn set_cacher(&self, table: impl Into<String>, cacher: Option<Arc<dyn Cacher>>) {
        self.cachers.set_cacher(table, cacher);
    }

    /// Same as [`Engine::set_cacher`] on the table of `T`.
    pub fn map_cacher<T: Bean>(&self, cacher: Option<Arc<dyn Cacher>>) {
        let table = self.table_info::<T>();
        self.cachers.set_cacher(table.name.to_string(), cacher);
    }

    pub fn get_cacher(&self, table: &str) -> Option<Arc<dyn Cacher>> {
        self.cachers.get_cacher(table)
    }

    /// Drops the id lists and beans cached for the table of `T`.
    pub fn clear_cache<T: Bean>(&self) {
        let table = self.table_info::<T>();
        self.clear_table_cache(&table.name);
    }

    pub fn clear_table_cache(&self, table: &str) {
        if let Some(cacher) = self.get_cacher(table) {
            log::debug!("Clearing the cache of `{}`", table);
            cacher.clear_ids(table);
            cacher.clear_beans(table);
        }
    }

    /// Drops the id lists of the table of `T` and the bean with the given key.
    pub fn clear_cache_bean<T: Bean>(&self, key: &PrimaryKey) {
        let table = self.table_info::<T>();
        if let Some(cacher) = self.get_cacher(&table.name) {
            cacher.clear_ids(&table.name);
            cacher.del_bean(&table.name, key);
        }
    }

    /// Forgets the descriptor of `T`, it is described again on next use.
    pub fn unmap_type<T: Bean>(&self) {
        self.registry.unmap::<T>();
    }

    pub fn table_info<T: Bean>(&self) -> Arc<TableDescriptor> {
        self.registry.describe::<T>()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
