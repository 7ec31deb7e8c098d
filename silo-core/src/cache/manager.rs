use super::Cacher;
use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

/// Registry of the cachers in use: one per table, with an optional default for the rest.
///
/// A table mapped to `None` is never cached, default cacher or not.
#[derive(Default)]
pub struct CacherManager {
    cachers: RwLock<HashMap<String, Option<Arc<dyn Cacher>>>>,
    default: RwLock<Option<Arc<dyn Cacher>>>,
    disable_global: AtomicBool,
}

impl CacherManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// When set, only tables with their own cacher are cached.
    pub fn set_disable_global(&self, disable: bool) {
        self.disable_global.store(disable, Ordering::Relaxed);
    }

    pub fn is_global_disabled(&self) -> bool {
        self.disable_global.load(Ordering::Relaxed)
    }

    pub fn set_default_cacher(&self, cacher: Option<Arc<dyn Cacher>>) {
        *self.default.write().unwrap_or_else(PoisonError::into_inner) = cacher;
    }

    pub fn set_cacher(&self, table: impl Into<String>, cacher: Option<Arc<dyn Cacher>>) {
        self.cachers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.into(), cacher);
    }

    /// Forgets the table mapping, the table falls back to the default cacher.
    pub fn unset_cacher(&self, table: &str) {
        self.cachers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table);
    }

    pub fn get_cacher(&self, table: &str) -> Option<Arc<dyn Cacher>> {
        if let Some(cacher) = self
            .cachers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
        {
            return cacher.clone();
        }
        if self.is_global_disabled() {
            return None;
        }
        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for CacherManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self
            .cachers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        f.debug_struct("CacherManager")
            .field("tables", &tables)
            .field("disable_global", &self.is_global_disabled())
            .finish_non_exhaustive()
    }
}
