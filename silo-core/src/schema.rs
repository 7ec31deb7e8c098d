use crate::{Bean, TableDescriptor};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Type keyed cache of [`TableDescriptor`]s, each described once and shared afterwards.
#[derive(Default, Debug)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<TypeId, Arc<TableDescriptor>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn describe<T: Bean>(&self) -> Arc<TableDescriptor> {
        let id = TypeId::of::<T>();
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return table.clone();
        }
        let table = Arc::new(T::describe());
        log::debug!("Described {} as table `{}`", table.type_name, table.name);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert(table)
            .clone()
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<TableDescriptor>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn unmap<T: 'static>(&self) -> Option<Arc<TableDescriptor>> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<T>())
    }

    pub fn clear(&self) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
