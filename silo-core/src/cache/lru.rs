use super::{CachedBean, Cacher};
use crate::PrimaryKey;
use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

struct Entry<V> {
    value: V,
    tick: u64,
    stored_at: Instant,
}

/// Bounded map evicting the least recently used entry, optionally expiring entries by age.
struct Lru<K, V> {
    tick: u64,
    entries: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
}

impl<K: Clone + Eq + Hash, V: Clone> Lru<K, V> {
    fn new() -> Self {
        Self {
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &K, expiry: Option<Duration>) -> Option<V> {
        let expired = {
            let entry = self.entries.get(key)?;
            expiry.is_some_and(|v| entry.stored_at.elapsed() > v)
        };
        if expired {
            self.remove(key);
            return None;
        }
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        Some(entry.value.clone())
    }

    fn put(&mut self, key: K, value: V, max_elements: usize) {
        let tick = self.next_tick();
        let previous = self.entries.insert(
            key.clone(),
            Entry {
                value,
                tick,
                stored_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            self.order.remove(&previous.tick);
        }
        self.order.insert(tick, key);
        while self.entries.len() > max_elements {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn remove(&mut self, key: &K) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        let order = &mut self.order;
        self.entries.retain(|k, v| {
            let result = keep(k);
            if !result {
                order.remove(&v.tick);
            }
            result
        });
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Inner {
    ids: Lru<(String, String), Arc<[PrimaryKey]>>,
    beans: Lru<(String, PrimaryKey), CachedBean>,
}

/// In memory [`Cacher`] keeping at most `max_elements` id lists and as many beans.
pub struct LruCacher {
    inner: Mutex<Inner>,
    max_elements: usize,
    expiry: Option<Duration>,
}

impl LruCacher {
    pub fn new(max_elements: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ids: Lru::new(),
                beans: Lru::new(),
            }),
            max_elements,
            expiry: None,
        }
    }

    /// Entries older than `expiry` are treated as absent.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn max_elements(&self) -> usize {
        self.max_elements
    }

    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    /// Number of id lists and beans currently stored.
    pub fn len(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.ids.len(), inner.beans.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LruCacher {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for LruCacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCacher")
            .field("max_elements", &self.max_elements)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Cacher for LruCacher {
    fn get_ids(&self, table: &str, fingerprint: &str) -> Option<Arc<[PrimaryKey]>> {
        self.lock()
            .ids
            .get(&(table.to_owned(), fingerprint.to_owned()), self.expiry)
    }

    fn put_ids(&self, table: &str, fingerprint: &str, ids: Arc<[PrimaryKey]>) {
        self.lock().ids.put(
            (table.to_owned(), fingerprint.to_owned()),
            ids,
            self.max_elements,
        );
    }

    fn del_ids(&self, table: &str, fingerprint: &str) {
        self.lock()
            .ids
            .remove(&(table.to_owned(), fingerprint.to_owned()));
    }

    fn clear_ids(&self, table: &str) {
        self.lock().ids.retain(|(t, _)| t != table);
    }

    fn get_bean(&self, table: &str, key: &PrimaryKey) -> Option<CachedBean> {
        self.lock()
            .beans
            .get(&(table.to_owned(), key.clone()), self.expiry)
    }

    fn put_bean(&self, table: &str, key: &PrimaryKey, bean: CachedBean) {
        self.lock()
            .beans
            .put((table.to_owned(), key.clone()), bean, self.max_elements);
    }

    fn del_bean(&self, table: &str, key: &PrimaryKey) {
        self.lock().beans.remove(&(table.to_owned(), key.clone()));
    }

    fn clear_beans(&self, table: &str) {
        self.lock().beans.retain(|(t, _)| t != table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::thread;

    fn key(id: i64) -> PrimaryKey {
        PrimaryKey::new(vec![Value::Int64(Some(id))])
    }

    #[test]
    fn evicts_least_recently_used() {
        let cacher = LruCacher::new(2);
        cacher.put_bean("t", &key(1), Arc::new(1_i32));
        cacher.put_bean("t", &key(2), Arc::new(2_i32));
        assert!(cacher.get_bean("t", &key(1)).is_some());
        cacher.put_bean("t", &key(3), Arc::new(3_i32));
        assert!(cacher.get_bean("t", &key(2)).is_none());
        assert!(cacher.get_bean("t", &key(1)).is_some());
        assert!(cacher.get_bean("t", &key(3)).is_some());
        assert_eq!(cacher.len(), (0, 2));
    }

    #[test]
    fn scoped_by_table() {
        let cacher = LruCacher::default();
        cacher.put_ids("a", "q", Arc::from(vec![key(1)]));
        cacher.put_ids("b", "q", Arc::from(vec![key(2)]));
        cacher.put_bean("a", &key(1), Arc::new("a1"));
        cacher.put_bean("b", &key(1), Arc::new("b1"));
        cacher.clear_ids("a");
        assert!(cacher.get_ids("a", "q").is_none());
        assert_eq!(cacher.get_ids("b", "q").unwrap().as_ref(), &[key(2)]);
        cacher.clear_beans("b");
        assert!(cacher.get_bean("b", &key(1)).is_none());
        let bean = cacher.get_bean("a", &key(1)).unwrap();
        assert_eq!(bean.downcast_ref::<&str>(), Some(&"a1"));
        cacher.del_bean("a", &key(1));
        assert!(cacher.get_bean("a", &key(1)).is_none());
    }

    #[test]
    fn entries_expire() {
        let cacher = LruCacher::new(10).with_expiry(Duration::from_millis(30));
        cacher.put_ids("t", "q", Arc::from(vec![key(1)]));
        assert!(cacher.get_ids("t", "q").is_some());
        thread::sleep(Duration::from_millis(60));
        assert!(cacher.get_ids("t", "q").is_none());
        assert_eq!(cacher.len(), (0, 0));
    }
}
