//! String interning.
//!
//! A [`StringPool`] maps strings to small integer ids so that names can be compared and
//! used as table keys without touching their contents. Ids start at 1 and are never
//! reused, not even after [`StringPool::flush_all`]; `0` means "not found".

use std::sync::{Arc, RwLock};

use crate::{FastHashMap, error::XMLError};

/// The id returned for strings that are not interned.
pub const NOT_FOUND: u32 = 0;

#[derive(Debug, Clone, Default)]
pub struct StringPool {
    ids: FastHashMap<Arc<str>, u32>,
    // `values[id - flushed - 1]` is the string for `id`
    values: Vec<Arc<str>>,
    // the number of ids issued before the last `flush_all`
    flushed: u32,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s` and return its id.
    ///
    /// Calling this again with the same string returns the same id and does not change
    /// [`StringPool::string_count`].
    pub fn add_or_find(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let value: Arc<str> = s.into();
        self.values.push(value.clone());
        let id = self.flushed + self.values.len() as u32;
        self.ids.insert(value, id);
        id
    }

    /// Returns [`NOT_FOUND`] if `s` has not been interned.
    pub fn id_of(&self, s: &str) -> u32 {
        self.ids.get(s).copied().unwrap_or(NOT_FOUND)
    }

    /// Retrieve the string for `id`.
    ///
    /// An id that was never issued by this pool (or was issued before
    /// [`StringPool::flush_all`]) is an error.
    pub fn value_of(&self, id: u32) -> Result<&str, XMLError> {
        self.index_of(id)
            .map(|index| self.values[index].as_ref())
            .ok_or(XMLError::PoolIdNotFound)
    }

    /// Same as [`StringPool::value_of`], but shares the stored string.
    pub fn shared_value_of(&self, id: u32) -> Result<Arc<str>, XMLError> {
        self.index_of(id)
            .map(|index| self.values[index].clone())
            .ok_or(XMLError::PoolIdNotFound)
    }

    fn index_of(&self, id: u32) -> Option<usize> {
        let index = id.checked_sub(self.flushed + 1)? as usize;
        (index < self.values.len()).then_some(index)
    }

    pub fn exists(&self, s: &str) -> bool {
        self.ids.contains_key(s)
    }

    pub fn exists_id(&self, id: u32) -> bool {
        self.index_of(id).is_some()
    }

    pub fn string_count(&self) -> usize {
        self.values.len()
    }

    /// Remove all strings. Previously issued ids become invalid.
    ///
    /// Numbering continues after the last issued id, so a stale id never names a
    /// string interned after the flush.
    pub fn flush_all(&mut self) {
        self.flushed += self.values.len() as u32;
        self.ids.clear();
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| (self.flushed + index as u32 + 1, value.as_ref()))
    }
}

/// A [`StringPool`] that can be shared between threads.
#[derive(Debug, Default)]
pub struct SyncStringPool {
    inner: RwLock<StringPool>,
}

impl SyncStringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_find(&self, s: &str) -> u32 {
        // most lookups hit existing entries
        let id = self.id_of(s);
        if id != NOT_FOUND {
            return id;
        }
        self.inner
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .add_or_find(s)
    }

    pub fn id_of(&self, s: &str) -> u32 {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .id_of(s)
    }

    pub fn value_of(&self, id: u32) -> Result<Arc<str>, XMLError> {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .shared_value_of(id)
    }

    pub fn exists(&self, s: &str) -> bool {
        self.id_of(s) != NOT_FOUND
    }

    pub fn string_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .string_count()
    }

    pub fn flush_all(&self) {
        self.inner
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .flush_all();
    }
}

impl From<StringPool> for SyncStringPool {
    fn from(pool: StringPool) -> Self {
        Self {
            inner: RwLock::new(pool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_or_find_tests() {
        let mut pool = StringPool::new();
        let a = pool.add_or_find("a");
        let b = pool.add_or_find("b");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(pool.add_or_find("a"), a);
        assert_eq!(pool.string_count(), 2);
        assert_eq!(pool.value_of(b).unwrap(), "b");
        assert_eq!(pool.id_of("c"), NOT_FOUND);
        assert!(matches!(pool.value_of(0), Err(XMLError::PoolIdNotFound)));
        assert!(matches!(pool.value_of(3), Err(XMLError::PoolIdNotFound)));
    }

    #[test]
    fn flush_all_tests() {
        let mut pool = StringPool::new();
        let x = pool.add_or_find("x");
        pool.add_or_find("z");
        pool.flush_all();
        assert_eq!(pool.string_count(), 0);
        assert!(!pool.exists("x"));
        assert!(!pool.exists_id(x));
        assert!(pool.value_of(x).is_err());

        // ids issued before the flush stay dead
        let y = pool.add_or_find("y");
        assert_eq!(y, 3);
        assert!(pool.value_of(x).is_err());
        assert_eq!(pool.value_of(y).unwrap(), "y");
        assert_eq!(pool.add_or_find("x"), 4);
        assert_eq!(pool.iter().collect::<Vec<_>>(), [(3, "y"), (4, "x")]);
        assert!(!pool.exists_id(NOT_FOUND));
    }

    #[test]
    fn sync_pool_tests() {
        let pool = Arc::new(SyncStringPool::new());
        let handles = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| pool.add_or_find(&format!("name{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(pool.string_count(), 100);
    }
}
