//! Key Table
//!
//! The key → object map of a store. Objects live in a dense slot vector and
//! a hash index maps each key to its slot:
//!
//! ```text
//!   index: HashMap<String, usize>        slots: Vec<(String, Object)>
//!   ┌──────────┬───┐                     ┌───┬──────────────────────┐
//!   │ "user:1" │ 0 │ ──────────────────▶ │ 0 │ ("user:1", Object)   │
//!   │ "user:7" │ 1 │ ──────────────────▶ │ 1 │ ("user:7", Object)   │
//!   └──────────┴───┘                     └───┴──────────────────────┘
//! ```
//!
//! Removal swaps the last slot into the hole, so every operation stays O(1)
//! and uniform random sampling is a single index draw.

use super::object::Object;
use rand::seq::index;
use rand::Rng;
use std::collections::HashMap;

/// Key → object storage with O(1) random sampling.
#[derive(Debug, Default)]
pub struct KeyTable {
    index: HashMap<String, usize>,
    slots: Vec<(String, Object)>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.index.get(key).map(|&slot| &self.slots[slot].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        match self.index.get(key) {
            Some(&slot) => Some(&mut self.slots[slot].1),
            None => None,
        }
    }

    /// Inserts or replaces the object stored under `key`, returning the old one.
    pub fn insert(&mut self, key: String, obj: Object) -> Option<Object> {
        if let Some(&slot) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.slots[slot].1, obj));
        }
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push((key, obj));
        None
    }

    /// Removes `key`, returning its object.
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        let slot = self.index.remove(key)?;
        let (_, obj) = self.slots.swap_remove(slot);
        if let Some((moved_key, _)) = self.slots.get(slot) {
            if let Some(moved_slot) = self.index.get_mut(moved_key.as_str()) {
                *moved_slot = slot;
            }
        }
        Some(obj)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
    }

    /// Visits every key/object pair until `f` returns `false`.
    ///
    /// The walk is finite and restartable and never mutates the table.
    pub fn all<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Object) -> bool,
    {
        for (key, obj) in &self.slots {
            if !f(key, obj) {
                break;
            }
        }
    }

    /// Iterates keys in hash-index order, which is randomized per table.
    pub fn keys_unordered(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Draws up to `count` distinct entries uniformly at random.
    ///
    /// When the table holds no more than `count` entries, all of them are
    /// returned.
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<(&str, &Object)> {
        if count >= self.slots.len() {
            return self.slots.iter().map(|(k, o)| (k.as_str(), o)).collect();
        }
        index::sample(rng, self.slots.len(), count)
            .into_iter()
            .map(|slot| {
                let (key, obj) = &self.slots[slot];
                (key.as_str(), obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::ObjectType;

    fn obj(v: &'static str) -> Object {
        Object::new(v, ObjectType::String)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = KeyTable::new();
        assert!(table.insert("a".into(), obj("1")).is_none());
        assert!(table.insert("b".into(), obj("2")).is_none());
        assert!(table.insert("c".into(), obj("3")).is_none());
        assert_eq!(table.len(), 3);

        // removing a middle slot moves the last one into its place
        assert!(table.remove("a").is_some());
        assert_eq!(table.len(), 2);
        assert!(table.get("a").is_none());
        assert!(table.get("b").is_some());
        assert!(table.get("c").is_some());
        assert!(table.remove("c").is_some());
        assert!(table.remove("c").is_none());
        assert!(table.get("b").is_some());
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = KeyTable::new();
        table.insert("k".into(), obj("old"));
        let old = table.insert("k".into(), obj("new")).unwrap();
        assert_eq!(old.value().as_bytes().unwrap(), "old");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("k").unwrap().value().as_bytes().unwrap(), "new");
    }

    #[test]
    fn test_all_stops_early() {
        let mut table = KeyTable::new();
        for key in ["a", "b", "c", "d"] {
            table.insert(key.into(), obj("v"));
        }
        let mut seen = 0;
        table.all(|_, _| {
            seen += 1;
            seen < 2
        });
        assert_eq!(seen, 2);

        let mut all = Vec::new();
        table.all(|k, _| {
            all.push(k.to_string());
            true
        });
        assert_eq!(all, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_sample() {
        let mut table = KeyTable::new();
        let mut rng = rand::thread_rng();
        assert!(table.sample(5, &mut rng).is_empty());

        table.insert("only".into(), obj("v"));
        let sample = table.sample(5, &mut rng);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].0, "only");

        for i in 0..100 {
            table.insert(format!("key{}", i), obj("v"));
        }
        let mut keys: Vec<&str> = table.sample(20, &mut rng).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), 20);
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 20);
    }
}
