// File: src/table.rs
//
// Open-addressing hash table with linear probing and tombstones, keyed by
// interned string objects. Used for globals, class method tables,
// instance field tables, and (by the heap) the string interner itself.

use crate::object::{fnv1a_hash, ObjRef};
use crate::value::Value;

const MAX_LOAD: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    key: Option<ObjRef>,
    value: Value,
}

fn empty_entry() -> Entry {
    Entry {
        key: None,
        value: Value::Nil,
    }
}

fn tombstone() -> Entry {
    Entry {
        key: None,
        value: Value::Bool(true),
    }
}

pub struct Table {
    entries: Vec<Entry>,
    /// Count of live entries, not including tombstones. Drives the load
    /// factor that triggers a resize.
    len: usize,
}

impl Table {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, key: ObjRef) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::find_entry(&self.entries, key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Inserts or overwrites `key`. Returns `true` if this created a new
    /// entry (the key wasn't already present).
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        if self.needs_grow() {
            self.grow();
        }
        let idx = Self::find_entry(&self.entries, key);
        let is_new_key = self.entries[idx].key.is_none();
        if is_new_key && matches!(self.entries[idx].value, Value::Nil) {
            self.len += 1;
        }
        self.entries[idx] = Entry {
            key: Some(key),
            value,
        };
        is_new_key
    }

    /// Removes `key`, leaving a tombstone behind so later probes don't stop
    /// short of keys that were inserted after a collision with it.
    pub fn delete(&mut self, key: ObjRef) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = Self::find_entry(&self.entries, key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx] = tombstone();
        true
    }

    /// Finds an interned string by content rather than by `ObjRef`
    /// identity — the one place the table is probed before the candidate
    /// key object exists.
    pub fn find_string(&self, bytes: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut idx = (hash as usize) & mask;
        loop {
            let entry = &self.entries[idx];
            match entry.key {
                None if matches!(entry.value, Value::Nil) => return None,
                Some(k) => {
                    if let Some(s) = k.get().as_string() {
                        if s.hash == hash && &*s.bytes == bytes {
                            return Some(k);
                        }
                    }
                }
                None => {}
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Drops every entry whose key object is still unmarked (white) at the
    /// end of a GC trace phase, i.e. reachable only through this table.
    pub fn remove_white(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(k) = entry.key {
                if !k.get().marked.get() {
                    *entry = tombstone();
                    self.len -= 1;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    pub fn approx_bytes(&self) -> usize {
        self.entries.len() * std::mem::size_of::<Entry>()
    }

    fn needs_grow(&self) -> bool {
        (self.len + 1) as f64 > self.entries.len() as f64 * MAX_LOAD
    }

    fn grow(&mut self) {
        let new_cap = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };
        let mut new_entries = vec![empty_entry(); new_cap];
        let mut new_len = 0;
        for entry in &self.entries {
            if let Some(k) = entry.key {
                let idx = Self::find_entry(&new_entries, k);
                new_entries[idx] = Entry {
                    key: Some(k),
                    value: entry.value,
                };
                new_len += 1;
            }
        }
        self.entries = new_entries;
        self.len = new_len;
    }

    fn find_entry(entries: &[Entry], key: ObjRef) -> usize {
        let mask = entries.len() - 1;
        let mut idx = (key_hash(key) as usize) & mask;
        let mut tombstone_idx: Option<usize> = None;
        loop {
            let entry = &entries[idx];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Nil) {
                        return tombstone_idx.unwrap_or(idx);
                    } else if tombstone_idx.is_none() {
                        tombstone_idx = Some(idx);
                    }
                }
                Some(k) if k == key => return idx,
                Some(_) => {}
            }
            idx = (idx + 1) & mask;
        }
    }
}

fn key_hash(key: ObjRef) -> u32 {
    match key.get().as_string() {
        Some(s) => s.hash,
        None => unreachable!("table keys are always interned strings"),
    }
}

/// Re-exported so callers computing a key's hash before interning share the
/// same algorithm as the table itself.
pub fn hash_str(s: &str) -> u32 {
    fnv1a_hash(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Heap;

    #[test]
    fn set_get_delete_roundtrip() {
        let heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("answer", |_| {});
        assert!(table.set(key, Value::Number(42.0)));
        assert_eq!(table.get(key).unwrap().as_number(), Some(42.0));
        assert!(table.delete(key));
        assert!(table.get(key).is_none());
    }

    #[test]
    fn resizes_past_load_factor() {
        let heap = Heap::new();
        let mut table = Table::new();
        for i in 0..64 {
            let key = heap.intern(&format!("key{i}"), |_| {});
            table.set(key, Value::Number(i as f64));
        }
        assert_eq!(table.len(), 64);
        for i in 0..64 {
            let key = heap.intern(&format!("key{i}"), |_| {});
            assert_eq!(table.get(key).unwrap().as_number(), Some(i as f64));
        }
    }

    #[test]
    fn find_string_matches_by_content() {
        let heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("hello", |_| {});
        table.set(key, Value::Nil);
        let found = table.find_string("hello", hash_str("hello"));
        assert_eq!(found, Some(key));
        assert!(table.find_string("goodbye", hash_str("goodbye")).is_none());
    }
}
