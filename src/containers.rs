use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::leak_detector::{self, Tracked};
use crate::value::Value;

/// Ordered sequence of values with cheap insertion at both ends.
#[derive(Debug)]
pub struct ArrayValue {
    items: VecDeque<Value>,
}

impl ArrayValue {
    pub fn new() -> Self {
        Self::from_deque(VecDeque::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_deque(VecDeque::with_capacity(capacity))
    }

    fn from_deque(items: VecDeque<Value>) -> Self {
        leak_detector::record_alloc(Tracked::Array);
        ArrayValue { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Overwrites an existing slot, handing back the previous occupant.
    pub fn set(&mut self, index: usize, value: Value) -> Option<Value> {
        self.items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    pub fn push_back(&mut self, value: Value) {
        self.items.push_back(value);
    }

    pub fn push_front(&mut self, value: Value) {
        self.items.push_front(value);
    }

    pub fn pop_back(&mut self) -> Option<Value> {
        self.items.pop_back()
    }

    pub fn pop_front(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    /// Inserts at `index`, shifting later elements. Returns false when
    /// `index > len`.
    pub fn insert(&mut self, index: usize, value: Value) -> bool {
        if index > self.items.len() {
            return false;
        }
        self.items.insert(index, value);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }
}

impl Default for ArrayValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ArrayValue {
    fn clone(&self) -> Self {
        Self::from_deque(self.items.clone())
    }
}

impl Drop for ArrayValue {
    fn drop(&mut self) {
        leak_detector::record_release(Tracked::Array);
    }
}

impl FromIterator<Value> for ArrayValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_deque(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for ArrayValue {
    fn from(items: Vec<Value>) -> Self {
        Self::from_deque(items.into())
    }
}

/// String-keyed mapping of values. Keys are unique; iteration follows
/// insertion order, although nothing in the runtime relies on it.
#[derive(Debug)]
pub struct DictValue {
    index: HashMap<Rc<str>, usize>,
    entries: Vec<(Rc<str>, Value)>,
}

impl DictValue {
    pub fn new() -> Self {
        Self::from_parts(HashMap::new(), Vec::new())
    }

    fn from_parts(index: HashMap<Rc<str>, usize>, entries: Vec<(Rc<str>, Value)>) -> Self {
        leak_detector::record_alloc(Tracked::Dict);
        DictValue { index, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index
            .get(key)
            .and_then(|&idx| self.entries.get(idx))
            .map(|(_, v)| v)
    }

    /// Inserts or overwrites, returning the previous value for `key`.
    pub fn set(&mut self, key: &str, value: Value) -> Option<Value> {
        if let Some(&idx) = self.index.get(key) {
            if let Some((_, v)) = self.entries.get_mut(idx) {
                return Some(std::mem::replace(v, value));
            }
        }

        let key: Rc<str> = Rc::from(key);
        let idx = self.entries.len();
        self.entries.push((key.clone(), value));
        self.index.insert(key, idx);
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.index.remove(key)?;
        let (_k, v) = self.entries.remove(idx);

        // Rebuild index for shifted entries.
        for (i, (k, _)) in self.entries.iter().enumerate().skip(idx) {
            self.index.insert(k.clone(), i);
        }

        Some(v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_ref())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl Default for DictValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DictValue {
    fn clone(&self) -> Self {
        Self::from_parts(self.index.clone(), self.entries.clone())
    }
}

impl Drop for DictValue {
    fn drop(&mut self) {
        leak_detector::record_release(Tracked::Dict);
    }
}

impl<K: AsRef<str>> FromIterator<(K, Value)> for DictValue {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut dict = DictValue::new();
        for (k, v) in iter {
            dict.set(k.as_ref(), v);
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: &Value) -> i32 {
        match value {
            Value::Int(n) => *n,
            other => panic!("expected Int, got {}", other.type_name()),
        }
    }

    // ==================== ArrayValue Tests ====================

    #[test]
    fn test_array_both_ends() {
        let mut arr = ArrayValue::new();
        arr.push_back(Value::Int(2));
        arr.push_back(Value::Int(3));
        arr.push_front(Value::Int(1));

        assert_eq!(arr.len(), 3);
        let items: Vec<i32> = arr.iter().map(int).collect();
        assert_eq!(items, vec![1, 2, 3]);

        assert_eq!(arr.pop_front().map(|v| int(&v)), Some(1));
        assert_eq!(arr.pop_back().map(|v| int(&v)), Some(3));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn test_array_set_and_insert() {
        let mut arr: ArrayValue = vec![Value::Int(1), Value::Int(3)].into();
        assert!(arr.insert(1, Value::Int(2)));
        assert!(arr.insert(3, Value::Int(4)));
        assert!(!arr.insert(9, Value::Int(0)));

        let old = arr.set(0, Value::Int(10));
        assert_eq!(old.map(|v| int(&v)), Some(1));
        assert!(arr.set(4, Value::Int(0)).is_none());

        let items: Vec<i32> = arr.iter().map(int).collect();
        assert_eq!(items, vec![10, 2, 3, 4]);
    }

    #[test]
    fn test_array_get_out_of_range() {
        let arr: ArrayValue = (0..3).map(Value::Int).collect();
        assert!(arr.get(2).is_some());
        assert!(arr.get(3).is_none());
    }

    // ==================== DictValue Tests ====================

    #[test]
    fn test_dict_insert_and_overwrite() {
        let mut dict = DictValue::new();
        assert!(dict.set("a", Value::Int(1)).is_none());
        assert!(dict.set("b", Value::Int(2)).is_none());

        let previous = dict.set("a", Value::Int(11));
        assert_eq!(previous.map(|v| int(&v)), Some(1));
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("a").map(int), Some(11));
        assert!(dict.get("c").is_none());
    }

    #[test]
    fn test_dict_remove_reindexes() {
        let mut dict: DictValue = [("x", Value::Int(1)), ("y", Value::Int(2)), ("z", Value::Int(3))]
            .into_iter()
            .collect();

        assert_eq!(dict.remove("x").map(|v| int(&v)), Some(1));
        assert!(!dict.contains_key("x"));
        assert_eq!(dict.get("y").map(int), Some(2));
        assert_eq!(dict.get("z").map(int), Some(3));
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["y", "z"]);
        assert!(dict.remove("x").is_none());
    }

    #[test]
    fn test_dict_exact_key_match() {
        let mut dict = DictValue::new();
        dict.set("Key", Value::Bool(true));
        assert!(dict.get("key").is_none());
        assert!(dict.get("Key ").is_none());
        assert!(dict.contains_key("Key"));
    }

    #[test]
    fn test_clones_are_tracked() {
        let before = leak_detector::snapshot();
        {
            let arr = ArrayValue::new();
            let _copy = arr.clone();
            let dict = DictValue::new();
            let _dcopy = dict.clone();
            let during = leak_detector::snapshot();
            assert_eq!(during.arrays, before.arrays + 2);
            assert_eq!(during.dicts, before.dicts + 2);
        }
        assert_eq!(leak_detector::snapshot(), before);
    }
}
