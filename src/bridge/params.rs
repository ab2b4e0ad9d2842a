//! Nested parameter maps built from bracketed keys.
//!
//! `user[name]=ada&tags[]=a&tags[]=b` becomes
//! `{user: {name: ada}, tags: {0: a, 1: b}}`. A key assigned twice keeps the
//! last value; `[]` appends with the next integer index.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Bracket groups deeper than this drop the parameter.
pub const MAX_NESTING_DEPTH: usize = 64;

/// One node of a parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue<T = String> {
    Value(T),
    Map(ParamMap<T>),
}

impl<T> ParamValue<T> {
    pub fn as_value(&self) -> Option<&T> {
        match self {
            ParamValue::Value(v) => Some(v),
            ParamValue::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&ParamMap<T>> {
        match self {
            ParamValue::Map(m) => Some(m),
            ParamValue::Value(_) => None,
        }
    }
}

/// Insertion-ordered map of parameter names to values or nested maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMap<T = String> {
    entries: Vec<(String, ParamValue<T>)>,
    positions: HashMap<String, usize>,
    next_index: usize,
}

impl<T> Default for ParamMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            next_index: 0,
        }
    }
}

impl<T> ParamMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under a raw, possibly bracketed, key.
    pub fn insert(&mut self, raw_key: &str, value: T) {
        let (base, segments) = split_key(raw_key);
        if segments.len() > MAX_NESTING_DEPTH {
            return;
        }
        self.insert_at(base, &segments, value);
    }

    fn insert_at(&mut self, key: String, rest: &[String], value: T) {
        let key = if key.is_empty() {
            self.next_index.to_string()
        } else {
            key
        };

        let Some((next, tail)) = rest.split_first() else {
            self.set(key, ParamValue::Value(value));
            return;
        };

        let pos = match self.position(&key) {
            Some(pos) => {
                if !matches!(self.entries[pos].1, ParamValue::Map(_)) {
                    self.entries[pos].1 = ParamValue::Map(ParamMap::default());
                }
                pos
            }
            None => self.push(key, ParamValue::Map(ParamMap::default())),
        };

        if let ParamValue::Map(child) = &mut self.entries[pos].1 {
            child.insert_at(next.clone(), tail, value);
        }
    }

    fn set(&mut self, key: String, value: ParamValue<T>) {
        match self.position(&key) {
            Some(pos) => self.entries[pos].1 = value,
            None => {
                self.push(key, value);
            }
        }
    }

    fn push(&mut self, key: String, value: ParamValue<T>) -> usize {
        if let Ok(index) = key.parse::<usize>() {
            self.next_index = self.next_index.max(index.saturating_add(1));
        }
        let pos = self.entries.len();
        self.positions.insert(key.clone(), pos);
        self.entries.push((key, value));
        pos
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue<T>> {
        self.position(key).map(|pos| &self.entries[pos].1)
    }

    /// Leaf value under `key`, if `key` holds a value rather than a map.
    pub fn value(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(ParamValue::as_value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue<T>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of leaf values in the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, v)| match v {
                ParamValue::Value(_) => 1,
                ParamValue::Map(m) => m.leaf_count(),
            })
            .sum()
    }

    /// Build a tree of the same shape with every leaf mapped through `f`.
    pub fn map_values<U>(&self, f: &impl Fn(&T) -> U) -> ParamMap<U> {
        ParamMap {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| {
                    let mapped = match v {
                        ParamValue::Value(v) => ParamValue::Value(f(v)),
                        ParamValue::Map(m) => ParamValue::Map(m.map_values(f)),
                    };
                    (k.clone(), mapped)
                })
                .collect(),
            positions: self.positions.clone(),
            next_index: self.next_index,
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ParamMap<String> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v.into());
        }
        map
    }
}

impl<T: Serialize> Serialize for ParamMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<T: Serialize> Serialize for ParamValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Value(v) => v.serialize(serializer),
            ParamValue::Map(m) => m.serialize(serializer),
        }
    }
}

/// Split `a[b][]` into `("a", ["b", ""])`.
///
/// A key without a well-formed first bracket group is taken literally.
fn split_key(raw: &str) -> (String, Vec<String>) {
    let Some(open) = raw.find('[') else {
        return (raw.to_string(), Vec::new());
    };
    if open == 0 {
        return (raw.to_string(), Vec::new());
    }

    let mut segments = Vec::new();
    let mut rest = &raw[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                segments.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            None => break,
        }
    }

    if segments.is_empty() {
        return (raw.to_string(), Vec::new());
    }
    (raw[..open].to_string(), segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_last_value_wins() {
        let map: ParamMap = [("name", "a"), ("name", "b"), ("other", "c")]
            .into_iter()
            .collect();
        assert_eq!(map.value("name").map(String::as_str), Some("b"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["name", "other"]);
    }

    #[test]
    fn bracket_append_builds_list() {
        let map: ParamMap = [("tags[]", "a"), ("tags[]", "b")].into_iter().collect();
        let tags = map.get("tags").and_then(ParamValue::as_map).unwrap();
        assert_eq!(tags.value("0").map(String::as_str), Some("a"));
        assert_eq!(tags.value("1").map(String::as_str), Some("b"));
        assert_eq!(map.leaf_count(), 2);
    }

    #[test]
    fn nested_keys() {
        let map: ParamMap = [("user[name]", "ada"), ("user[roles][]", "admin")]
            .into_iter()
            .collect();
        let user = map.get("user").and_then(ParamValue::as_map).unwrap();
        assert_eq!(user.value("name").map(String::as_str), Some("ada"));
        let roles = user.get("roles").and_then(ParamValue::as_map).unwrap();
        assert_eq!(roles.value("0").map(String::as_str), Some("admin"));
    }

    #[test]
    fn append_continues_after_explicit_index() {
        let map: ParamMap = [("list[5]", "x"), ("list[]", "y")].into_iter().collect();
        let list = map.get("list").and_then(ParamValue::as_map).unwrap();
        assert_eq!(list.value("6").map(String::as_str), Some("y"));
    }

    #[test]
    fn largest_index_key_is_stored() {
        let map: ParamMap = [("18446744073709551615", "x"), ("list[18446744073709551615]", "y")]
            .into_iter()
            .collect();
        assert_eq!(map.value("18446744073709551615").map(String::as_str), Some("x"));

        let list = map.get("list").and_then(ParamValue::as_map).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn many_distinct_keys_keep_insertion_order() {
        let map: ParamMap = (0..200_000).map(|i| (format!("k{i}"), "v")).collect();
        assert_eq!(map.len(), 200_000);
        assert_eq!(map.keys().next(), Some("k0"));
        assert_eq!(map.keys().last(), Some("k199999"));
        assert!(map.contains_key("k123456"));
    }

    #[test]
    fn overly_nested_keys_are_dropped() {
        let deep = format!("a{}", "[]".repeat(MAX_NESTING_DEPTH + 1));
        let ok = format!("b{}", "[]".repeat(MAX_NESTING_DEPTH));
        let map: ParamMap = [(deep.as_str(), "x"), (ok.as_str(), "y")].into_iter().collect();
        assert!(!map.contains_key("a"));
        assert!(map.contains_key("b"));
    }

    #[test]
    fn malformed_brackets_are_literal() {
        assert_eq!(split_key("a[b"), ("a[b".to_string(), vec![]));
        assert_eq!(split_key("[x]"), ("[x]".to_string(), vec![]));
        assert_eq!(
            split_key("a[b][c]junk"),
            ("a".to_string(), vec!["b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn serializes_as_nested_json() {
        let map: ParamMap = [("a", "1"), ("b[c]", "2")].into_iter().collect();
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"a": "1", "b": {"c": "2"}}));
    }
}
