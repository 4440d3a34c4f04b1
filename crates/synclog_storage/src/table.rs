//! Row table shared by the store implementations.

use crate::store::{FindQuery, StoreRow};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry {
    metadata: Value,
    value: Value,
}

/// Ordered rows of one store.
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: BTreeMap<String, Entry>,
    skip_metadata: bool,
}

impl Table {
    pub(crate) fn new(skip_metadata: bool) -> Self {
        Self {
            rows: BTreeMap::new(),
            skip_metadata,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn upsert(&mut self, key: &str, metadata: Value, value: Value) {
        let metadata = if self.skip_metadata { Value::Null } else { metadata };
        self.rows
            .insert(key.to_string(), Entry { metadata, value });
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.rows.remove(key).is_some()
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.rows.get(key).map(|e| e.value.clone())
    }

    pub(crate) fn row(&self, key: &str) -> Option<StoreRow> {
        self.rows.get(key).map(|e| StoreRow {
            key: key.to_string(),
            metadata: e.metadata.clone(),
            value: e.value.clone(),
        })
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.rows.keys().cloned().collect()
    }

    pub(crate) fn rows(&self) -> Vec<StoreRow> {
        self.rows
            .iter()
            .map(|(key, e)| StoreRow {
                key: key.clone(),
                metadata: e.metadata.clone(),
                value: e.value.clone(),
            })
            .collect()
    }

    pub(crate) fn find(&self, query: &FindQuery) -> Vec<Value> {
        let mut docs: Vec<Value> = self
            .rows
            .iter()
            .map(|(key, e)| {
                let mut doc = Map::new();
                doc.insert("key".into(), Value::String(key.clone()));
                doc.insert("metadata".into(), e.metadata.clone());
                doc.insert("value".into(), e.value.clone());
                Value::Object(doc)
            })
            .collect();

        if !query.sort.is_empty() {
            docs.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|path| compare_values(lookup(a, path), lookup(b, path)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        if query.fields.is_empty() {
            return docs;
        }

        docs.iter()
            .map(|doc| {
                let mut projected = Map::new();
                for path in &query.fields {
                    if let Some(v) = lookup(doc, path) {
                        assign(&mut projected, path, v.clone());
                    }
                }
                Value::Object(projected)
            })
            .collect()
    }
}

/// Resolves a dotted path inside a document.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn assign(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                assign(map, rest, value);
            }
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Orders values: missing first, then by type, then by content.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> Table {
        let mut t = Table::new(false);
        t.upsert("b", json!({"created": 2}), json!({"name": "beta", "n": 10}));
        t.upsert("a", json!({"created": 3}), json!({"name": "alpha", "n": 30}));
        t.upsert("c", json!({"created": 1}), json!({"name": "gamma"}));
        t
    }

    #[test]
    fn find_sorts_by_key() {
        let docs = table().find(&FindQuery::new().sort_by("key"));
        let keys: Vec<_> = docs.iter().map(|d| d["key"].as_str().unwrap()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn find_sorts_by_nested_number() {
        let docs = table().find(&FindQuery::new().sort_by("metadata.created"));
        let keys: Vec<_> = docs.iter().map(|d| d["key"].as_str().unwrap()).collect();
        assert_eq!(keys, ["c", "b", "a"]);
    }

    #[test]
    fn missing_sort_values_come_first() {
        let docs = table().find(&FindQuery::new().sort_by("value.n"));
        let keys: Vec<_> = docs.iter().map(|d| d["key"].as_str().unwrap()).collect();
        assert_eq!(keys, ["c", "b", "a"]);
    }

    #[test]
    fn find_projects_fields() {
        let docs = table().find(&FindQuery::new().sort_by("key").field("key").field("value.name"));
        assert_eq!(docs[0], json!({"key": "a", "value": {"name": "alpha"}}));
    }

    #[test]
    fn skip_metadata_discards_metadata() {
        let mut t = Table::new(true);
        t.upsert("k", json!({"created": 1}), json!(1));
        assert_eq!(t.rows()[0].metadata, Value::Null);
    }

    #[test]
    fn lookup_into_arrays() {
        let doc = json!({"value": {"rows": [{"id": 7}]}});
        assert_eq!(lookup(&doc, "value.rows.0.id"), Some(&json!(7)));
        assert_eq!(lookup(&doc, "value.rows.4.id"), None);
    }
}
