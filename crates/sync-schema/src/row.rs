use std::collections::HashMap;

use crate::value::Value;

/// An unordered mapping from a column's `qualified_name` (`table.column`) to
/// its decoded [`Value`] for one denormalized, join-expanded row.
///
/// Keying by qualified name rather than a `Column` pointer keeps `Row`
/// independent of the arena lifetime of the [`crate::Rule`] it was decoded
/// against, per spec.md §9 Design Notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(HashMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, qualified_name: impl Into<String>, value: Value) {
        self.0.insert(qualified_name.into(), value);
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Value> {
        self.0.get(qualified_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// The document materialized for one main-table id: every column's
/// `mapping_name` mapped to its value, plus the synthetic `id` field that
/// the sink uses as the document identity (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Value,
    pub fields: HashMap<String, Value>,
}

impl Document {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.into());
        }
        map.insert("id".to_string(), (&self.id).into());
        serde_json::Value::Object(map)
    }
}
