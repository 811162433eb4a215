use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Result of a user cleaning step for one field. `Ignore` marks the whole
/// record as not worth keeping; the dispatcher drops ignored records before
/// they reach `process_item`.
#[derive(Debug, Clone)]
pub enum Cleaned {
    Value(Value),
    Ignore,
}

/// A structured record produced by a callback: named fields extracted from a
/// response, plus an ignore flag.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    name: String,
    fields: HashMap<String, Value>,
    ignored: bool,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
            ignored: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Store the outcome of a cleaning step. `Cleaned::Ignore` flags the
    /// whole record.
    pub fn insert_cleaned(&mut self, field: impl Into<String>, cleaned: Cleaned) -> &mut Self {
        match cleaned {
            Cleaned::Value(value) => {
                self.fields.insert(field.into(), value);
            }
            Cleaned::Ignore => self.ignored = true,
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn ignore(&mut self) {
        self.ignored = true;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_round_trip() {
        let mut item = Item::new("book");
        item.insert("title", "Dune").insert("price", json!(9.99));

        assert_eq!(item.name(), "book");
        assert_eq!(item.get("title"), Some(&json!("Dune")));
        assert_eq!(item.len(), 2);
        assert!(!item.is_ignored());
    }

    #[test]
    fn cleaning_step_can_ignore_the_record() {
        let mut item = Item::new("book");
        item.insert_cleaned("title", Cleaned::Value(json!("Dune")));
        item.insert_cleaned("price", Cleaned::Ignore);

        assert!(item.is_ignored());
        assert_eq!(item.get("title"), Some(&json!("Dune")));
        assert_eq!(item.get("price"), None);
    }

    #[test]
    fn serializes_with_fields() {
        let item = Item::new("entry").with_field("id", 7);
        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out["name"], "entry");
        assert_eq!(out["fields"]["id"], 7);
    }
}
