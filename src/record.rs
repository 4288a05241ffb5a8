use indexmap::IndexMap;

use crate::data::Value;

/// One row as read from a backup, keyed by source column name in source order.
///
/// Dump records also keep the decoded text of every non-null field, so a
/// character column receives exactly what the backup held.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRecord {
    fields: IndexMap<String, Value>,
    text: IndexMap<String, String>,
}

impl SourceRecord {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            fields: pairs.into_iter().collect(),
            text: IndexMap::new(),
        }
    }

    pub fn with_text<I>(mut self, text: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.text = text.into_iter().collect();
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Field text before typing; `None` for snapshot records and null fields.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.text.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A row shaped for the live schema, keyed by target column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetRow {
    fields: IndexMap<String, Value>,
}

impl TargetRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.fields.insert(column.into(), value);
    }

    /// Removes a column, keeping the order of the remaining ones.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.shift_remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// True when the column is absent or holds a blank value.
    pub fn is_missing(&self, column: &str) -> bool {
        self.fields.get(column).is_none_or(Value::is_blank)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for TargetRow {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
