//! Append-only, insertion-ordered record of everything a session produced.
//!
//! Labels keep the order in which they were first stored, and values keep the
//! order in which they were appended under their label. Nothing is ever
//! removed. "Latest" is defined against this explicit order, not against the
//! iteration order of a hash map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// All values recorded under a single label, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    pub values: Vec<String>,
}

impl HistoryEntry {
    /// The most recently appended value. Stored and loaded entries always
    /// have one.
    pub fn last_value(&self) -> Option<&str> {
        self.values.last().map(String::as_str)
    }
}

/// Ordered `label -> values` store shared by the engine and the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<HistoryEntry>", into = "Vec<HistoryEntry>")]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    index: HashMap<String, usize>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `label`, creating the label if it is new.
    pub fn store(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.index.get(&label) {
            Some(&pos) => self.entries[pos].values.push(value),
            None => {
                self.index.insert(label.clone(), self.entries.len());
                self.entries.push(HistoryEntry {
                    label,
                    values: vec![value],
                });
            }
        }
    }

    /// Every value stored under `label`, or an empty slice for unknown labels.
    pub fn get_all(&self, label: &str) -> &[String] {
        self.index
            .get(label)
            .map(|&pos| self.entries[pos].values.as_slice())
            .unwrap_or(&[])
    }

    /// Last value of the most recently *created* label.
    ///
    /// Appending again to an older label does not make it the latest one.
    pub fn get_latest(&self) -> Option<&str> {
        self.entries.last().and_then(HistoryEntry::last_value)
    }

    /// One `"<label>: <last value>"` line per label, in creation order.
    pub fn summarize_history(&self) -> String {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .last_value()
                    .map(|value| format!("{}: {}", entry.label, value))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a serialized history could not be loaded back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryLoadError {
    #[error("history entry {label:?} has no values")]
    EmptyValues { label: String },
    #[error("history label {label:?} appears more than once")]
    DuplicateLabel { label: String },
}

/// Rebuild a store from its serialized entries. Every entry a store writes
/// has a unique label and at least one value; anything else is rejected
/// rather than merged or dropped.
impl TryFrom<Vec<HistoryEntry>> for HistoryStore {
    type Error = HistoryLoadError;

    fn try_from(entries: Vec<HistoryEntry>) -> Result<Self, Self::Error> {
        let mut store = HistoryStore::new();
        for entry in entries {
            if entry.values.is_empty() {
                return Err(HistoryLoadError::EmptyValues { label: entry.label });
            }
            if store.contains(&entry.label) {
                return Err(HistoryLoadError::DuplicateLabel { label: entry.label });
            }
            store.index.insert(entry.label.clone(), store.entries.len());
            store.entries.push(entry);
        }
        Ok(store)
    }
}

impl From<HistoryStore> for Vec<HistoryEntry> {
    fn from(store: HistoryStore) -> Self {
        store.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_no_latest() {
        let store = HistoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get_latest(), None);
        assert_eq!(store.summarize_history(), "");
    }

    #[test]
    fn get_all_returns_values_in_call_order() {
        let mut store = HistoryStore::new();
        store.store("a", "1");
        store.store("b", "x");
        store.store("a", "2");
        store.store("a", "3");

        assert_eq!(store.get_all("a"), ["1", "2", "3"]);
        assert_eq!(store.get_all("b"), ["x"]);
        assert!(store.get_all("missing").is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn latest_follows_label_creation_order() {
        let mut store = HistoryStore::new();
        store.store("first", "f1");
        store.store("second", "s1");
        // Appending to an older label does not move it to the end.
        store.store("first", "f2");

        assert_eq!(store.get_latest(), Some("s1"));

        store.store("second", "s2");
        assert_eq!(store.get_latest(), Some("s2"));
    }

    #[test]
    fn summary_lists_last_value_per_label() {
        let mut store = HistoryStore::new();
        store.store("user_input", "hello");
        store.store("a_output_0", "A(hello)");
        store.store("user_input", "again");

        assert_eq!(
            store.summarize_history(),
            "user_input: again\na_output_0: A(hello)"
        );
        let labels: Vec<&str> = store.labels().collect();
        assert_eq!(labels, vec!["user_input", "a_output_0"]);
    }

    #[test]
    fn snapshot_json_keeps_order() {
        let mut store = HistoryStore::new();
        store.store("z", "1");
        store.store("a", "2");
        store.store("z", "3");

        let json = serde_json::to_string(&store).expect("serialize");
        assert_eq!(
            json,
            r#"[{"label":"z","values":["1","3"]},{"label":"a","values":["2"]}]"#
        );
        let back: HistoryStore = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, store);
        assert_eq!(back.get_latest(), Some("2"));
    }

    #[test]
    fn loading_rejects_entries_without_values() {
        let err = serde_json::from_str::<HistoryStore>(
            r#"[{"label":"user_input","values":["hi"]},{"label":"a_output_0","values":[]}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"a_output_0\" has no values"), "{err}");
    }

    #[test]
    fn loading_rejects_duplicate_labels() {
        let entries = vec![
            HistoryEntry {
                label: "a".to_string(),
                values: vec!["1".to_string()],
            },
            HistoryEntry {
                label: "a".to_string(),
                values: vec!["2".to_string()],
            },
        ];
        assert_eq!(
            HistoryStore::try_from(entries),
            Err(HistoryLoadError::DuplicateLabel {
                label: "a".to_string()
            })
        );
    }
}
