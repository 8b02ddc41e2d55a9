use serde_json::Value as JsonValue;

use crate::config::DEFAULT_STORAGE_KEY;
use crate::record::{ScoreHistory, ScoreRecord};
use crate::storage::KeyValueStore;
use crate::{Error, Result};

/// Score history kept as one JSON list under a single storage key.
#[derive(Debug, Clone)]
pub struct ScoreRepository<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> ScoreRepository<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(store: S, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// All readable records in insertion order.
    ///
    /// An absent key, a value that is not a JSON list, or entries that are not
    /// records all read as nothing rather than failing.
    pub fn load(&self) -> ScoreHistory {
        let raw = self.store.get_item(&self.key);
        let entries = parse_entries(&self.key, raw.as_deref());
        let total = entries.len();
        let records: ScoreHistory = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<ScoreRecord>(entry).ok())
            .collect();
        if records.len() != total {
            tracing::warn!(
                key = %self.key,
                skipped = total - records.len(),
                "skipping stored entries that are not score records"
            );
        }
        records
    }

    /// Appends one record, keeping whatever else is already in the list.
    pub fn append(&self, record: &ScoreRecord) -> Result<()> {
        let value = serde_json::to_value(record)
            .map_err(|err| Error::Storage(format!("cannot encode score record: {err}")))?;
        let key = self.key.clone();
        self.store.update_item(&self.key, &mut |current| {
            let mut entries = parse_entries(&key, current);
            entries.push(value.clone());
            JsonValue::Array(entries).to_string()
        })?;
        tracing::debug!(key = %self.key, url = %record.url, score = %record.score, "appended score record");
        Ok(())
    }

    /// Removes the history key only.
    pub fn clear(&self) -> Result<()> {
        self.store.remove_item(&self.key)
    }

    /// Erases the entire storage area, history and everything else.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear()
    }
}

fn parse_entries(key: &str, raw: Option<&str>) -> Vec<JsonValue> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Array(entries)) => entries,
        Ok(JsonValue::Null) => Vec::new(),
        Ok(other) => {
            tracing::warn!(key, kind = json_kind(&other), "stored history is not a list; treating as empty");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(key, error = %err, "stored history is not valid JSON; treating as empty");
            Vec::new()
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    fn record(url: &str) -> ScoreRecord {
        ScoreRecord::new(url, "0.50", "3/7/2026, 7:05:09 PM")
    }

    #[test]
    fn absent_key_loads_empty() {
        let repo = ScoreRepository::new(LocalStorage::new());
        assert!(repo.load().is_empty());
    }

    #[test]
    fn append_then_load_returns_records_in_order() -> Result<()> {
        let repo = ScoreRepository::new(LocalStorage::new());
        repo.append(&record("a"))?;
        repo.append(&record("b"))?;
        let history = repo.load();
        assert_eq!(history, vec![record("a"), record("b")]);
        Ok(())
    }

    #[test]
    fn unparseable_or_non_list_values_read_as_empty_and_are_replaced_on_append() -> Result<()> {
        for stored in ["not json", "{\"url\":\"a\"}", "null", "42"] {
            let storage = LocalStorage::with_entries(&[("stats", stored)]);
            let repo = ScoreRepository::new(storage.clone());
            assert!(repo.load().is_empty(), "{stored} should load as empty");
            repo.append(&record("x"))?;
            assert_eq!(repo.load(), vec![record("x")]);
        }
        Ok(())
    }

    #[test]
    fn foreign_entries_are_skipped_on_load_but_preserved_on_append() -> Result<()> {
        let storage = LocalStorage::with_entries(&[(
            "stats",
            r#"[{"url":"a","score":"1.00","date":"d1"},{"note":"hand edited"}]"#,
        )]);
        let repo = ScoreRepository::new(storage.clone());
        assert_eq!(repo.load(), vec![ScoreRecord::new("a", "1.00", "d1")]);

        repo.append(&record("b"))?;
        let raw = storage.get_item("stats").unwrap_or_default();
        let entries: Vec<JsonValue> = serde_json::from_str(&raw)
            .map_err(|err| Error::Storage(err.to_string()))?;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1]["note"], "hand edited");
        Ok(())
    }

    #[test]
    fn clear_removes_only_history_while_clear_all_wipes_storage() -> Result<()> {
        let storage = LocalStorage::with_entries(&[("theme", "dark")]);
        let repo = ScoreRepository::new(storage.clone());
        repo.append(&record("a"))?;

        repo.clear()?;
        assert!(repo.load().is_empty());
        assert_eq!(storage.get_item("theme").as_deref(), Some("dark"));

        repo.append(&record("a"))?;
        repo.clear_all()?;
        assert!(storage.is_empty());
        Ok(())
    }

    #[test]
    fn custom_key_is_honored() -> Result<()> {
        let storage = LocalStorage::new();
        let repo = ScoreRepository::with_key(storage.clone(), "quiz.history");
        repo.append(&record("a"))?;
        assert!(storage.get_item("stats").is_none());
        assert!(storage.get_item("quiz.history").is_some());
        Ok(())
    }

    #[test]
    fn failed_write_keeps_previous_history() -> Result<()> {
        let storage = LocalStorage::new();
        let repo = ScoreRepository::new(storage.clone());
        repo.append(&record("a"))?;
        storage.set_quota(Some(10));
        assert!(matches!(repo.append(&record("b")), Err(Error::Storage(_))));
        assert_eq!(repo.load(), vec![record("a")]);
        Ok(())
    }
}
