use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::info;

/// Persisted mapping from store-qualified release key to release record.
///
/// Loaded whole at the start of a run, enriched in place, re-sorted and
/// rewritten whole at the end. Records are only ever merged, never deleted:
/// fields from prior runs persist until a later scrape overwrites them.
#[derive(Debug, Default)]
pub struct Registry {
    releases: Map<String, Value>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the registry file, or start empty when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read registry {}", path.display()))?;
        let releases = serde_json::from_str(&raw)
            .with_context(|| format!("registry {} is not a JSON object", path.display()))?;
        Ok(Self { releases })
    }

    /// Rewrite the whole registry, pretty-printed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&self.releases)?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write registry {}", path.display()))?;
        info!("saved {} releases to {}", self.releases.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.releases.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.releases.get_mut(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.releases.iter()
    }

    /// Merge a freshly parsed record into the registry under `key`,
    /// field-wise: fields not present in `record` keep their stored values.
    pub fn merge_release(&mut self, key: &str, record: Value) {
        match self.releases.get_mut(key) {
            Some(existing) => merge_values(existing, record),
            None => {
                self.releases.insert(key.to_string(), record);
            }
        }
    }

    /// Remove the named position fields from every record. Chart and
    /// new-release positions are re-derived each run; everything else
    /// accumulates.
    pub fn clear_fields(&mut self, fields: &[String]) {
        for record in self.releases.values_mut() {
            if let Value::Object(map) = record {
                for field in fields {
                    map.remove(field);
                }
            }
        }
    }

    /// Stamp `added` on records that do not have one yet. Existing stamps
    /// are never touched.
    pub fn stamp_added(&mut self, now: i64) {
        for record in self.releases.values_mut() {
            if let Value::Object(map) = record {
                map.entry("added").or_insert_with(|| Value::from(now));
            }
        }
    }

    /// Order records by their new-release position when present, falling
    /// back to staleness (now minus `added`) so never-listed records sink.
    pub fn sort_by_rank(&mut self, now: i64) {
        let mut entries: Vec<(String, Value)> =
            std::mem::take(&mut self.releases).into_iter().collect();
        entries.sort_by(|a, b| {
            rank(&a.1, now)
                .partial_cmp(&rank(&b.1, now))
                .unwrap_or(Ordering::Equal)
        });
        self.releases = entries.into_iter().collect();
    }
}

fn rank(record: &Value, now: i64) -> f64 {
    if let Some(pos) = record.get("new_releases").and_then(Value::as_f64) {
        return pos;
    }
    let added = record.get("added").and_then(Value::as_i64).unwrap_or(0);
    (now - added) as f64
}

/// Member-wise merge of `src` into `dest`: when both sides hold an object
/// the merge recurses per key, otherwise `src` replaces `dest` wholesale
/// (scalars and lists are replaced, never appended).
pub fn merge_values(dest: &mut Value, src: Value) {
    match src {
        Value::Object(src_map) => {
            if let Value::Object(dest_map) = dest {
                for (key, value) in src_map {
                    match dest_map.get_mut(&key) {
                        Some(slot) => merge_values(slot, value),
                        None => {
                            dest_map.insert(key, value);
                        }
                    }
                }
            } else {
                *dest = Value::Object(src_map);
            }
        }
        other => *dest = other,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_preserves_untouched_nested_keys() {
        let mut dest = json!({"a": {"b": 1}});
        merge_values(&mut dest, json!({"a": {"c": 2}}));
        assert_eq!(dest, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn merge_replaces_non_mapping_with_mapping() {
        let mut dest = json!({"a": 1});
        merge_values(&mut dest, json!({"a": {"b": 2}}));
        assert_eq!(dest, json!({"a": {"b": 2}}));
    }

    #[test]
    fn merge_replaces_lists_wholesale() {
        let mut dest = json!({"tracks": ["a", "b"]});
        merge_values(&mut dest, json!({"tracks": ["c"]}));
        assert_eq!(dest, json!({"tracks": ["c"]}));
    }

    #[test]
    fn merge_is_idempotent() {
        let record = json!({"id": "1", "tags": {"techno": true}, "names": ["x"]});
        let mut registry = Registry::new();
        registry.merge_release("redeye-1", record.clone());
        let once = serde_json::to_string(&registry.releases).unwrap();
        registry.merge_release("redeye-1", record);
        let twice = serde_json::to_string(&registry.releases).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_release_enriches_existing_record() {
        let mut registry = Registry::new();
        registry.merge_release("juno-1", json!({"artist": "MOY", "track_urls": ["u1"]}));
        registry.merge_release("juno-1", json!({"weekly_chart": 3}));
        let rec = registry.get("juno-1").unwrap();
        assert_eq!(rec["artist"], "MOY");
        assert_eq!(rec["track_urls"], json!(["u1"]));
        assert_eq!(rec["weekly_chart"], 3);
    }

    #[test]
    fn clear_fields_resets_positions_only() {
        let mut registry = Registry::new();
        registry.merge_release(
            "redeye-1",
            json!({"artist": "SOMA", "weekly_chart": 2, "new_releases": 14}),
        );
        registry.clear_fields(&["weekly_chart".into(), "monthly_chart".into(), "new_releases".into()]);
        let rec = registry.get("redeye-1").unwrap();
        assert_eq!(rec["artist"], "SOMA");
        assert!(rec.get("weekly_chart").is_none());
        assert!(rec.get("new_releases").is_none());
    }

    #[test]
    fn added_is_stamped_once() {
        let mut registry = Registry::new();
        registry.merge_release("juno-1", json!({"id": "1"}));
        registry.merge_release("juno-2", json!({"id": "2", "added": 100}));
        registry.stamp_added(500);
        assert_eq!(registry.get("juno-1").unwrap()["added"], 500);
        assert_eq!(registry.get("juno-2").unwrap()["added"], 100);
    }

    #[test]
    fn sort_ranks_listed_before_stale() {
        let mut registry = Registry::new();
        registry.merge_release("a", json!({"added": 0}));
        registry.merge_release("b", json!({"new_releases": 1, "added": 900}));
        registry.merge_release("c", json!({"new_releases": 0, "added": 900}));
        registry.sort_by_rank(1_000);
        let keys: Vec<&String> = registry.records().map(|(k, _)| k).collect();
        assert_eq!(keys, ["c", "b", "a"]);
    }

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry").join("test.json");
        let mut registry = Registry::new();
        registry.merge_release("juno-1", json!({"artist": "MOY", "added": 42}));
        registry.save(&path).unwrap();

        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("juno-1").unwrap()["artist"], "MOY");

        // missing file is an empty registry, not an error
        let empty = Registry::load(&dir.path().join("absent.json")).unwrap();
        assert!(empty.is_empty());
    }
}
