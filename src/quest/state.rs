//! Quest Progress State
//!
//! The persisted progress document: one bucket per quest, grouped by city.
//! Field names follow the camelCase shape of the stored JSON so documents
//! written by earlier app versions keep loading.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress on a single quest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBucket {
    /// Count of cleared steps; also the index of the active step
    #[serde(default)]
    pub unlocked_index: usize,
    /// Accepted input per step id
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// When the finale unlocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressBucket {
    pub fn is_blank(&self) -> bool {
        self.unlocked_index == 0 && self.answers.is_empty()
    }

    /// Whether every one of `step_count` steps is cleared
    pub fn is_complete(&self, step_count: usize) -> bool {
        self.unlocked_index >= step_count
    }

    /// Record an accepted answer; existing entries are never overwritten
    pub fn record_answer(&mut self, step_id: &str, answer: &str) {
        self.answers
            .entry(step_id.to_string())
            .or_insert_with(|| answer.to_string());
    }
}

/// Optional user profile stored next to the progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
}

/// Root of the persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    /// city id -> storage key -> bucket
    #[serde(default)]
    pub progress: BTreeMap<String, BTreeMap<String, ProgressBucket>>,
}

impl SaveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, city_id: &str, storage_key: &str) -> Option<&ProgressBucket> {
        self.progress.get(city_id)?.get(storage_key)
    }

    /// Replace one quest's bucket, leaving every other bucket untouched
    pub fn set_bucket(&mut self, city_id: &str, storage_key: &str, bucket: ProgressBucket) {
        self.progress
            .entry(city_id.to_string())
            .or_default()
            .insert(storage_key.to_string(), bucket);
    }

    /// Blank one quest's bucket. Returns false if it was already blank.
    pub fn reset_bucket(&mut self, city_id: &str, storage_key: &str) -> bool {
        match self.progress.get_mut(city_id).and_then(|c| c.get_mut(storage_key)) {
            Some(bucket) if !bucket.is_blank() || bucket.completed_at.is_some() => {
                *bucket = ProgressBucket::default();
                true
            }
            _ => false,
        }
    }

    /// Number of quests with every step cleared, given each quest's step count
    pub fn completed_count(&self, step_count: impl Fn(&str, &str) -> Option<usize>) -> usize {
        self.progress
            .iter()
            .flat_map(|(city, quests)| quests.iter().map(move |(key, b)| (city, key, b)))
            .filter(|(city, key, bucket)| {
                step_count(city, key).is_some_and(|n| bucket.is_complete(n))
            })
            .count()
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize progress: {}", e))
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse progress: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut state = SaveState::new();
        let mut bucket = ProgressBucket::default();
        bucket.unlocked_index = 1;
        bucket.record_answer("gate", "north");
        state.set_bucket("krakow", "krakow_dragon", bucket);

        let value: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "progress": {
                    "krakow": {
                        "krakow_dragon": { "unlockedIndex": 1, "answers": { "gate": "north" } }
                    }
                }
            })
        );
    }

    #[test]
    fn test_parses_older_minimal_documents() {
        let state = SaveState::from_json(
            r#"{"user":{"name":"Ola"},"progress":{"minsk":{"q":{"unlockedIndex":2}}},"legacy":true}"#,
        )
        .unwrap();
        assert_eq!(state.user.as_ref().map(|u| u.name.as_str()), Some("Ola"));
        let bucket = state.bucket("minsk", "q").unwrap();
        assert_eq!(bucket.unlocked_index, 2);
        assert!(bucket.answers.is_empty());

        assert_eq!(SaveState::from_json("{}").unwrap(), SaveState::default());
        assert!(SaveState::from_json("not json").is_err());
    }

    #[test]
    fn test_answers_are_append_only() {
        let mut bucket = ProgressBucket::default();
        bucket.record_answer("gate", "north");
        bucket.record_answer("gate", "south");
        assert_eq!(bucket.answers["gate"], "north");
    }

    #[test]
    fn test_reset_only_touches_one_bucket() {
        let mut state = SaveState::new();
        let done = ProgressBucket {
            unlocked_index: 3,
            ..Default::default()
        };
        state.set_bucket("krakow", "a", done.clone());
        state.set_bucket("krakow", "b", done.clone());

        assert!(state.reset_bucket("krakow", "a"));
        assert!(!state.reset_bucket("krakow", "a"));
        assert!(!state.reset_bucket("krakow", "missing"));
        assert!(state.bucket("krakow", "a").unwrap().is_blank());
        assert_eq!(state.bucket("krakow", "b"), Some(&done));
    }

    #[test]
    fn test_completed_count() {
        let mut state = SaveState::new();
        state.set_bucket("krakow", "a", ProgressBucket { unlocked_index: 2, ..Default::default() });
        state.set_bucket("krakow", "b", ProgressBucket { unlocked_index: 1, ..Default::default() });
        state.set_bucket("minsk", "c", ProgressBucket { unlocked_index: 4, ..Default::default() });

        let count = state.completed_count(|_, key| match key {
            "a" | "b" => Some(2),
            _ => None,
        });
        assert_eq!(count, 1);
    }
}
