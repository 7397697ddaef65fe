//! Quest Definition Structures
//!
//! Quest and city records as they appear in the TOML catalog, and the
//! resolved bundles the wizard consumes.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::answer::AnswerCheck;
use crate::geo::GeoPoint;

/// A quest file: one `[quest]` table
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: String,
    /// City id, resolved against the city reference set
    pub city: String,
    pub title: String,
    /// Namespace of this quest's progress inside the saved document
    pub storage_key: String,
    #[serde(default)]
    pub intro: String,
    /// Meeting point of the quest, if it differs from the city centre
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub steps: Vec<QuestStep>,
    pub finale: QuestFinale,
}

/// The city reference file: a list of `[[city]]` tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCityFile {
    #[serde(default, rename = "city")]
    pub cities: Vec<City>,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Static reference entity for a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl City {
    /// Stand-in for a city id missing from the reference set
    pub fn unresolved(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            country_code: String::new(),
            lat: None,
            lng: None,
        }
    }

    pub fn position(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.lat?, self.lng?);
        point.is_valid().then_some(point)
    }
}

/// Image or video attached to a step or finale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Media {
    Image {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    Video {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        poster: Option<String>,
    },
}

/// One stage of a quest
#[derive(Debug, Clone, Deserialize)]
pub struct QuestStep {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub media: Option<Media>,
    /// Where the step takes place
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Absent for read-and-continue steps
    #[serde(default)]
    pub answer: Option<AnswerCheck>,
}

impl QuestStep {
    pub fn requires_answer(&self) -> bool {
        self.answer.is_some()
    }
}

/// Terminal content shown once every step is cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestFinale {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

/// Listing and map record for a quest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestMeta {
    pub id: String,
    pub title: String,
    pub city_id: String,
    pub city_name: String,
    pub country_code: String,
    pub storage_key: String,
    pub step_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub tags: Vec<String>,
    /// Quest meeting point, else the city centre
    pub position: Option<GeoPoint>,
}

/// The complete static definition of one quest
#[derive(Debug, Clone)]
pub struct QuestBundle {
    pub id: String,
    pub title: String,
    pub city: City,
    pub storage_key: String,
    pub intro: String,
    pub location: Option<GeoPoint>,
    pub duration_minutes: Option<u32>,
    pub tags: Vec<String>,
    pub steps: Vec<QuestStep>,
    pub finale: QuestFinale,
}

impl QuestBundle {
    /// Resolve a raw TOML record against the city reference set
    pub fn from_raw(raw: RawQuest, cities: &HashMap<String, City>) -> Result<Self, String> {
        if raw.id.trim().is_empty() {
            return Err("Quest has an empty id".to_string());
        }
        if raw.storage_key.trim().is_empty() {
            return Err(format!("Quest '{}' has an empty storage key", raw.id));
        }
        if raw.steps.is_empty() {
            return Err(format!("Quest '{}' has no steps", raw.id));
        }

        let mut seen = HashSet::new();
        for (i, step) in raw.steps.iter().enumerate() {
            if !seen.insert(step.id.as_str()) {
                return Err(format!(
                    "Quest '{}' has duplicate step id '{}' at index {}",
                    raw.id, step.id, i
                ));
            }
            if let Some(check) = &step.answer {
                if !check.is_satisfiable() {
                    return Err(format!(
                        "Quest '{}' step '{}' has an answer check with no accepted answers",
                        raw.id, step.id
                    ));
                }
            }
        }

        let mut steps = raw.steps;
        for step in &mut steps {
            if step.location.is_some_and(|p| !p.is_valid()) {
                warn!(
                    "Quest '{}' step '{}' has an out-of-range location, ignoring it",
                    raw.id, step.id
                );
                step.location = None;
            }
        }

        let city = match cities.get(&raw.city) {
            Some(city) => city.clone(),
            None => {
                warn!("Quest '{}' references unknown city '{}'", raw.id, raw.city);
                City::unresolved(&raw.city)
            }
        };

        Ok(Self {
            id: raw.id,
            title: raw.title,
            city,
            storage_key: raw.storage_key,
            intro: raw.intro,
            location: raw.location.filter(GeoPoint::is_valid),
            duration_minutes: raw.duration_minutes,
            tags: raw.tags,
            steps,
            finale: raw.finale,
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&QuestStep> {
        self.steps.get(index)
    }

    pub fn has_intro(&self) -> bool {
        !self.intro.trim().is_empty()
    }

    /// Where the quest shows up on a map
    pub fn position(&self) -> Option<GeoPoint> {
        self.location.or_else(|| self.city.position())
    }

    pub fn meta(&self) -> QuestMeta {
        QuestMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            city_id: self.city.id.clone(),
            city_name: self.city.name.clone(),
            country_code: self.city.country_code.clone(),
            storage_key: self.storage_key.clone(),
            step_count: self.steps.len(),
            duration_minutes: self.duration_minutes,
            tags: self.tags.clone(),
            position: self.position(),
        }
    }
}
