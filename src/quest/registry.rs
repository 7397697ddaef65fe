//! Quest Registry
//!
//! Aggregates quest bundles into lookup indexes by id and by city. The
//! catalog ships embedded in the binary and can be replaced by a data
//! directory of TOML files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::definition::{City, QuestBundle, QuestMeta, RawCityFile, RawQuestFile};

const BUILTIN_CITIES: &str = include_str!("../../data/cities.toml");

/// Embedded catalog: (file name, TOML source)
const BUILTIN_QUESTS: &[(&str, &str)] = &[
    ("krakow/dragon.toml", include_str!("../../data/quests/krakow/dragon.toml")),
    ("krakow/kazimierz.toml", include_str!("../../data/quests/krakow/kazimierz.toml")),
    ("minsk/upper_town.toml", include_str!("../../data/quests/minsk/upper_town.toml")),
    ("tbilisi/old_town.toml", include_str!("../../data/quests/tbilisi/old_town.toml")),
];

/// Registry for all quest definitions
#[derive(Default)]
pub struct QuestRegistry {
    /// Bundles in declaration order
    quests: Vec<Arc<QuestBundle>>,
    /// Quest id -> position in `quests`
    by_id: HashMap<String, usize>,
    /// City id -> positions in `quests`, declaration order
    by_city: HashMap<String, Vec<usize>>,
    storage_keys: HashSet<String>,
    cities: Vec<City>,
}

impl QuestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog compiled into the binary
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        if let Err(e) = registry.load_cities_str(BUILTIN_CITIES) {
            warn!("Built-in city list is invalid: {}", e);
        }
        for (name, source) in BUILTIN_QUESTS {
            if let Err(e) = registry.load_quest_str(source) {
                warn!("Failed to load built-in quest {}: {}", name, e);
            }
        }
        registry
    }

    /// Build a registry from already resolved data
    pub fn from_parts(cities: Vec<City>, bundles: Vec<QuestBundle>) -> Self {
        let mut registry = Self::new();
        registry.cities = cities;
        for bundle in bundles {
            registry.insert(bundle);
        }
        registry
    }

    /// Load `cities.toml` and every `quests/**/*.toml` below `data_dir`
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        info!("Loading quests from {:?}", data_dir);

        let cities_path = data_dir.join("cities.toml");
        if cities_path.exists() {
            let content = std::fs::read_to_string(&cities_path)
                .map_err(|e| format!("Failed to read {:?}: {}", cities_path, e))?;
            self.load_cities_str(&content)
                .map_err(|e| format!("{:?}: {}", cities_path, e))?;
        } else {
            warn!("City list does not exist: {:?}", cities_path);
        }

        let quest_dir = data_dir.join("quests");
        if !quest_dir.exists() {
            warn!("Quest directory does not exist: {:?}", quest_dir);
            return Ok(());
        }

        let mut paths = Vec::new();
        collect_toml_files(&quest_dir, &mut paths)?;
        // Declaration order is file path order
        paths.sort();

        let mut count = 0;
        for path in paths {
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {:?}: {}", path, e))
                .and_then(|content| self.load_quest_str(&content));
            match loaded {
                Ok(()) => count += 1,
                Err(e) => warn!("Failed to load quest {:?}: {}", path, e),
            }
        }

        info!("Loaded {} quest definitions", count);
        Ok(())
    }

    fn load_cities_str(&mut self, content: &str) -> Result<(), String> {
        let file: RawCityFile =
            toml::from_str(content).map_err(|e| format!("Failed to parse cities: {}", e))?;

        for city in file.cities {
            if let Some(existing) = self.cities.iter_mut().find(|c| c.id == city.id) {
                warn!("Duplicate city ID '{}', overwriting", city.id);
                *existing = city;
            } else {
                self.cities.push(city);
            }
        }
        Ok(())
    }

    fn load_quest_str(&mut self, content: &str) -> Result<(), String> {
        let raw: RawQuestFile =
            toml::from_str(content).map_err(|e| format!("Failed to parse quest: {}", e))?;

        let cities: HashMap<String, City> = self
            .cities
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();
        let bundle = QuestBundle::from_raw(raw.quest, &cities)?;

        if self.by_id.contains_key(&bundle.id) {
            return Err(format!("Duplicate quest ID '{}'", bundle.id));
        }
        if self.storage_keys.contains(&bundle.storage_key) {
            return Err(format!(
                "Quest '{}' reuses storage key '{}'",
                bundle.id, bundle.storage_key
            ));
        }

        self.insert(bundle);
        Ok(())
    }

    fn insert(&mut self, bundle: QuestBundle) {
        if self.by_id.contains_key(&bundle.id) || self.storage_keys.contains(&bundle.storage_key) {
            warn!("Skipping duplicate quest '{}'", bundle.id);
            return;
        }

        let index = self.quests.len();
        self.by_id.insert(bundle.id.clone(), index);
        self.by_city.entry(bundle.city.id.clone()).or_default().push(index);
        self.storage_keys.insert(bundle.storage_key.clone());
        self.quests.push(Arc::new(bundle));
    }

    /// Get a quest by ID
    pub fn get_quest_by_id(&self, quest_id: &str) -> Option<Arc<QuestBundle>> {
        self.by_id
            .get(quest_id)
            .map(|&index| Arc::clone(&self.quests[index]))
    }

    /// Quests of a city in declaration order
    pub fn list_quests_by_city(&self, city_id: &str) -> Vec<QuestMeta> {
        self.by_city
            .get(city_id)
            .map(|indexes| indexes.iter().map(|&i| self.quests[i].meta()).collect())
            .unwrap_or_default()
    }

    /// Every quest in declaration order
    pub fn all_quests(&self) -> Vec<QuestMeta> {
        self.quests.iter().map(|q| q.meta()).collect()
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn city(&self, city_id: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.id == city_id)
    }

    /// Step count of the quest stored under (`city_id`, `storage_key`)
    pub fn step_count_for(&self, city_id: &str, storage_key: &str) -> Option<usize> {
        self.by_city.get(city_id)?.iter().find_map(|&i| {
            let quest = &self.quests[i];
            (quest.storage_key == storage_key).then(|| quest.step_count())
        })
    }

    /// Get count of loaded quests
    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}

/// Recursively collect quest files
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}
