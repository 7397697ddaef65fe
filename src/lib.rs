//! MeTravel quests: a static per-city quest catalog, the answer-gated quest
//! wizard, persisted progress and the JSON screens that expose them.

pub mod config;
pub mod db;
pub mod geo;
pub mod quest;
pub mod screen;
pub mod storage;

pub use config::ServerConfig;
pub use screen::{router, AppState};
