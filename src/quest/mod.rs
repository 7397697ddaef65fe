//! Quest System Module
//!
//! Static per-city quest catalog, answer-gated step progression and
//! persisted progress.

pub mod answer;
pub mod definition;
pub mod registry;
pub mod state;
pub mod store;
pub mod wizard;

pub use answer::{AnswerCheck, Normalization};
pub use definition::{City, Media, QuestBundle, QuestFinale, QuestMeta, QuestStep};
pub use registry::QuestRegistry;
pub use state::{ProgressBucket, SaveState, UserProfile};
pub use store::{ProgressStore, DEFAULT_STORAGE_KEY};
pub use wizard::{QuestWizard, Transition, WizardPhase, WizardView};
