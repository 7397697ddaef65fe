//! Quest Wizard
//!
//! Walks a user through a quest's ordered steps. A step with an answer check
//! only unlocks the next one when the submitted answer is accepted; plain
//! content steps unlock on "continue". Every accepted transition writes the
//! quest's bucket through the progress store, rejections never do.
//!
//! ```text
//! Intro --start--> Step(0) --accept--> Step(1) ... Step(n-1) --accept--> Finale
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::definition::{Media, QuestBundle, QuestFinale};
use super::state::ProgressBucket;
use super::store::ProgressStore;
use crate::geo::{haversine_km, GeoPoint};

/// Where the user currently is in a quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    /// Quest not started, intro still shown
    Intro,
    /// Active step index
    Step(usize),
    /// Every step cleared
    Finale,
}

/// Result of a user action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    /// Intro dismissed
    Started,
    /// A step was cleared
    Advanced {
        step_id: String,
        unlocked_index: usize,
        completed: bool,
    },
    /// The answer did not pass the step's check; nothing changed
    Rejected { step_id: String, attempts: u32 },
    /// "Continue" on a step that needs an answer
    AnswerRequired { step_id: String },
    /// The action does not apply to the current phase
    Ignored,
    /// Progress for this quest was blanked
    Reset,
}

/// Inline validation feedback for the active step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub step_id: String,
    /// Consecutive rejected attempts on this step, usable for alert cues
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub requires_answer: bool,
}

/// A cleared step, shown read-only with the answer that cleared it
#[derive(Debug, Clone, Serialize)]
pub struct CompletedStepView {
    pub index: usize,
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Everything a screen needs to render the wizard
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub quest_id: String,
    pub title: String,
    pub city: String,
    pub intro: String,
    pub phase: WizardPhase,
    pub unlocked_index: usize,
    pub step_count: usize,
    pub current_step: Option<StepView>,
    pub completed_steps: Vec<CompletedStepView>,
    pub finale: Option<QuestFinale>,
    pub rejection: Option<Rejection>,
}

/// State machine for one quest instance
pub struct QuestWizard {
    bundle: Arc<QuestBundle>,
    store: Arc<ProgressStore>,
    bucket: ProgressBucket,
    intro_dismissed: bool,
    rejection: Option<Rejection>,
}

impl QuestWizard {
    /// Resume from saved progress, if any. This is the only read of the store.
    pub fn mount(bundle: Arc<QuestBundle>, store: Arc<ProgressStore>) -> Self {
        let mut bucket = store
            .bucket(&bundle.city.id, &bundle.storage_key)
            .unwrap_or_default();

        let step_count = bundle.step_count();
        if bucket.unlocked_index > step_count {
            warn!(
                "Saved progress for '{}' is past the last step ({} > {}), clamping",
                bundle.id, bucket.unlocked_index, step_count
            );
            bucket.unlocked_index = step_count;
        }

        debug!(
            "Mounted quest '{}' at {}/{}",
            bundle.id, bucket.unlocked_index, step_count
        );

        Self {
            intro_dismissed: bucket.unlocked_index > 0 || !bundle.has_intro(),
            bundle,
            store,
            bucket,
            rejection: None,
        }
    }

    pub fn bundle(&self) -> &Arc<QuestBundle> {
        &self.bundle
    }

    pub fn bucket(&self) -> &ProgressBucket {
        &self.bucket
    }

    pub fn unlocked_index(&self) -> usize {
        self.bucket.unlocked_index
    }

    pub fn is_complete(&self) -> bool {
        self.bucket.is_complete(self.bundle.step_count())
    }

    pub fn phase(&self) -> WizardPhase {
        if self.is_complete() {
            WizardPhase::Finale
        } else if !self.intro_dismissed {
            WizardPhase::Intro
        } else {
            WizardPhase::Step(self.bucket.unlocked_index)
        }
    }

    /// Dismiss the intro
    pub fn start(&mut self) -> Transition {
        if self.phase() != WizardPhase::Intro {
            return Transition::Ignored;
        }
        self.intro_dismissed = true;
        Transition::Started
    }

    /// Clear a content step that has no answer check
    pub fn continue_step(&mut self) -> Transition {
        let WizardPhase::Step(index) = self.phase() else {
            return Transition::Ignored;
        };

        let bundle = Arc::clone(&self.bundle);
        let step = &bundle.steps[index];
        if step.requires_answer() {
            return Transition::AnswerRequired {
                step_id: step.id.clone(),
            };
        }
        self.advance(index, None)
    }

    /// Validate an answer for the active step
    pub fn submit_answer(&mut self, input: &str) -> Transition {
        let WizardPhase::Step(index) = self.phase() else {
            return Transition::Ignored;
        };

        let bundle = Arc::clone(&self.bundle);
        let step = &bundle.steps[index];
        let Some(check) = &step.answer else {
            return self.advance(index, None);
        };

        if check.accepts(input) {
            return self.advance(index, Some(input.trim()));
        }

        let attempts = match &self.rejection {
            Some(r) if r.step_id == step.id => r.attempts + 1,
            _ => 1,
        };
        debug!(
            "Rejected answer for '{}' step '{}' (attempt {})",
            bundle.id, step.id, attempts
        );
        self.rejection = Some(Rejection {
            step_id: step.id.clone(),
            attempts,
        });
        Transition::Rejected {
            step_id: step.id.clone(),
            attempts,
        }
    }

    /// Blank this quest's progress and go back to the intro
    pub fn reset(&mut self) -> Transition {
        self.bucket = ProgressBucket::default();
        self.intro_dismissed = !self.bundle.has_intro();
        self.rejection = None;
        self.store
            .reset_bucket(&self.bundle.city.id, &self.bundle.storage_key);
        info!("Reset progress for quest '{}'", self.bundle.id);
        Transition::Reset
    }

    fn advance(&mut self, index: usize, answer: Option<&str>) -> Transition {
        let bundle = Arc::clone(&self.bundle);
        let step = &bundle.steps[index];

        if let Some(answer) = answer {
            self.bucket.record_answer(&step.id, answer);
        }
        self.bucket.unlocked_index = index + 1;

        let completed = self.is_complete();
        if completed && self.bucket.completed_at.is_none() {
            self.bucket.completed_at = Some(Utc::now());
        }
        self.rejection = None;

        self.store
            .put_bucket(&bundle.city.id, &bundle.storage_key, self.bucket.clone());

        if completed {
            info!("Quest '{}' completed", bundle.id);
        } else {
            debug!(
                "Quest '{}' step '{}' cleared ({}/{})",
                bundle.id,
                step.id,
                self.bucket.unlocked_index,
                bundle.step_count()
            );
        }

        Transition::Advanced {
            step_id: step.id.clone(),
            unlocked_index: self.bucket.unlocked_index,
            completed,
        }
    }

    /// Distance from `position` to the active step, when it has a location
    pub fn distance_to_current_step_km(&self, position: GeoPoint) -> Option<f64> {
        let WizardPhase::Step(index) = self.phase() else {
            return None;
        };
        let target = self.bundle.steps[index].location?;
        Some(haversine_km(position, target))
    }

    pub fn view(&self) -> WizardView {
        let bundle = &self.bundle;
        let phase = self.phase();

        let current_step = match phase {
            WizardPhase::Step(index) => bundle.step(index).map(|step| StepView {
                index,
                id: step.id.clone(),
                title: step.title.clone(),
                body: step.body.clone(),
                hint: step.hint.clone(),
                media: step.media.clone(),
                location: step.location,
                requires_answer: step.requires_answer(),
            }),
            _ => None,
        };

        let completed_steps = bundle
            .steps
            .iter()
            .take(self.bucket.unlocked_index)
            .enumerate()
            .map(|(index, step)| CompletedStepView {
                index,
                id: step.id.clone(),
                title: step.title.clone(),
                answer: self.bucket.answers.get(&step.id).cloned(),
            })
            .collect();

        WizardView {
            quest_id: bundle.id.clone(),
            title: bundle.title.clone(),
            city: bundle.city.name.clone(),
            intro: bundle.intro.clone(),
            phase,
            unlocked_index: self.bucket.unlocked_index,
            step_count: bundle.step_count(),
            current_step,
            completed_steps,
            finale: (phase == WizardPhase::Finale).then(|| bundle.finale.clone()),
            rejection: self.rejection.clone(),
        }
    }
}
