//! Quest Screens
//!
//! HTTP routes for the quest screen, city listings, the map overlay and
//! nearby search. Route parameters are resolved through the registry; an
//! unknown quest id renders the not-found view instead of a wizard.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geo::{nearby_quests, GeoPoint, NearbyQuest};
use crate::quest::{
    ProgressStore, QuestBundle, QuestMeta, QuestRegistry, QuestWizard, Transition, WizardView,
};

/// Radius used by nearby search when the client gives none
const DEFAULT_NEARBY_RADIUS_KM: f64 = 25.0;

/// Where the not-found view sends the user
const QUEST_LIST_LINK: &str = "/quests";

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    registry: Arc<QuestRegistry>,
    store: Arc<ProgressStore>,
    /// Quest id -> mounted wizard
    wizards: Arc<DashMap<String, QuestWizard>>,
}

impl AppState {
    pub fn new(registry: Arc<QuestRegistry>, store: Arc<ProgressStore>) -> Self {
        Self {
            registry,
            store,
            wizards: Arc::new(DashMap::new()),
        }
    }

    /// Run `f` on the quest's wizard, mounting it on first use
    fn with_wizard<R>(&self, bundle: &Arc<QuestBundle>, f: impl FnOnce(&mut QuestWizard) -> R) -> R {
        let mut wizard = self.wizards.entry(bundle.id.clone()).or_insert_with(|| {
            info!("Mounting wizard for quest '{}'", bundle.id);
            QuestWizard::mount(Arc::clone(bundle), Arc::clone(&self.store))
        });
        f(wizard.value_mut())
    }

    fn resolve(&self, quest_id: &str) -> Result<Arc<QuestBundle>, NotFound> {
        self.registry.get_quest_by_id(quest_id).ok_or_else(|| {
            debug!("Quest '{}' not found", quest_id);
            NotFound::quest(quest_id)
        })
    }
}

// ============================================================================
// Views
// ============================================================================

/// Fallback rendered for unknown quest ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFound {
    pub status: String,
    pub message: String,
    pub quest_id: String,
    pub back_link: String,
}

impl NotFound {
    fn quest(quest_id: &str) -> Self {
        Self {
            status: "not_found".to_string(),
            message: "Quest not found".to_string(),
            quest_id: quest_id.to_string(),
            back_link: QUEST_LIST_LINK.to_string(),
        }
    }
}

impl IntoResponse for NotFound {
    fn into_response(self) -> Response {
        (StatusCode::NOT_FOUND, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestScreen {
    pub quest: QuestMeta,
    pub wizard: WizardView,
    /// Distance to the active step when the client sent its position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub transition: Transition,
    pub wizard: WizardView,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitySummary {
    pub id: String,
    pub name: String,
    pub country_code: String,
    pub position: Option<GeoPoint>,
    pub quest_count: usize,
}

/// A marker on the aggregate quest map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub quest_id: String,
    pub title: String,
    pub city_id: String,
    pub city_name: String,
    pub lat: f64,
    pub lng: f64,
    pub step_count: usize,
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub name: Option<String>,
    pub started_quests: usize,
    pub completed_quests: usize,
}

/// Map markers for every quest with resolvable coordinates
pub fn build_map_points(registry: &QuestRegistry) -> Vec<MapPoint> {
    registry
        .all_quests()
        .into_iter()
        .filter_map(|quest| {
            let position = quest.position?;
            Some(MapPoint {
                link: format!("{}/{}/{}", QUEST_LIST_LINK, quest.city_id, quest.id),
                quest_id: quest.id,
                title: quest.title,
                city_id: quest.city_id,
                city_name: quest.city_name,
                lat: position.lat,
                lng: position.lng,
                step_count: quest.step_count,
            })
        })
        .collect()
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/cities", get(list_cities))
        .route("/api/cities/:city_id/quests", get(list_city_quests))
        .route("/api/quests/map", get(quest_map))
        .route("/api/quests/nearby", get(nearby))
        .route("/api/quests/:city/:quest_id", get(quest_screen))
        .route("/api/quests/:city/:quest_id/start", post(start_quest))
        .route("/api/quests/:city/:quest_id/continue", post(continue_step))
        .route("/api/quests/:city/:quest_id/answer", post(submit_answer))
        .route("/api/quests/:city/:quest_id/reset", post(reset_quest))
        .route("/api/profile", get(get_profile).put(update_profile))
        .with_state(state)
}

// ============================================================================
// HTTP Handlers - Catalog
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "quests": state.registry.len() }))
}

async fn list_cities(State(state): State<AppState>) -> impl IntoResponse {
    let cities: Vec<CitySummary> = state
        .registry
        .cities()
        .iter()
        .map(|city| CitySummary {
            id: city.id.clone(),
            name: city.name.clone(),
            country_code: city.country_code.clone(),
            position: city.position(),
            quest_count: state.registry.list_quests_by_city(&city.id).len(),
        })
        .collect();
    Json(cities)
}

async fn list_city_quests(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
) -> impl IntoResponse {
    Json(state.registry.list_quests_by_city(&city_id))
}

async fn quest_map(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_map_points(&state.registry))
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: f64,
    lng: f64,
    radius_km: Option<f64>,
}

async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyQuest>>, (StatusCode, String)> {
    let origin = GeoPoint::new(query.lat, query.lng);
    let radius_km = query.radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
    if !origin.is_valid() || !radius_km.is_finite() || radius_km < 0.0 {
        return Err((StatusCode::BAD_REQUEST, "Invalid position or radius".to_string()));
    }
    Ok(Json(nearby_quests(&state.registry, origin, radius_km)))
}

// ============================================================================
// HTTP Handlers - Quest Screen
// ============================================================================

#[derive(Debug, Deserialize)]
struct PositionQuery {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    answer: String,
}

/// The `city` segment is informational; the quest id alone resolves the bundle
async fn quest_screen(
    State(state): State<AppState>,
    Path((_city, quest_id)): Path<(String, String)>,
    Query(position): Query<PositionQuery>,
) -> Result<Json<QuestScreen>, NotFound> {
    let bundle = state.resolve(&quest_id)?;
    let position = match (position.lat, position.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)).filter(GeoPoint::is_valid),
        _ => None,
    };

    let (wizard, distance_km) = state.with_wizard(&bundle, |wizard| {
        let distance = position.and_then(|p| wizard.distance_to_current_step_km(p));
        (wizard.view(), distance)
    });

    Ok(Json(QuestScreen {
        quest: bundle.meta(),
        wizard,
        distance_km,
    }))
}

async fn start_quest(
    State(state): State<AppState>,
    Path((_city, quest_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, NotFound> {
    run_action(&state, &quest_id, QuestWizard::start)
}

async fn continue_step(
    State(state): State<AppState>,
    Path((_city, quest_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, NotFound> {
    run_action(&state, &quest_id, QuestWizard::continue_step)
}

async fn submit_answer(
    State(state): State<AppState>,
    Path((_city, quest_id)): Path<(String, String)>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<ActionResponse>, NotFound> {
    run_action(&state, &quest_id, |wizard| wizard.submit_answer(&req.answer))
}

async fn reset_quest(
    State(state): State<AppState>,
    Path((_city, quest_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, NotFound> {
    run_action(&state, &quest_id, QuestWizard::reset)
}

fn run_action(
    state: &AppState,
    quest_id: &str,
    action: impl FnOnce(&mut QuestWizard) -> Transition,
) -> Result<Json<ActionResponse>, NotFound> {
    let bundle = state.resolve(quest_id)?;
    let (transition, wizard) = state.with_wizard(&bundle, |wizard| {
        let transition = action(wizard);
        (transition, wizard.view())
    });
    Ok(Json(ActionResponse { transition, wizard }))
}

// ============================================================================
// HTTP Handlers - Profile
// ============================================================================

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    name: String,
}

fn profile_view(state: &AppState) -> ProfileView {
    let snapshot = state.store.snapshot();
    let started_quests = snapshot
        .progress
        .values()
        .flat_map(|quests| quests.values())
        .filter(|bucket| !bucket.is_blank())
        .count();
    let completed_quests =
        snapshot.completed_count(|city, key| state.registry.step_count_for(city, key));

    ProfileView {
        name: state.store.user().map(|u| u.name),
        started_quests,
        completed_quests,
    }
}

async fn get_profile(State(state): State<AppState>) -> impl IntoResponse {
    Json(profile_view(&state))
}

async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
    }
    state.store.set_user_name(&req.name);
    Ok(Json(profile_view(&state)))
}
