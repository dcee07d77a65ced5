pub mod cache;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::commentary::{commentate, CommentaryGenerator, CommentaryStatus};
use crate::db::models::{Fixture, MatchStatus, Prediction};
use crate::db::Database;
use crate::error::AnalyzeError;
use crate::forecast::PredictionEngine;
use crate::sync::{run_sync, FeedProvider};
use cache::{cache_key, ResponseCache};

type ApiResult = Result<Json<Value>, (StatusCode, String)>;

const TABLE: &str = "table";
const MATCHES: &str = "matches";

pub struct AppState {
    pub db: Database,
    pub cache: ResponseCache,
    pub commentary: Arc<dyn CommentaryGenerator>,
    pub feed: Arc<dyn FeedProvider>,
    /// Serializes sync runs and prediction writes
    pub pass_lock: Mutex<()>,
    pub lookback: usize,
    pub key_players: usize,
}

impl AppState {
    fn engine(&self) -> PredictionEngine<Database> {
        PredictionEngine::new(self.db.clone())
            .with_lookback(self.lookback)
            .with_key_players(self.key_players)
    }
}

/// Build the Axum router for the public API and admin triggers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/table", get(table_handler))
        .route("/matches", get(matches_handler))
        .route("/matches/:id/analysis", get(analysis_handler))
        .route("/matches/:id/prediction", delete(discard_handler))
        .route("/analyze/:id", post(analyze_handler))
        .route("/sync-data", post(sync_handler))
        .route("/run-algo", post(run_algo_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// One upcoming match as listed by `/matches`.
#[derive(Debug, Serialize)]
struct MatchView {
    id: i64,
    kickoff: DateTime<Utc>,
    status: MatchStatus,
    home_team: String,
    away_team: String,
    logo_home: Option<String>,
    logo_away: Option<String>,
    prediction: Option<PredictionView>,
}

#[derive(Debug, Serialize)]
struct PredictionView {
    /// Team name, or "Draw"
    winner: String,
    is_draw: bool,
    /// Whole percent
    confidence: i64,
    ai_text: Option<String>,
}

impl MatchView {
    fn new(fixture: Fixture, prediction: Option<Prediction>) -> Self {
        let prediction = prediction.map(|p| PredictionView {
            winner: match p.predicted_winner_id {
                None => "Draw".to_string(),
                Some(id) if id == fixture.home_team_id => fixture.home_team.clone(),
                Some(_) => fixture.away_team.clone(),
            },
            is_draw: p.is_draw,
            confidence: (p.confidence * 100.0).round() as i64,
            ai_text: p.ai_commentary,
        });
        MatchView {
            id: fixture.match_id,
            kickoff: fixture.kickoff,
            status: fixture.status,
            home_team: fixture.home_team,
            away_team: fixture.away_team,
            logo_home: fixture.home_logo,
            logo_away: fixture.away_logo,
            prediction,
        }
    }
}

/// Serve `key` from the cache, or build it and remember it.
async fn cached_json<F>(state: &AppState, key: &str, build: F) -> ApiResult
where
    F: FnOnce() -> anyhow::Result<Value>,
{
    if let Some(hit) = state.cache.get(key).await {
        return Ok(Json(hit));
    }
    let generation = state.cache.generation().await;
    let value = build().map_err(internal)?;
    state.cache.set(key, value.clone(), generation).await;
    Ok(Json(value))
}

/// GET /table
async fn table_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    cached_json(&state, &cache_key(TABLE, &["all"]), || {
        Ok(serde_json::to_value(state.db.list_teams()?)?)
    })
    .await
}

/// GET /matches
async fn matches_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    cached_json(&state, &cache_key(MATCHES, &["all"]), || {
        let views: Vec<MatchView> = state
            .db
            .fixtures_with_predictions()?
            .into_iter()
            .map(|(fixture, prediction)| MatchView::new(fixture, prediction))
            .collect();
        Ok(serde_json::to_value(views)?)
    })
    .await
}

/// GET /matches/:id/analysis
async fn analysis_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> ApiResult {
    match state.engine().render_analysis_document(match_id) {
        Ok(Some(analysis)) => Ok(Json(json!({ "match_id": match_id, "analysis": analysis }))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("No prediction for match {}", match_id),
        )),
        Err(e) => Err(internal(e)),
    }
}

/// DELETE /matches/:id/prediction
async fn discard_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> ApiResult {
    let _guard = state.pass_lock.lock().await;
    let removed = state.engine().discard_prediction(match_id).map_err(internal)?;
    if !removed {
        return Err((
            StatusCode::NOT_FOUND,
            format!("No prediction for match {}", match_id),
        ));
    }
    state.cache.invalidate(MATCHES).await;
    Ok(Json(json!({ "match_id": match_id, "removed": true })))
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeParams {
    #[serde(default)]
    refresh: bool,
}

/// POST /analyze/:id[?refresh=true]
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
    Query(params): Query<AnalyzeParams>,
) -> ApiResult {
    let engine = state.engine();
    let result = commentate(
        &engine,
        state.commentary.as_ref(),
        &state.pass_lock,
        match_id,
        params.refresh,
    )
    .await;

    // a prediction may have been written even if generation failed
    if !matches!(&result, Ok(Some(c)) if c.status == CommentaryStatus::Cached) {
        state.cache.invalidate(MATCHES).await;
    }

    match result {
        Ok(Some(commentary)) => Ok(Json(json!(commentary))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("No prediction can be made for match {}", match_id),
        )),
        Err(AnalyzeError::Commentary(e)) => {
            error!("Commentary for match {} failed: {}", match_id, e);
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
        Err(e @ AnalyzeError::Superseded(_)) => Err((StatusCode::CONFLICT, e.to_string())),
        Err(e) => Err(internal(e)),
    }
}

/// POST /sync-data
async fn sync_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    let _guard = state.pass_lock.lock().await;
    let report = run_sync(state.feed.as_ref(), &state.db).await.map_err(|e| {
        error!("Sync failed: {:#}", e);
        (StatusCode::BAD_GATEWAY, format!("{:#}", e))
    })?;
    state.cache.invalidate(MATCHES).await;
    state.cache.invalidate(TABLE).await;
    Ok(Json(json!(report)))
}

/// POST /run-algo
async fn run_algo_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    let _guard = state.pass_lock.lock().await;
    let summary = state.engine().run_prediction_pass().map_err(internal)?;
    state.cache.invalidate(MATCHES).await;
    info!("Prediction pass triggered over HTTP: {} generated", summary.generated);
    Ok(Json(json!(summary)))
}

/// GET /cache/stats
async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(json!(state.cache.stats().await)))
}
