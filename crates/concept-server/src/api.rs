//! Client polling API.
//!
//! Tournaments are started with `POST /tournaments` and then polled; nothing
//! is pushed to clients. Every error body has the shape
//! `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tournament_engine::{
    Idea, Review, SharedTournamentController, TournamentError, TournamentRequest,
    TournamentStatusView,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info_span, warn};

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] TournamentError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e {
                TournamentError::Validation(_) => StatusCode::BAD_REQUEST,
                TournamentError::NotFound(_) => StatusCode::NOT_FOUND,
                TournamentError::Conflict(_) | TournamentError::Cancelled(_) => {
                    StatusCode::CONFLICT
                }
                TournamentError::Provider(_) => StatusCode::BAD_GATEWAY,
                TournamentError::Persistence(_) | TournamentError::LockPoisoned => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Engine(e) => e.code(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.code(), error = %self, "Request failed");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the router. `allowed_origins` empty means any origin.
pub fn build_router(controller: SharedTournamentController, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health))
        .route("/tournaments", post(create_tournament))
        .route("/tournaments/{id}", get(tournament_status))
        .route("/tournaments/{id}/ideas", get(tournament_ideas))
        .route(
            "/tournaments/{id}/ideas/{idea_id}/reviews/{reviewer_id}",
            get(idea_review),
        )
        .route("/tournaments/{id}/lanes/{lane}/history", get(lane_history))
        .route("/tournaments/{id}/cancel", post(cancel_tournament))
        .with_state(controller)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn health() -> &'static str {
    "ok"
}

async fn create_tournament(
    State(controller): State<SharedTournamentController>,
    body: Result<Json<TournamentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(request) = body?;
    let id = controller.create(request)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": id }))))
}

async fn tournament_status(
    State(controller): State<SharedTournamentController>,
    Path(id): Path<String>,
) -> ApiResult<TournamentStatusView> {
    Ok(Json(controller.status(&id)?))
}

async fn tournament_ideas(
    State(controller): State<SharedTournamentController>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Idea>> {
    Ok(Json(controller.ideas(&id)?))
}

async fn idea_review(
    State(controller): State<SharedTournamentController>,
    Path((id, idea_id, reviewer_id)): Path<(String, String, String)>,
) -> ApiResult<Review> {
    let idea = controller.store().idea(&idea_id)?;
    if idea.tournament_id != id {
        return Err(TournamentError::NotFound(format!("idea {idea_id} in tournament {id}")).into());
    }
    Ok(Json(controller.review_for(&idea_id, &reviewer_id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    through_round: Option<u32>,
}

async fn lane_history(
    State(controller): State<SharedTournamentController>,
    Path((id, lane)): Path<(String, String)>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<Idea>> {
    let Query(query) = query?;
    let lane: u32 = lane
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("lane must be a non-negative integer, got {lane}")))?;
    Ok(Json(controller.lane_history(&id, lane, query.through_round)?))
}

async fn cancel_tournament(
    State(controller): State<SharedTournamentController>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    controller.cancel(&id)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": id, "cancelRequested": true }))))
}
