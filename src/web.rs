use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::card::{Card, CardSet};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::review::{self, DeckSummary, QueueKind};
use crate::sm2::{Rating, ReviewState};
use crate::store::{self, MemoryStore, ReviewStore};

// -- App state --

pub struct ServerState {
    cards: CardSet,
    store: MemoryStore,
    progress: HashMap<String, Progress>,
    config: Config,
}

impl ServerState {
    pub fn new(
        cards: CardSet,
        store: MemoryStore,
        progress: HashMap<String, Progress>,
        config: Config,
    ) -> Self {
        Self {
            cards,
            store,
            progress,
            config,
        }
    }
}

// One lock for everything: review submissions for the same (user, card) never interleave.
pub type SharedState = Arc<Mutex<ServerState>>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::CardNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// -- Route handlers --

async fn decks(
    State(state): State<SharedState>,
    Path(user): Path<String>,
) -> Json<Vec<DeckSummary>> {
    let st = state.lock().await;
    let states = st.store.states_for(&user);
    Json(review::deck_summaries(&st.cards.cards, &states, Utc::now()))
}

#[derive(Deserialize)]
struct QueueParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    kind: QueueKind,
    cards: Vec<Card>,
}

async fn queue(
    State(state): State<SharedState>,
    Path(user): Path<String>,
    Query(params): Query<QueueParams>,
) -> Json<QueueResponse> {
    let st = state.lock().await;
    let states = st.store.states_for(&user);
    let limit = params.limit.unwrap_or(st.config.new_limit);
    let selection = review::select_for_review(&st.cards.cards, &states, Utc::now(), limit);

    Json(QueueResponse {
        kind: selection.kind,
        cards: selection
            .indices
            .iter()
            .map(|&i| st.cards.cards[i].clone())
            .collect(),
    })
}

async fn review_get(
    State(state): State<SharedState>,
    Path((user, card)): Path<(String, String)>,
) -> Result<Json<Option<ReviewState>>> {
    let st = state.lock().await;
    if st.cards.find(&card).is_none() {
        return Err(Error::CardNotFound(card));
    }
    Ok(Json(st.store.get(&user, &card)))
}

#[derive(Deserialize)]
struct ReviewRequest {
    rating: i64,
}

async fn review_submit(
    State(state): State<SharedState>,
    Path((user, card)): Path<(String, String)>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewState>> {
    let rating = Rating::new(req.rating)?;

    let mut st = state.lock().await;
    if st.cards.find(&card).is_none() {
        return Err(Error::CardNotFound(card));
    }

    // Work on copies; a failed save must leave memory matching disk.
    let now = Utc::now();
    let mut store = st.store.clone();
    let mut progress = st.progress.clone();

    let next = review::submit_review(&mut store, &user, &card, rating, now)?;
    progress
        .entry(user.clone())
        .or_default()
        .record_review(now.date_naive(), rating);

    store::save_reviews(&st.config.reviews, &store)?;
    store::save_progress(&st.config.progress, &progress)?;

    st.store = store;
    st.progress = progress;
    Ok(Json(next))
}

async fn progress(
    State(state): State<SharedState>,
    Path(user): Path<String>,
) -> Json<Progress> {
    let st = state.lock().await;
    let mut p = st.progress.get(&user).cloned().unwrap_or_default();
    p.current_streak = p.current_streak_as_of(Utc::now().date_naive());
    Json(p)
}

// -- Public entry points --

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/users/{user}/decks", get(decks))
        .route("/users/{user}/queue", get(queue))
        .route(
            "/users/{user}/cards/{card}/review",
            get(review_get).post(review_submit),
        )
        .route("/users/{user}/progress", get(progress))
        .with_state(state)
}

pub async fn serve(state: ServerState, port: u16) -> Result<()> {
    let app = router(Arc::new(Mutex::new(state)));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("serving at http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
