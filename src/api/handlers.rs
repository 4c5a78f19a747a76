//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc, time::Duration};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::{
    error::TimerError,
    state::{AppState, Timer},
};
use super::responses::{
    ApiError, CategorySummary, CreateTimerRequest, HealthResponse, StatusResponse, TimerQuery,
    TimerView,
};

type ApiResult<T> = Result<T, ApiError>;

fn rejected(action: &str, e: TimerError) -> ApiError {
    match e {
        TimerError::Persistence(_) => error!("{} failed: {}", action, e),
        _ => warn!("{} rejected: {}", action, e),
    }
    ApiError(e)
}

fn views(timers: Vec<Timer>) -> Json<Vec<TimerView>> {
    Json(timers.into_iter().map(TimerView::from).collect())
}

/// Handle GET /timers - List timers, optionally filtered by category
pub async fn list_timers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimerQuery>,
) -> Json<Vec<TimerView>> {
    let timers = match query.category {
        Some(category) => state.service.timers_in(&category),
        None => state.service.list_timers(),
    };
    views(timers)
}

/// Handle POST /timers - Create a paused timer
pub async fn create_timer_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTimerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TimerView>)> {
    // malformed bodies, negative durations included, are plain invalid input
    let Json(request) = payload
        .map_err(|e| rejected("Create timer", TimerError::InvalidInput(e.body_text())))?;

    let timer = state
        .service
        .add_timer(
            &request.name,
            request.duration,
            request.category.as_deref(),
            request.halfway_alert,
        )
        .map_err(|e| rejected("Create timer", e))?;

    state.record_action(format!("add {}", timer.id));
    Ok((StatusCode::CREATED, Json(timer.into())))
}

/// Handle GET /timers/:id - Fetch one timer
pub async fn get_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let timer = state.service.get_timer(&id).map_err(|e| rejected("Get timer", e))?;
    Ok(Json(timer.into()))
}

/// Handle DELETE /timers/:id - Delete a timer
pub async fn delete_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let timer = state
        .service
        .delete_timer(&id)
        .map_err(|e| rejected("Delete timer", e))?;

    state.record_action(format!("delete {}", id));
    Ok(Json(timer.into()))
}

/// Handle POST /timers/:id/start - Start or resume a timer
pub async fn start_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let timer = state.service.start_timer(&id).map_err(|e| rejected("Start timer", e))?;
    state.record_action(format!("start {}", id));
    Ok(Json(timer.into()))
}

/// Handle POST /timers/:id/pause - Pause a timer
pub async fn pause_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let timer = state.service.pause_timer(&id).map_err(|e| rejected("Pause timer", e))?;
    state.record_action(format!("pause {}", id));
    Ok(Json(timer.into()))
}

/// Handle POST /timers/:id/reset - Reset a timer to its full duration
pub async fn reset_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let timer = state.service.reset_timer(&id).map_err(|e| rejected("Reset timer", e))?;
    state.record_action(format!("reset {}", id));
    Ok(Json(timer.into()))
}

/// Handle GET /categories - Categories with timer counts
pub async fn categories_handler(State(state): State<Arc<AppState>>) -> Json<Vec<CategorySummary>> {
    Json(
        state
            .service
            .categories()
            .into_iter()
            .map(|(name, timers)| CategorySummary { name, timers })
            .collect(),
    )
}

/// Handle POST /categories/:category/start
pub async fn start_category_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<TimerView>>> {
    let timers = state
        .service
        .start_category(&category)
        .map_err(|e| rejected("Start category", e))?;
    state.record_action(format!("start category {}", category));
    Ok(views(timers))
}

/// Handle POST /categories/:category/pause
pub async fn pause_category_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<TimerView>>> {
    let timers = state
        .service
        .pause_category(&category)
        .map_err(|e| rejected("Pause category", e))?;
    state.record_action(format!("pause category {}", category));
    Ok(views(timers))
}

/// Handle POST /categories/:category/reset
pub async fn reset_category_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<TimerView>>> {
    let timers = state
        .service
        .reset_category(&category)
        .map_err(|e| rejected("Reset category", e))?;
    state.record_action(format!("reset category {}", category));
    Ok(views(timers))
}

/// Handle GET /export - Serialized collection for saving to a file
pub async fn export_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let body = state
        .service
        .export_snapshot()
        .map_err(|e| rejected("Export", e.into()))?;

    info!("Exported {} timers", state.service.store().len());
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Handle GET /events - Stream completion and halfway events
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.service.events();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.name())
                        .json_data(event.timer())
                        .unwrap_or_else(|e| {
                            warn!("Failed to encode {} event: {}", event.name(), e);
                            Event::default().event(event.name())
                        });
                    return Some((Ok::<_, Infallible>(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Handle GET /status - Return current daemon status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let timers = state.service.list_timers();
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timers: timers.len(),
        running: timers.iter().filter(|t| t.is_running()).count(),
        completed: timers.iter().filter(|t| t.is_completed()).count(),
        scheduler_active: state.service.scheduler().is_running(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
        warnings: state.service.store().warnings(),
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
