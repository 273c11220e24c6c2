//! Detail view endpoints.
//!
//! - `PUT /detail/{sensor_id}` – open the detail view for a sensor
//! - `GET /detail` – current view model (load state, status, alerts, chart)
//! - `GET /detail/chart` – chart points only
//! - `DELETE /detail` – leave the detail view

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use crate::DetailSession;

// ---

pub fn router() -> Router<DetailSession> {
    // ---
    Router::new()
        .route("/detail", get(view).delete(close))
        .route("/detail/chart", get(chart))
        .route("/detail/{sensor_id}", put(select))
}

#[derive(Debug, Serialize)]
struct SelectResponse {
    sensor_id: String,
    state: &'static str,
}

async fn select(Path(sensor_id): Path<String>, State(session): State<DetailSession>) -> impl IntoResponse {
    // ---
    info!("PUT /detail/{}", sensor_id);

    let sensor_id = sensor_id.trim().to_string();
    if sensor_id.is_empty() {
        return (StatusCode::BAD_REQUEST, Json("sensor id must not be empty")).into_response();
    }

    if let Err(e) = session.select(&sensor_id).await {
        error!("Failed to select sensor {}: {}", sensor_id, e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json("Detail session unavailable"),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(SelectResponse {
            sensor_id,
            state: "loading",
        }),
    )
        .into_response()
}

async fn view(State(session): State<DetailSession>) -> impl IntoResponse {
    // ---
    let view = session.view();
    info!("GET /detail - {:?} {:?}", view.sensor_id, view.load);
    (StatusCode::OK, Json(view))
}

async fn chart(State(session): State<DetailSession>) -> impl IntoResponse {
    // ---
    let points = session.chart();
    info!("GET /detail/chart - returning {} points", points.len());
    (StatusCode::OK, Json(points))
}

async fn close(State(session): State<DetailSession>) -> impl IntoResponse {
    // ---
    info!("DELETE /detail");
    match session.close().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!("Failed to close detail view: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
