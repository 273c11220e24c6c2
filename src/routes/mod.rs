use axum::Router;

use crate::DetailSession;

mod detail;
mod health;

// ---

pub fn router(session: DetailSession) -> Router {
    // ---
    Router::new()
        .merge(detail::router())
        .merge(health::router())
        .with_state(session)
}
