//! Load state of the detail view: `Idle → Loading → {Ready, Error}`.
//!
//! Ready and Error are not terminal; selecting another sensor re-enters
//! Loading from any state. Errors are never retried automatically.

use serde::Serialize;

// ---

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Human-readable failure cause.
    Error(String),
}

impl LoadState {
    // ---
    /// Enter Loading, clearing any previous error.
    pub fn start(&mut self) {
        *self = LoadState::Loading;
    }

    /// Settle a load. Ignored unless currently Loading.
    pub fn finish<E: std::fmt::Display>(&mut self, outcome: Result<(), E>) -> bool {
        // ---
        if !self.is_loading() {
            return false;
        }
        *self = match outcome {
            Ok(()) => LoadState::Ready,
            Err(e) => LoadState::Error(e.to_string()),
        };
        true
    }

    pub fn reset(&mut self) {
        *self = LoadState::Idle;
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Error(cause) => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_success_path() {
        // ---
        let mut state = LoadState::default();
        assert_eq!(state, LoadState::Idle);

        state.start();
        assert!(state.is_loading());

        assert!(state.finish::<String>(Ok(())));
        assert!(state.is_ready());
    }

    #[test]
    fn test_failure_carries_cause() {
        // ---
        let mut state = LoadState::Loading;
        state.finish(Err("Sensor not found"));
        assert_eq!(state.error(), Some("Sensor not found"));
    }

    #[test]
    fn test_reentry_clears_error() {
        // ---
        let mut state = LoadState::Error("boom".to_string());
        state.start();
        assert_eq!(state, LoadState::Loading);
        assert_eq!(state.error(), None);
    }

    #[test]
    fn test_finish_outside_loading_is_ignored() {
        // ---
        let mut state = LoadState::Idle;
        assert!(!state.finish::<String>(Ok(())));
        assert_eq!(state, LoadState::Idle);
    }

    #[test]
    fn test_serialized_shape() {
        // ---
        let json = serde_json::to_value(LoadState::Error("offline".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "error", "cause": "offline" }));

        let json = serde_json::to_value(LoadState::Ready).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "ready" }));
    }
}
