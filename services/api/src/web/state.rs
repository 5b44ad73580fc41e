//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::actions::ActionContext;
use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// Sessions keep their own view state; nothing here changes after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub actions: ActionContext,
}

impl AppState {
    pub fn new(config: Arc<Config>, actions: ActionContext) -> Self {
        Self { config, actions }
    }
}
