// src/state.rs
use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Config;
use crate::store::RecordStore;

/// Shared by every handler. Built once at startup; the store is dropped with
/// the last clone when the server shuts down.
#[derive(FromRef, Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: RecordStore, config: Config) -> Self {
        AppState {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}
