// src/api/routes.rs
use axum::{routing::get, Router};

use super::passwords;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/passwords", get(passwords::list_records).post(passwords::create_record))
        .route(
            "/passwords/{id}",
            get(passwords::get_record)
                .patch(passwords::update_record)
                .delete(passwords::delete_record),
        )
        .route("/generate-password", get(passwords::generate))
}
