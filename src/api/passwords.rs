// src/api/passwords.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};

use super::auth::CurrentUser;
use super::error::ApiError;
use crate::error::{StoreResult, ValidationError};
use crate::generator::{self, PasswordCriteria};
use crate::models::{CredentialRecord, NewRecord, RecordId, RecordPatch};
use crate::pagination::{Page, PageRequest};
use crate::state::AppState;
use crate::store::RecordStore;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
}

/// Create/update payload. Each field is `None` when absent and `Some(None)`
/// when sent as `null`, which is rejected.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub username: Option<Option<String>>,
    #[serde(default, alias = "password", deserialize_with = "present")]
    pub secret: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn take_field(field: &'static str, value: Option<Option<String>>, required: bool, errors: &mut ValidationError) -> Option<String> {
    match value {
        Some(Some(value)) => Some(value),
        Some(None) => {
            errors.push(field, "Expected string, received null");
            None
        }
        None => {
            if required {
                errors.push(field, "Required");
            }
            None
        }
    }
}

impl RecordBody {
    pub fn into_new_record(self) -> Result<NewRecord, ValidationError> {
        let mut errors = ValidationError::default();
        let name = take_field("name", self.name, true, &mut errors);
        let username = take_field("username", self.username, true, &mut errors);
        let secret = take_field("secret", self.secret, true, &mut errors);
        errors.into_result()?;
        NewRecord::new(name.unwrap_or_default(), username.unwrap_or_default(), secret.unwrap_or_default())
    }

    pub fn into_patch(self) -> Result<RecordPatch, ValidationError> {
        let mut errors = ValidationError::default();
        let patch = RecordPatch {
            name: take_field("name", self.name, false, &mut errors),
            username: take_field("username", self.username, false, &mut errors),
            secret: take_field("secret", self.secret, false, &mut errors),
        };
        errors.into_result()?;
        patch.validate()?;
        Ok(patch)
    }
}

/// An empty body reads as `{}`.
fn parse_body(body: &Bytes) -> Result<RecordBody, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RecordBody::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Ids that do not parse cannot exist, so they are simply not found.
fn parse_record_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

/// Runs a store operation off the async runtime; vault writes hit the disk.
async fn with_store<R, F>(store: &Arc<RecordStore>, op: F) -> Result<R, ApiError>
where
    F: FnOnce(&RecordStore) -> StoreResult<R> + Send + 'static,
    R: Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || op(&store)).await?;
    Ok(result?)
}

pub async fn list_records(
    user: CurrentUser,
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page<CredentialRecord>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let limits = &state.config.pagination;
    let page_size = query.page_size.unwrap_or(limits.default_page_size).min(limits.max_page_size);
    let request = PageRequest::new(query.page.unwrap_or(1), page_size)?;
    log::debug!("User {} lists page {} (size {})", user.id, request.page(), request.page_size());

    let search = query.search;
    let page = with_store(&state.store, move |store| store.list_by_owner(user.id, request, search.as_deref())).await?;
    Ok(Json(page))
}

pub async fn get_record(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CredentialRecord>, ApiError> {
    let id = parse_record_id(&id)?;
    let record = with_store(&state.store, move |store| store.get_for(user.id, id)).await?;
    Ok(Json(record))
}

pub async fn create_record(
    user: CurrentUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CredentialRecord>), ApiError> {
    let new_record = parse_body(&body)?.into_new_record()?;
    let record = with_store(&state.store, move |store| store.create(user.id, new_record)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Ownership is checked before the body so that a foreign id answers 404
/// whatever was sent.
pub async fn update_record(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CredentialRecord>, ApiError> {
    let id = parse_record_id(&id)?;
    if !state.store.is_owned_by(id, user.id) {
        return Err(ApiError::NotFound);
    }

    let patch = parse_body(&body)?.into_patch()?;
    if patch.is_empty() {
        log::debug!("Empty patch for record {}; only updatedAt changes", id);
    }
    let record = with_store(&state.store, move |store| store.update_for(user.id, id, &patch)).await?;
    Ok(Json(record))
}

pub async fn delete_record(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_record_id(&id)?;
    with_store(&state.store, move |store| store.delete_for(user.id, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug)]
pub struct GeneratedPassword {
    pub password: String,
}

pub async fn generate(
    _user: CurrentUser,
    query: Result<Query<PasswordCriteria>, QueryRejection>,
) -> Result<Json<GeneratedPassword>, ApiError> {
    let Query(criteria) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let password = generator::generate_password(&criteria).map_err(|msg| ValidationError::single("criteria", msg))?;
    Ok(Json(GeneratedPassword { password }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::TestApp;
    use axum::http::Method;
    use serde_json::json;

    fn github() -> serde_json::Value {
        json!({ "name": "GitHub", "username": "alice", "secret": "s3cr3t" })
    }

    #[tokio::test]
    async fn create_then_read_back_the_plaintext() {
        let app = TestApp::new();
        app.add_user("alice");

        let (status, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(github())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["secret"], "s3cr3t");
        assert_eq!(created["name"], "GitHub");
        assert!(created["updatedAt"].is_string());

        let uri = format!("/api/passwords/{}", created["id"]);
        let (status, fetched) = app.call(Method::GET, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["secret"], "s3cr3t");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_accepts_the_password_alias() {
        let app = TestApp::new();
        app.add_user("alice");
        let body = json!({ "name": "GitHub", "username": "alice", "password": "s3cr3t" });
        let (status, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["secret"], "s3cr3t");
    }

    #[tokio::test]
    async fn create_reports_each_invalid_field() {
        let app = TestApp::new();
        app.add_user("alice");

        let body = json!({ "name": "", "username": null });
        let (status, error) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = error["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["username", "secret"]);

        let (status, error) = app
            .call(Method::POST, "/api/passwords", Some("alice"), Some(json!({ "name": "", "username": "a", "secret": "" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["fields"][0]["field"], "name");
        assert_eq!(error["fields"][0]["message"], "Name is required");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new();
        app.add_user("alice");
        let (status, _) = app.call_raw(Method::POST, "/api/passwords", "alice", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call_raw(Method::POST, "/api/passwords", "alice", "[1, 2]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call_raw(Method::POST, "/api/passwords", "alice", r#"{"name": 5, "username": "a", "secret": "b"}"#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_merges_supplied_fields() {
        let app = TestApp::new();
        app.add_user("alice");
        let (_, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(github())).await;
        let uri = format!("/api/passwords/{}", created["id"]);

        let (status, updated) = app.call(Method::PATCH, &uri, Some("alice"), Some(json!({ "username": "bob" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "GitHub");
        assert_eq!(updated["username"], "bob");
        assert_eq!(updated["secret"], "s3cr3t");
        assert_ne!(updated["updatedAt"], created["updatedAt"]);

        let (status, updated) = app.call(Method::PATCH, &uri, Some("alice"), Some(json!({ "secret": "" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["secret"], "");

        let (status, _) = app.call(Method::PATCH, &uri, Some("alice"), Some(json!({ "name": null }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call(Method::PATCH, &uri, Some("alice"), Some(json!({ "name": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn foreign_and_absent_records_look_identical() {
        let app = TestApp::new();
        app.add_user("alice");
        app.add_user("bob");
        let (_, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(github())).await;
        let foreign = format!("/api/passwords/{}", created["id"]);

        for uri in [foreign.as_str(), "/api/passwords/999", "/api/passwords/not-a-number"] {
            let (get_status, get_body) = app.call(Method::GET, uri, Some("bob"), None).await;
            let (patch_status, patch_body) = app
                .call(Method::PATCH, uri, Some("bob"), Some(json!({ "name": "" })))
                .await;
            let (delete_status, delete_body) = app.call(Method::DELETE, uri, Some("bob"), None).await;

            assert_eq!(get_status, StatusCode::NOT_FOUND);
            assert_eq!(patch_status, StatusCode::NOT_FOUND);
            assert_eq!(delete_status, StatusCode::NOT_FOUND);
            assert_eq!(get_body, patch_body);
            assert_eq!(get_body, delete_body);
        }

        let (_, list) = app.call(Method::GET, "/api/passwords", Some("bob"), None).await;
        assert_eq!(list["total"], 0);

        let (status, still_there) = app.call(Method::GET, &foreign, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(still_there["name"], "GitHub");
    }

    #[tokio::test]
    async fn delete_answers_204_then_404() {
        let app = TestApp::new();
        app.add_user("alice");
        let (_, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(github())).await;
        let uri = format!("/api/passwords/{}", created["id"]);

        let (status, body) = app.call(Method::DELETE, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, _) = app.call(Method::DELETE, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_pages_through_25_records() {
        let app = TestApp::new();
        app.add_user("alice");
        for i in 0..25 {
            let body = json!({ "name": format!("site {}", i), "username": "alice", "secret": "pw" });
            app.call(Method::POST, "/api/passwords", Some("alice"), Some(body)).await;
        }

        let mut sizes = Vec::new();
        for page in 1..=4 {
            let uri = format!("/api/passwords?page={}&pageSize=10", page);
            let (status, body) = app.call(Method::GET, &uri, Some("alice"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["total"], 25);
            sizes.push(body["records"].as_array().unwrap().len());
        }
        assert_eq!(sizes, vec![10, 10, 5, 0]);

        let (_, everything) = app.call(Method::GET, "/api/passwords", Some("alice"), None).await;
        assert_eq!(everything["records"].as_array().unwrap().len(), 25);
        assert_eq!(everything["records"][0]["name"], "site 0");
    }

    #[tokio::test]
    async fn list_search_and_bad_paging() {
        let app = TestApp::new();
        app.add_user("alice");
        for name in ["GitHub", "Gmail"] {
            let body = json!({ "name": name, "username": "alice", "secret": "pw" });
            app.call(Method::POST, "/api/passwords", Some("alice"), Some(body)).await;
        }

        let (status, body) = app.call(Method::GET, "/api/passwords?search=hub", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["records"][0]["name"], "GitHub");

        let (status, _) = app.call(Method::GET, "/api/passwords?page=0", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call(Method::GET, "/api/passwords?pageSize=abc", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_password_honours_criteria() {
        let app = TestApp::new();
        app.add_user("alice");

        let (status, body) = app
            .call(Method::GET, "/api/generate-password?length=32&useSymbols=false", Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let password = body["password"].as_str().unwrap();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        let (status, _) = app.call(Method::GET, "/api/generate-password?length=0", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.call(Method::GET, "/api/generate-password", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn every_record_route_requires_authentication() {
        let app = TestApp::new();
        app.add_user("alice");
        let (_, created) = app.call(Method::POST, "/api/passwords", Some("alice"), Some(github())).await;
        let uri = format!("/api/passwords/{}", created["id"]);

        let anonymous = [
            (Method::POST, "/api/passwords", Some(github())),
            (Method::GET, uri.as_str(), None),
            (Method::PATCH, uri.as_str(), Some(json!({ "name": "" }))),
            (Method::DELETE, uri.as_str(), None),
        ];
        for (method, path, body) in anonymous {
            let (status, error) = app.call(method.clone(), path, None, body).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, path);
            assert_eq!(error["result"], "failed");
        }

        let (_, list) = app.call(Method::GET, "/api/passwords", Some("alice"), None).await;
        assert_eq!(list["total"], 1);
        let (_, kept) = app.call(Method::GET, &uri, Some("alice"), None).await;
        assert_eq!(kept["name"], "GitHub");
    }

    #[tokio::test]
    async fn requests_keep_flowing_while_a_vault_write_is_pending() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{Duration, Instant};

        let app = TestApp::new();
        app.add_user("alice");

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let store = Arc::clone(&app.state.store);
            std::thread::spawn(move || {
                let _writer = store.hold_writer();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
            })
        };
        locked_rx.recv().unwrap();

        let max_gap_ms = Arc::new(AtomicU64::new(0));
        let ticker = {
            let max_gap_ms = Arc::clone(&max_gap_ms);
            tokio::spawn(async move {
                let mut last = Instant::now();
                loop {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    let gap = last.elapsed().as_millis() as u64;
                    max_gap_ms.fetch_max(gap, Ordering::Relaxed);
                    last = Instant::now();
                }
            })
        };

        let started = Instant::now();
        let (status, _) = app.call(Method::GET, "/api/passwords", Some("alice"), None).await;
        let elapsed = started.elapsed();
        tokio::time::sleep(Duration::from_millis(50)).await;
        ticker.abort();

        assert_eq!(status, StatusCode::OK);
        assert!(elapsed < Duration::from_millis(200), "request took {:?}", elapsed);
        assert!(max_gap_ms.load(Ordering::Relaxed) < 200);

        tokio::task::spawn_blocking(move || holder.join().unwrap()).await.unwrap();
    }

    #[test]
    fn body_distinguishes_absent_null_and_empty() {
        let body: RecordBody = serde_json::from_str(r#"{"name": null, "secret": ""}"#).unwrap();
        assert_eq!(body.name, Some(None));
        assert_eq!(body.username, None);
        assert_eq!(body.secret, Some(Some(String::new())));

        let patch: RecordPatch = serde_json::from_str::<RecordBody>(r#"{"secret": ""}"#)
            .unwrap()
            .into_patch()
            .unwrap();
        assert_eq!(patch, RecordPatch::default().secret(""));
    }
}
