//! Version 1 of the HTTP API.
//!
//! Handlers are thin: they authenticate, validate input, push SQLite work onto
//! the blocking pool and return JSON payloads.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

use crate::accounts::Account;
use crate::auth::{self, SESSION_COOKIE};
use crate::credentials::{SettingsUpdate, SettingsView, StoredCredentials};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::fanout::{FanoutResponse, FanoutService, INVALID_REQUEST};
use crate::logging::{self, log_event, EventRecord, NewEvent};

const DEFAULT_EVENT_LIMIT: usize = 50;
const MAX_EVENT_LIMIT: usize = 500;

/// Shared state injected into each handler.
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub credentials: Arc<StoredCredentials>,
    pub fanout: Arc<FanoutService>,
    pub sessions: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: time::Duration,
    pub secure: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/ping", get(ping))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/accounts", get(list_accounts))
        .route("/api/prompt", post(prompt))
        .route("/api/events", get(list_events))
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::DbUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            AppError::Internal(detail) => {
                log::error!("request failed: {detail}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": message,
            "code": self.code(),
            "explain": self.explain(),
        }));
        (status, body).into_response()
    }
}

/// Identity of the caller, taken from the session cookie.
pub struct AuthUser {
    pub username: String,
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, AppError> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;
        let pool = state.db.clone();
        let username = spawn_blocking(move || -> Result<Option<String>, AppError> {
            let conn = pool.get()?;
            Ok(auth::session_user(&conn, &token)?)
        })
        .await??
        .ok_or(AppError::Unauthorized)?;
        Ok(AuthUser { username })
    }
}

fn session_cookie(token: String, settings: &SessionSettings) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .max_age(settings.ttl)
        .build()
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, AppError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        log::debug!("rejected request body: {rejection}");
        AppError::validation(message)
    })
}

/// Health check.
pub async fn ping() -> Json<Value> {
    Json(json!({
        "ok": true,
        "ts": OffsetDateTime::now_utc().unix_timestamp(),
    }))
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<ApiState>,
    jar: CookieJar,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    const REQUIRED: &str = "username and password required";
    let input = json_body(body, REQUIRED)?;
    let (username, password) = match (input.username, input.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => return Err(AppError::validation(REQUIRED)),
    };

    let pool = state.db.clone();
    let ttl = state.sessions.ttl;
    let session = spawn_blocking(move || -> Result<Option<auth::Session>, AppError> {
        let conn = pool.get()?;
        if !auth::authenticate(&conn, &username, &password)? {
            return Ok(None);
        }
        let session = auth::create_session(&conn, &username, ttl)?;
        if let Err(err) = log_event(
            &conn,
            NewEvent {
                level: "info",
                code: Some("AUTH-0001"),
                module: "auth",
                actor: Some(&username),
                message: "user signed in",
                explain: None,
                data: None,
            },
        ) {
            log::warn!("failed to record sign-in audit for {username}: {err}");
        }
        Ok(Some(session))
    })
    .await??
    .ok_or(AppError::InvalidCredentials)?;

    let jar = jar.add(session_cookie(session.token, &state.sessions));
    Ok((jar, Json(json!({ "ok": true }))))
}

pub async fn logout(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        let pool = state.db.clone();
        spawn_blocking(move || -> Result<(), AppError> {
            let conn = pool.get()?;
            Ok(auth::end_session(&conn, &token)?)
        })
        .await??;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(json!({ "ok": true }))))
}

pub async fn me(user: AuthUser) -> Json<Value> {
    Json(json!({ "user": { "username": user.username } }))
}

pub async fn get_settings(
    user: AuthUser,
    State(state): State<ApiState>,
) -> Result<Json<SettingsView>, AppError> {
    let credentials = state.credentials.clone();
    let view = spawn_blocking(move || credentials.settings(&user.username)).await??;
    Ok(Json(view))
}

pub async fn update_settings(
    user: AuthUser,
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(body, "settings body must be a JSON object")?;
    let update = SettingsUpdate::from_json(&body)?;
    if !update.is_empty() {
        let credentials = state.credentials.clone();
        spawn_blocking(move || credentials.update_settings(&user.username, &update)).await??;
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_accounts(
    user: AuthUser,
    State(state): State<ApiState>,
) -> Result<Json<Value>, AppError> {
    let accounts: Vec<Account> = state.fanout.accounts(&user.username).await?;
    Ok(Json(json!({ "accounts": accounts })))
}

#[derive(Deserialize)]
pub struct PromptInput {
    pub prompt: Option<String>,
    #[serde(rename = "accountIds")]
    pub account_ids: Option<Vec<String>>,
}

pub async fn prompt(
    user: AuthUser,
    State(state): State<ApiState>,
    body: Result<Json<PromptInput>, JsonRejection>,
) -> Result<Json<FanoutResponse>, AppError> {
    let input = json_body(body, INVALID_REQUEST)?;
    let prompt = input.prompt.unwrap_or_default();
    let account_ids = input.account_ids.unwrap_or_default();
    let response = state
        .fanout
        .broadcast(&user.username, &prompt, &account_ids)
        .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// Recent per-account call events for the signed-in user.
pub async fn list_events(
    user: AuthUser,
    State(state): State<ApiState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<Vec<EventRecord>>, AppError> {
    let Query(query) = query.map_err(|rejection| {
        log::debug!("rejected events query: {rejection}");
        AppError::validation("limit must be a positive integer")
    })?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);
    let pool = state.db.clone();
    let events = spawn_blocking(move || -> Result<Vec<EventRecord>, AppError> {
        let conn = pool.get()?;
        logging::list_events(&conn, "fanout", &user.username, limit).map_err(AppError::internal)
    })
    .await??;
    Ok(Json(events))
}
