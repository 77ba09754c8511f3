//! Prompt fan-out: resolve the caller's credentials, dispatch one call per
//! account in parallel, then fold everything into a single response.
//!
//! Request-level problems (bad input, storage trouble) surface as
//! [`AppError`]. Anything that goes wrong for an individual account is
//! captured in that account's [`CallResult`] and never fails the request.

pub mod aggregate;
pub mod dispatcher;

use std::sync::Arc;

use tokio::task::spawn_blocking;

pub use aggregate::{aggregate, FanoutResponse};
pub use dispatcher::{validate, CallResult, Dispatcher, INVALID_REQUEST};

use crate::accounts::{configured_accounts, Account};
use crate::credentials::{CredentialBundle, CredentialResolver};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::logging::{log_event, NewEvent};
use crate::providers::AdapterRegistry;

const PREVIEW_CHARS: usize = 200;

pub struct FanoutService {
    pool: DbPool,
    resolver: Arc<dyn CredentialResolver>,
    dispatcher: Dispatcher,
}

impl FanoutService {
    pub fn new(
        pool: DbPool,
        resolver: Arc<dyn CredentialResolver>,
        registry: Arc<AdapterRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            resolver,
            dispatcher: Dispatcher::new(registry),
        })
    }

    /// Resolve on the blocking pool; the resolver reads SQLite.
    pub async fn resolve(&self, username: &str) -> Result<CredentialBundle, AppError> {
        let resolver = Arc::clone(&self.resolver);
        let username = username.to_string();
        let bundle = spawn_blocking(move || resolver.resolve(&username)).await??;
        Ok(bundle)
    }

    pub async fn accounts(&self, username: &str) -> Result<Vec<Account>, AppError> {
        let bundle = self.resolve(username).await?;
        Ok(configured_accounts(&bundle))
    }

    pub async fn broadcast(
        &self,
        username: &str,
        prompt: &str,
        account_ids: &[String],
    ) -> Result<FanoutResponse, AppError> {
        validate(prompt, account_ids)?;
        let bundle = Arc::new(self.resolve(username).await?);
        let results = self.dispatcher.dispatch(prompt, account_ids, bundle).await?;

        let failed = results.iter().filter(|r| !r.ok).count();
        log::info!(
            "fan-out for {username}: {} accounts, {failed} failed",
            results.len()
        );
        if let Err(err) = record_results(&self.pool, username, &results).await {
            log::warn!("fan-out event task failed: {err}");
        }
        Ok(aggregate(prompt, results))
    }
}

/// Writes one event per settled call. Logging failures are only warned about.
async fn record_results(
    pool: &DbPool,
    username: &str,
    results: &[CallResult],
) -> Result<(), tokio::task::JoinError> {
    let pool = pool.clone();
    let username = username.to_string();
    let results = results.to_vec();
    spawn_blocking(move || {
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(err) => {
                log::warn!("skipping fan-out event log: {err}");
                return;
            }
        };
        for result in &results {
            let event = if result.ok {
                let preview = result
                    .text
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(PREVIEW_CHARS)
                    .collect::<String>();
                NewEvent {
                    level: "info",
                    code: Some("FAN-0200"),
                    module: "fanout",
                    actor: Some(&username),
                    message: "provider call succeeded",
                    explain: None,
                    data: Some(serde_json::json!({
                        "accountId": result.account_id,
                        "provider": result.provider,
                        "elapsedMs": result.elapsed_ms,
                        "preview": preview,
                    })),
                }
            } else {
                NewEvent {
                    level: "warn",
                    code: Some("FAN-0201"),
                    module: "fanout",
                    actor: Some(&username),
                    message: "provider call failed",
                    explain: Some("The failure was confined to this account"),
                    data: Some(serde_json::json!({
                        "accountId": result.account_id,
                        "provider": result.provider,
                        "elapsedMs": result.elapsed_ms,
                        "errorCode": result.error_code,
                        "error": result.error,
                    })),
                }
            };
            if let Err(err) = log_event(&conn, event) {
                log::warn!("failed to record fan-out event: {err}");
            }
        }
    })
    .await
}
