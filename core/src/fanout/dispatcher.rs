use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use crate::accounts::Account;
use crate::credentials::CredentialBundle;
use crate::errors::AppError;
use crate::providers::{AdapterRegistry, CallError, Provider, ProviderAdapter};

pub const INVALID_REQUEST: &str = "prompt and accountIds[] required";

/// Outcome of one account's call. `text` is present iff `ok`, `error` iff not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub account_id: String,
    pub provider: Option<Provider>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub error_code: Option<&'static str>,
    pub elapsed_ms: u64,
}

impl CallResult {
    pub fn success(account_id: String, provider: Provider, text: String, elapsed: Duration) -> Self {
        Self {
            account_id,
            provider: Some(provider),
            ok: true,
            text: Some(text),
            error: None,
            error_code: None,
            elapsed_ms: millis(elapsed),
        }
    }

    pub fn failure(
        account_id: String,
        provider: Option<Provider>,
        error: &CallError,
        elapsed: Duration,
    ) -> Self {
        Self {
            account_id,
            provider,
            ok: false,
            text: None,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            elapsed_ms: millis(elapsed),
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Rejects an empty prompt and an empty id list. Whitespace is a prompt.
pub fn validate(prompt: &str, account_ids: &[String]) -> Result<(), AppError> {
    if prompt.is_empty() || account_ids.is_empty() {
        return Err(AppError::validation(INVALID_REQUEST));
    }
    Ok(())
}

/// Fans one prompt out to many accounts and joins every call.
pub struct Dispatcher {
    registry: Arc<AdapterRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// One spawned task per id, all started before any is awaited. Results
    /// come back in input order, one per id, whatever each call did.
    pub async fn dispatch(
        &self,
        prompt: &str,
        account_ids: &[String],
        bundle: Arc<CredentialBundle>,
    ) -> Result<Vec<CallResult>, AppError> {
        validate(prompt, account_ids)?;
        let prompt: Arc<str> = Arc::from(prompt);

        let mut pending = Vec::with_capacity(account_ids.len());
        for id in account_ids {
            let account = Account::resolve(id, &bundle);
            let provider = account.as_ref().map(|a| a.provider);
            let adapter = provider.and_then(|p| self.registry.get(p));
            let started = Instant::now();
            let handle = tokio::spawn(invoke_account(
                id.clone(),
                account,
                adapter,
                Arc::clone(&bundle),
                Arc::clone(&prompt),
            ));
            pending.push((id.clone(), provider, started, handle));
        }

        let settled = join_all(pending.into_iter().map(
            |(id, provider, started, handle)| async move {
                match handle.await {
                    Ok(result) => result,
                    Err(err) => {
                        log::error!("dispatch task for {id} did not complete: {err}");
                        let error = CallError::Task(err.to_string());
                        CallResult::failure(id, provider, &error, started.elapsed())
                    }
                }
            },
        ))
        .await;
        Ok(settled)
    }
}

async fn invoke_account(
    id: String,
    account: Option<Account>,
    adapter: Option<Arc<dyn ProviderAdapter>>,
    bundle: Arc<CredentialBundle>,
    prompt: Arc<str>,
) -> CallResult {
    let started = Instant::now();
    let resolved = account.and_then(|account| {
        let credential = bundle.get(account.provider)?;
        Some((account.provider, adapter?, credential))
    });
    let Some((provider, adapter, credential)) = resolved else {
        let error = CallError::UnknownAccount(id.clone());
        return CallResult::failure(id, None, &error, started.elapsed());
    };

    match adapter.complete(credential, &prompt).await {
        Ok(text) => CallResult::success(id, provider, text, started.elapsed()),
        Err(error) => {
            log::debug!("{id} failed: {error}");
            CallResult::failure(id, Some(provider), &error, started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_empty_prompt_and_empty_ids() {
        let ids = vec!["openai-1".to_string()];
        assert!(validate("", &ids).is_err());
        assert!(validate("   ", &ids).is_ok());
        assert!(validate("hi", &[]).is_err());
        assert!(validate("hi", &ids).is_ok());
    }

    #[test]
    fn failure_serializes_without_text() {
        let result = CallResult::failure(
            "x-1".into(),
            None,
            &CallError::UnknownAccount("x-1".into()),
            Duration::from_millis(3),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["accountId"], "x-1");
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "Unknown account: x-1");
        assert_eq!(json["elapsedMs"], 3);
        assert!(json.get("text").is_none());
        assert!(json.get("errorCode").is_none());
    }
}
