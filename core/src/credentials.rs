//! Credential resolution and the per-user provider settings behind it.
//!
//! The fan-out engine only ever sees a [`CredentialBundle`]: decrypted keys
//! and model names, one entry per provider. How they are stored is this
//! module's business.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use r2d2_sqlite::rusqlite::{params, Connection};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::config::ProviderDefaults;
use crate::crypto::SecretCipher;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::logging::{log_event, NewEvent};
use crate::providers::{CallError, Provider};

/// Where the key in a [`ProviderCredential`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    User,
    Environment,
    /// A stored key exists but could not be decrypted.
    Unreadable,
    None,
}

#[derive(Debug)]
pub struct ProviderCredential {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub source: KeySource,
}

impl ProviderCredential {
    pub fn new(api_key: Option<SecretString>, model: impl Into<String>) -> Self {
        let source = if api_key.is_some() {
            KeySource::User
        } else {
            KeySource::None
        };
        Self {
            api_key,
            model: model.into(),
            source,
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_key(&self, provider: Provider) -> Result<&SecretString, CallError> {
        match (&self.api_key, self.source) {
            (Some(key), _) => Ok(key),
            (None, KeySource::Unreadable) => Err(CallError::UnreadableCredential {
                provider: provider.display_name(),
            }),
            (None, _) => Err(CallError::MissingCredential {
                provider: provider.display_name(),
            }),
        }
    }
}

/// Decrypted credentials for one user, read-only for the duration of a call.
#[derive(Debug, Default)]
pub struct CredentialBundle {
    entries: HashMap<Provider, ProviderCredential>,
}

impl CredentialBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, credential: ProviderCredential) -> Self {
        self.entries.insert(provider, credential);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderCredential> {
        self.entries.get(&provider)
    }
}

/// Maps an authenticated identity to its credential bundle. Implementations
/// must not perform network I/O.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, username: &str) -> Result<CredentialBundle>;
}

/// Row of `user_credentials` as stored.
#[derive(Debug, Default, Clone)]
struct StoredRow {
    secret: Option<String>,
    model: Option<String>,
}

/// Resolver backed by SQLite, the secret cipher and the environment
/// fallbacks.
pub struct StoredCredentials {
    pool: DbPool,
    cipher: Arc<SecretCipher>,
    defaults: Arc<ProviderDefaults>,
}

impl StoredCredentials {
    pub fn new(pool: DbPool, cipher: Arc<SecretCipher>, defaults: Arc<ProviderDefaults>) -> Self {
        Self {
            pool,
            cipher,
            defaults,
        }
    }

    /// What the settings page shows. Never includes key material.
    pub fn settings(&self, username: &str) -> Result<SettingsView> {
        let bundle = self.resolve(username)?;
        let providers = Provider::ALL
            .iter()
            .filter_map(|&provider| {
                bundle.get(provider).map(|cred| ProviderSettingsView {
                    provider,
                    display_name: provider.display_name(),
                    has_key: cred.has_key(),
                    key_source: cred.source,
                    model: cred.model.clone(),
                })
            })
            .collect();
        Ok(SettingsView { providers })
    }

    pub fn update_settings(&self, username: &str, update: &SettingsUpdate) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut touched = Vec::new();
        for (provider, change) in &update.entries {
            match &change.key {
                FieldUpdate::Unchanged => {}
                FieldUpdate::Clear => write_secret(&tx, username, *provider, None, now)?,
                FieldUpdate::Set(plain) => {
                    let sealed = self.cipher.encrypt(plain.expose_secret())?;
                    write_secret(&tx, username, *provider, Some(&sealed), now)?;
                }
            }
            match &change.model {
                FieldUpdate::Unchanged => {}
                FieldUpdate::Clear => write_model(&tx, username, *provider, None, now)?,
                FieldUpdate::Set(model) => {
                    write_model(&tx, username, *provider, Some(model.as_str()), now)?
                }
            }
            touched.push(serde_json::json!({
                "provider": provider,
                "key": change.key.label(),
                "model": change.model.label(),
            }));
        }
        if let Err(err) = log_event(
            &tx,
            NewEvent {
                level: "info",
                code: Some("SET-0001"),
                module: "settings",
                actor: Some(username),
                message: "provider settings updated",
                explain: Some("Stored keys and models changed through the settings API"),
                data: Some(Value::Array(touched)),
            },
        ) {
            log::warn!("failed to record settings audit for {username}: {err}");
        }
        tx.commit()?;
        Ok(())
    }
}

impl CredentialResolver for StoredCredentials {
    fn resolve(&self, username: &str) -> Result<CredentialBundle> {
        let conn = self.pool.get()?;
        let rows = load_rows(&conn, username)?;
        let mut bundle = CredentialBundle::new();
        for provider in Provider::ALL {
            let credential = merge(provider, rows.get(&provider), &self.cipher, &self.defaults);
            bundle = bundle.with(provider, credential);
        }
        Ok(bundle)
    }
}

/// User-level values win over environment fallbacks; an undecryptable stored
/// key makes that one provider unusable and leaves the others alone.
fn merge(
    provider: Provider,
    row: Option<&StoredRow>,
    cipher: &SecretCipher,
    defaults: &ProviderDefaults,
) -> ProviderCredential {
    let stored_secret = row.and_then(|r| r.secret.as_deref());
    let (api_key, source) = match stored_secret {
        Some(sealed) => match cipher.decrypt(sealed) {
            Ok(plain) => (Some(SecretString::from(plain)), KeySource::User),
            Err(err) => {
                log::warn!("stored {provider} key is unusable: {err}");
                (None, KeySource::Unreadable)
            }
        },
        None => match defaults.api_key(provider) {
            Some(key) => (
                Some(SecretString::from(key.expose_secret().to_owned())),
                KeySource::Environment,
            ),
            None => (None, KeySource::None),
        },
    };
    let model = row
        .and_then(|r| r.model.clone())
        .unwrap_or_else(|| defaults.model(provider).to_string());
    ProviderCredential {
        api_key,
        model,
        source,
    }
}

fn load_rows(conn: &Connection, username: &str) -> Result<HashMap<Provider, StoredRow>> {
    let mut stmt =
        conn.prepare("SELECT provider, secret, model FROM user_credentials WHERE username = ?1")?;
    let rows = stmt.query_map(params![username], |row| {
        Ok((
            row.get::<_, String>(0)?,
            StoredRow {
                secret: row.get(1)?,
                model: row.get(2)?,
            },
        ))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (provider_id, stored) = row?;
        match Provider::from_id(&provider_id) {
            Some(provider) => {
                out.insert(provider, stored);
            }
            None => log::debug!("ignoring credentials for unknown provider {provider_id:?}"),
        }
    }
    Ok(out)
}

fn write_secret(
    conn: &Connection,
    username: &str,
    provider: Provider,
    sealed: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO user_credentials (username, provider, secret, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(username, provider) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at",
        params![username, provider.id(), sealed, now],
    )?;
    Ok(())
}

fn write_model(
    conn: &Connection,
    username: &str,
    provider: Provider,
    model: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO user_credentials (username, provider, model, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(username, provider) DO UPDATE SET model = excluded.model, updated_at = excluded.updated_at",
        params![username, provider.id(), model, now],
    )?;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettingsView {
    pub provider: Provider,
    pub display_name: &'static str,
    pub has_key: bool,
    pub key_source: KeySource,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub providers: Vec<ProviderSettingsView>,
}

#[derive(Debug)]
pub enum FieldUpdate<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Clear => "cleared",
            Self::Set(_) => "set",
        }
    }
}

#[derive(Debug)]
pub struct ProviderUpdate {
    pub key: FieldUpdate<SecretString>,
    pub model: FieldUpdate<String>,
}

/// Parsed body of `POST /api/settings`.
#[derive(Debug, Default)]
pub struct SettingsUpdate {
    entries: Vec<(Provider, ProviderUpdate)>,
}

impl SettingsUpdate {
    /// Reads `<provider>Key` / `<provider>Model` fields, e.g. `openaiKey`.
    /// Absent fields are left alone; `null` or blank clears.
    pub fn from_json(body: &Value) -> Result<Self, AppError> {
        let object = body
            .as_object()
            .ok_or_else(|| AppError::validation("settings body must be a JSON object"))?;
        let mut entries = Vec::new();
        for provider in Provider::ALL {
            let key_field = format!("{}Key", provider.id());
            let model_field = format!("{}Model", provider.id());
            let key = parse_field(object.get(&key_field), &key_field)?;
            let model = parse_field(object.get(&model_field), &model_field)?;
            if matches!((&key, &model), (FieldUpdate::Unchanged, FieldUpdate::Unchanged)) {
                continue;
            }
            entries.push((
                provider,
                ProviderUpdate {
                    key: match key {
                        FieldUpdate::Set(plain) => FieldUpdate::Set(SecretString::from(plain)),
                        FieldUpdate::Clear => FieldUpdate::Clear,
                        FieldUpdate::Unchanged => FieldUpdate::Unchanged,
                    },
                    model,
                },
            ));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_field(value: Option<&Value>, name: &str) -> Result<FieldUpdate<String>, AppError> {
    match value {
        None => Ok(FieldUpdate::Unchanged),
        Some(Value::Null) => Ok(FieldUpdate::Clear),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(FieldUpdate::Clear),
        Some(Value::String(s)) => Ok(FieldUpdate::Set(s.trim().to_string())),
        Some(_) => Err(AppError::validation(format!("{name} must be a string or null"))),
    }
}
