//! HTTP surface served by the binary.
//!
//! Versioned modules (currently `v1`) group the routes; [`build_state`] wires
//! storage, credentials and the fan-out engine together from configuration.

pub mod v1;

use std::sync::Arc;

use anyhow::Result;
use secrecy::ExposeSecret;

use crate::auth;
use crate::config::AppConfig;
use crate::credentials::StoredCredentials;
use crate::crypto::SecretCipher;
use crate::db::init_db;
use crate::fanout::FanoutService;
use crate::providers::{build_http_client, AdapterRegistry};

pub use v1::{router, ApiState, SessionSettings};

/// Opens the database, bootstraps the admin user and assembles shared state.
pub fn build_state(config: AppConfig) -> Result<ApiState> {
    let db = init_db(&config.data_dir)?;
    {
        let conn = db.get()?;
        auth::ensure_admin(&conn, &config.admin_user, config.admin_pass.expose_secret())?;
        let purged = auth::purge_expired_sessions(&conn)?;
        if purged > 0 {
            log::info!("purged {purged} expired sessions");
        }
    }

    let cipher = Arc::new(SecretCipher::from_passphrase(
        config.encryption_key.expose_secret(),
    ));
    let client = build_http_client(config.http_timeout)?;
    let registry = Arc::new(AdapterRegistry::new(client, &config.providers));
    let credentials = Arc::new(StoredCredentials::new(
        db.clone(),
        cipher,
        Arc::new(config.providers),
    ));
    let fanout = FanoutService::new(db.clone(), credentials.clone(), registry);

    Ok(ApiState {
        db,
        credentials,
        fanout,
        sessions: SessionSettings {
            ttl: config.session_ttl,
            secure: config.cookie_secure,
        },
    })
}
