//! Core library for Multiprompt: send one prompt to several LLM provider
//! accounts at once and collect every answer.
//!
//! Module map:
//! - [`fanout`] dispatches a prompt to many accounts in parallel and joins the results.
//! - [`providers`] holds one adapter per upstream API behind a shared trait.
//! - [`credentials`] resolves a user to decrypted keys and model names.
//! - [`accounts`] maps account ids such as `openai-1` to providers.
//! - [`api`] exposes the HTTP routes the binary serves.
//! - [`auth`], [`crypto`], [`db`] are the storage and session plumbing.
//! - [`config`], [`errors`], [`logging`] carry configuration, the error catalogue and the event log.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod fanout;
pub mod logging;
pub mod providers;
