use serde::Serialize;

use crate::credentials::CredentialBundle;
use crate::providers::Provider;

/// Each provider currently exposes a single credential slot.
pub const PRIMARY_SLOT: u32 = 1;

/// A (provider, slot) pair a prompt can be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub provider: Provider,
    pub display_name: String,
    pub model: String,
}

pub fn account_id(provider: Provider, slot: u32) -> String {
    format!("{}-{}", provider.id(), slot)
}

impl Account {
    /// Looks up an account id such as `"openai-1"` against a bundle. Ids that
    /// name no known (provider, slot) pair resolve to `None`.
    pub fn resolve(id: &str, bundle: &CredentialBundle) -> Option<Account> {
        let provider = Provider::ALL
            .into_iter()
            .find(|p| account_id(*p, PRIMARY_SLOT) == id)?;
        let credential = bundle.get(provider)?;
        Some(Account {
            id: id.to_string(),
            provider,
            display_name: provider.display_name().to_string(),
            model: credential.model.clone(),
        })
    }
}

/// Accounts whose provider has a usable key, in catalog order.
pub fn configured_accounts(bundle: &CredentialBundle) -> Vec<Account> {
    Provider::ALL
        .into_iter()
        .filter(|p| bundle.get(*p).is_some_and(|c| c.has_key()))
        .filter_map(|p| Account::resolve(&account_id(p, PRIMARY_SLOT), bundle))
        .collect()
}
