use serde::Serialize;

use super::dispatcher::CallResult;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutResponse {
    pub prompt: String,
    pub results: Vec<CallResult>,
    pub total_ms: u64,
}

/// `total_ms` is the slowest call, since all of them ran side by side.
pub fn aggregate(prompt: impl Into<String>, results: Vec<CallResult>) -> FanoutResponse {
    let total_ms = results.iter().map(|r| r.elapsed_ms).max().unwrap_or(0);
    FanoutResponse {
        prompt: prompt.into(),
        results,
        total_ms,
    }
}
