//! External scoring oracle.
//!
//! The oracle is an opaque scoring service: given a rule and a match it
//! answers with zero or more result rows. It is treated as untrusted and
//! unreliable — timeouts, malformed payloads, and empty or over-full result
//! sets are all expected. The settlement engine owns retry and cancellation
//! policy; this module only shapes the call.

use crate::config::OracleConfig;
use crate::errors::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One row returned by a scoring rule. Only the match scope is interpreted;
/// everything else rides along for the audit snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub match_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    #[serde(default)]
    pub results: Vec<ResultRow>,
}

impl OracleResponse {
    /// A bet wins iff at least one returned row is scoped to its match.
    pub fn hits_match(&self, match_id: &str) -> bool {
        self.results.iter().any(|row| row.match_id == match_id)
    }
}

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn execute_scoring_rule(
        &self,
        rule_id: &str,
        match_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<OracleResponse, OracleError>;
}

/// HTTP client for the scoring service.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_ms,
        })
    }
}

#[async_trait]
impl ScoringOracle for HttpOracle {
    async fn execute_scoring_rule(
        &self,
        rule_id: &str,
        match_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<OracleResponse, OracleError> {
        let url = format!("{}/api/queries/{}/execute", self.base_url, rule_id);
        let body = serde_json::json!({
            "match_id": match_id,
            "parameters": parameters,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_ms)
                } else {
                    OracleError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        response
            .json::<OracleResponse>()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_decodes_with_extra_fields() {
        let raw = json!({
            "results": [
                {"match_id": "m1", "player": "nine", "minute": 12},
                {"match_id": "m2"}
            ],
            "rule_version": 3
        });

        let response: OracleResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].fields["player"], "nine");
        assert!(response.hits_match("m1"));
        assert!(!response.hits_match("m3"));
    }

    #[test]
    fn missing_results_is_an_empty_set() {
        let response: OracleResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.results.is_empty());
        assert!(!response.hits_match("m1"));
    }

    #[test]
    fn snapshot_roundtrips_rows() {
        let response = OracleResponse {
            results: vec![ResultRow {
                match_id: "m1".to_string(),
                fields: serde_json::Map::new(),
            }],
        };
        let snapshot = serde_json::to_value(&response).unwrap();
        assert_eq!(snapshot["results"][0]["match_id"], "m1");
    }
}
