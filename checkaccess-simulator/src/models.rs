//! Wire types. Inbound field names are matched in both PascalCase and
//! camelCase, outbound decisions are camelCase.

use serde::{Deserialize, Serialize};

pub const CHECK_ACCESS_PATH: &str = "/providers/Microsoft.Authorization/checkaccess";
pub const REMAINING_READS_HEADER: &str = "x-ms-ratelimit-remaining-subscription-reads";
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";
pub const DECISION_TTL_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub expires_on: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckAccessRequest {
    #[serde(rename = "Subject", alias = "subject")]
    pub subject: Subject,
    #[serde(rename = "Actions", alias = "actions")]
    pub actions: Vec<Action>,
    #[serde(rename = "Resource", alias = "resource")]
    pub resource: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    #[serde(rename = "Attributes", alias = "attributes")]
    pub attributes: SubjectAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectAttributes {
    #[serde(rename = "ObjectId", alias = "objectId", alias = "objectID")]
    pub object_id: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    #[serde(rename = "Id", alias = "id", alias = "ID")]
    pub id: String,
    #[serde(rename = "IsDataAction", alias = "isDataAction")]
    pub is_data_action: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    #[serde(rename = "Id", alias = "id", alias = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    pub access_decision: AccessDecision,
    pub action_id: String,
    pub is_data_action: bool,
    pub time_to_live_in_ms: u64,
}

/// Flat counter snapshot served at `/mock-metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockMetrics {
    pub total_requests: i64,
    pub throttled: i64,
    pub allowed: i64,
    pub denied: i64,
    pub tokens_issued: i64,
    pub uptime_seconds: i64,
    pub config_port: i64,
    pub config_min_lat: i64,
    pub config_max_lat: i64,
    pub config_allow: i64,
    pub config_throttle: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_either_casing() {
        let pascal: CheckAccessRequest = serde_json::from_value(json!({
            "Subject": {"Attributes": {"ObjectId": ["u1"]}},
            "Actions": [{"Id": "read", "IsDataAction": true}],
            "Resource": {"Id": "/subscriptions/x"}
        }))
        .unwrap();
        let camel: CheckAccessRequest = serde_json::from_value(json!({
            "subject": {"attributes": {"objectId": ["u1"]}},
            "actions": [{"id": "read", "isDataAction": true}],
            "resource": {"id": "/subscriptions/x"}
        }))
        .unwrap();
        assert_eq!(pascal, camel);
    }

    #[test]
    fn decision_serializes_camel_case() {
        let decision = AuthorizationDecision {
            access_decision: AccessDecision::Denied,
            action_id: "A".into(),
            is_data_action: false,
            time_to_live_in_ms: DECISION_TTL_MS,
        };
        assert_eq!(
            serde_json::to_value(decision).unwrap(),
            json!({"accessDecision": "Denied", "actionId": "A", "isDataAction": false, "timeToLiveInMs": 300000})
        );
    }
}
