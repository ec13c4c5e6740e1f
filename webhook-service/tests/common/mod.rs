#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::Value;
use webhook_service::auth::UserIdentity;

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn token_review(token: &str) -> Value {
    serde_json::json!({
        "apiVersion": "authentication.k8s.io/v1",
        "kind": "TokenReview",
        "spec": {"token": token}
    })
}

pub fn access_review(actions: &[(&str, bool)]) -> Value {
    let actions: Vec<Value> = actions
        .iter()
        .map(|(id, data)| serde_json::json!({"id": id, "isDataAction": data}))
        .collect();
    serde_json::json!({
        "apiVersion": "authorization.k8s.io/v1",
        "kind": "SubjectAccessReview",
        "spec": {
            "Subject": {"Attributes": {"ObjectId": ["00000000-0000-0000-0000-000000000001"]}},
            "Actions": actions,
            "Resource": {"Id": "/subscriptions/sub-1/resourceGroups/rg"}
        }
    })
}

pub fn identity(username: &str, uid: &str, groups: &[&str]) -> UserIdentity {
    UserIdentity {
        username: username.to_string(),
        uid: uid.to_string(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
    }
}
