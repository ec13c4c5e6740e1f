pub mod access_review;
pub mod health;
pub mod token_review;

pub use access_review::{subject_access_review, subject_access_review_by_header};
pub use health::{health, metrics};
pub use token_review::{token_review, token_review_by_header};

use axum::http::HeaderMap;

/// Header naming the organization when it is not part of the path.
pub const ORG_HEADER: &str = "x-guard-org";

fn org_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(ORG_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
