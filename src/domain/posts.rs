//! Posts served by the remote API.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// One post as returned by a JSONPlaceholder-style `/posts` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub user_id: u64,
    pub id: u64,
    pub title: String,
    pub body: String,
}

/// Decodes a cached or freshly fetched payload.
pub fn decode(payload: &[u8]) -> Result<Vec<Post>, DomainError> {
    serde_json::from_slice(payload)
        .map_err(|err| DomainError::malformed(format!("not a JSON list of posts: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_fields() {
        let payload = br#"[{"userId":1,"id":7,"title":"qui est esse","body":"est rerum"}]"#;
        let posts = decode(payload).expect("decode");

        assert_eq!(
            posts,
            vec![Post {
                user_id: 1,
                id: 7,
                title: "qui est esse".to_string(),
                body: "est rerum".to_string(),
            }]
        );
    }

    #[test]
    fn rejects_non_json_payloads() {
        let err = decode(b"<html>502</html>").expect_err("not json");
        assert!(matches!(err, DomainError::MalformedPayload { .. }));
    }
}
