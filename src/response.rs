//! JSON envelope returned at the process boundary.

use crate::error::NodeflowError;
use serde::Serialize;

/// `{"success": true, ...payload}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Response<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn from_result<E: Into<String>>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::failure(e),
        }
    }
}

impl<T> From<NodeflowError> for Response<T> {
    fn from(error: NodeflowError) -> Self {
        Self::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Payload {
        rows: usize,
    }

    #[test]
    fn test_success_flattens_payload() {
        let response = Response::ok(Payload { rows: 3 });
        assert_eq!(
            serde_json::to_value(&response).expect("serializable"),
            json!({"success": true, "rows": 3})
        );
    }

    #[test]
    fn test_failure_carries_message() {
        let response: Response<Payload> = NodeflowError::TableNotFound("t9".to_owned()).into();
        assert_eq!(
            serde_json::to_value(&response).expect("serializable"),
            json!({"success": false, "error": "DataFrame ID 't9' not found"})
        );
    }
}
