use serde::{Deserialize, Serialize};

use crate::utils::error_codes;

/// JSON envelope every route answers with. `code` is `0` on success and one
/// of [`error_codes`] otherwise.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResult<T: Serialize> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T: Serialize> ApiResult<T> {
    pub fn success(content: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            error_message: None,
            content: Some(content),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            error_message: Some(message.into()),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == error_codes::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_omit_content() {
        let result = ApiResult::<()>::error(error_codes::NOT_FOUND, "user u1 not found");
        assert!(!result.is_success());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({ "code": 1004, "error_message": "user u1 not found" })
        );
    }
}
