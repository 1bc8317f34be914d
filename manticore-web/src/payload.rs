//! 响应载荷
//!
//! 所有 Action 的成功响应与错误响应共用同一个 JSON 外形：
//!
//! ```json
//! {"statusCode": 200, "data": {"x": 1}}
//! {"statusCode": 400, "error": {"type": "BAD_REQUEST", "description": "..."}}
//! ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::exception::ErrorType;

/// Action 载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// 错误描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ActionPayload {
    pub fn new(status_code: u16, data: Option<Value>) -> Self {
        Self {
            status_code,
            data,
            error: None,
        }
    }

    /// 200 OK，携带数据
    pub fn ok(data: impl Into<Value>) -> Self {
        Self::new(200, Some(data.into()))
    }

    /// 序列化任意数据作为载荷
    pub fn with_data<T: Serialize>(data: &T, status_code: u16) -> serde_json::Result<Self> {
        Ok(Self::new(status_code, Some(serde_json::to_value(data)?)))
    }

    /// 无数据载荷，例如 204
    pub fn empty(status_code: u16) -> Self {
        Self::new(status_code, None)
    }

    pub fn error(status_code: u16, error: ErrorDetail) -> Self {
        Self {
            status_code,
            data: None,
            error: Some(error),
        }
    }

    /// 载荷状态码是否是合法的 HTTP 状态码
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code).ok()
    }
}

impl IntoResponse for ActionPayload {
    fn into_response(self) -> Response {
        let status = self.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_vec(&self) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode action payload");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

pub(crate) const APPLICATION_JSON: &str = "application/json";
