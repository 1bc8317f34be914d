//! HTTP 错误接线（wiring）
//!
//! Action 内部抛出的条件分两类：
//!
//! 1. **可特化条件** - 实现 [`HttpSpecialized`]，由分发器调用 `wire(request)`
//!    绑定到当前请求，得到带状态码与消息的 [`HttpException`]
//! 2. **未接线故障** - 普通的 `anyhow::Error`，原样上抛为 [`ServerFault`]（500）
//!
//! 两者都会以响应 Extension 的形式交给 `HttpErrorHandler` 统一渲染。

use axum::{
    http::{request::Parts, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::payload::{ActionPayload, ErrorDetail};

/// 错误类型标识，序列化为 `error.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    BadRequest,
    InsufficientPrivileges,
    NotAllowed,
    NotImplemented,
    ResourceNotFound,
    ServerError,
    Unauthenticated,
    ValidationError,
}

impl ErrorType {
    /// 根据状态码推断默认错误类型
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ErrorType::Unauthenticated,
            StatusCode::FORBIDDEN => ErrorType::InsufficientPrivileges,
            StatusCode::NOT_FOUND => ErrorType::ResourceNotFound,
            StatusCode::METHOD_NOT_ALLOWED => ErrorType::NotAllowed,
            StatusCode::UNPROCESSABLE_ENTITY => ErrorType::ValidationError,
            StatusCode::NOT_IMPLEMENTED => ErrorType::NotImplemented,
            s if s.is_client_error() => ErrorType::BadRequest,
            _ => ErrorType::ServerError,
        }
    }
}

/// 请求上下文快照（不含请求体），用于把错误绑定到请求
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// 可特化为 HTTP 错误的条件
///
/// # 示例
///
/// ```ignore
/// #[derive(Debug, thiserror::Error)]
/// #[error("user {0} not found")]
/// struct UserNotFound(u64);
///
/// impl HttpSpecialized for UserNotFound {
///     fn wire(&self, request: &RequestContext) -> HttpException {
///         HttpException::not_found(request, self.to_string())
///     }
/// }
/// ```
pub trait HttpSpecialized: std::fmt::Debug + std::fmt::Display + Send + Sync {
    fn wire(&self, request: &RequestContext) -> HttpException;
}

/// 已绑定到请求的传输层错误
#[derive(Error, Debug, Clone)]
#[error("{status} {method} {path}: {message}")]
pub struct HttpException {
    pub status: StatusCode,
    pub error_type: ErrorType,
    pub message: String,
    pub method: Method,
    pub path: String,
    pub details: Option<Value>,
}

impl HttpException {
    pub fn new(request: &RequestContext, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: ErrorType::from_status(status),
            message: message.into(),
            method: request.method.clone(),
            path: request.path().to_string(),
            details: None,
        }
    }

    pub fn bad_request(request: &RequestContext, message: impl Into<String>) -> Self {
        Self::new(request, StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(request: &RequestContext, message: impl Into<String>) -> Self {
        Self::new(request, StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(request: &RequestContext, message: impl Into<String>) -> Self {
        Self::new(request, StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(request: &RequestContext, message: impl Into<String>) -> Self {
        Self::new(request, StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(request: &RequestContext, message: impl Into<String>) -> Self {
        Self::new(request, StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 渲染为统一错误载荷
    pub fn to_payload(&self) -> ActionPayload {
        ActionPayload::error(
            self.status.as_u16(),
            ErrorDetail {
                error_type: self.error_type,
                description: self.message.clone(),
                details: self.details.clone(),
            },
        )
    }
}

/// 渲染错误载荷，并把异常本身放入响应 Extension，供错误处理中间件使用
impl IntoResponse for HttpException {
    fn into_response(self) -> Response {
        let mut response = self.to_payload().into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// `resolve_arg` 找不到路径参数
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not resolve argument `{name}`.")]
pub struct MissingArgument {
    pub name: String,
}

impl HttpSpecialized for MissingArgument {
    fn wire(&self, request: &RequestContext) -> HttpException {
        HttpException::bad_request(request, self.to_string())
    }
}

/// 通用的领域条件：固定状态码 + 消息
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct HttpCondition {
    pub status: StatusCode,
    pub message: String,
}

impl HttpCondition {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl HttpSpecialized for HttpCondition {
    fn wire(&self, request: &RequestContext) -> HttpException {
        HttpException::new(request, self.status, self.message.clone())
    }
}

/// 未接线的故障，在传输边界统一表现为 500
#[derive(Debug, Clone)]
pub struct ServerFault {
    pub error: Arc<anyhow::Error>,
    pub method: Method,
    pub path: String,
}

pub(crate) const GENERIC_FAULT_DESCRIPTION: &str =
    "An internal error has occurred while processing your request.";

impl ServerFault {
    pub fn new(request: &RequestContext, error: anyhow::Error) -> Self {
        Self {
            error: Arc::new(error),
            method: request.method.clone(),
            path: request.path().to_string(),
        }
    }

    /// `verbose` 为 true 时暴露错误链，否则使用通用描述
    pub fn to_payload(&self, verbose: bool) -> ActionPayload {
        let description = if verbose {
            format!("{:#}", self.error)
        } else {
            GENERIC_FAULT_DESCRIPTION.to_string()
        };
        ActionPayload::error(
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            ErrorDetail {
                error_type: ErrorType::ServerError,
                description,
                details: None,
            },
        )
    }
}

impl std::fmt::Display for ServerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {:#}", self.method, self.path, self.error)
    }
}

impl IntoResponse for ServerFault {
    fn into_response(self) -> Response {
        let mut response = self.to_payload(false).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// Action 执行失败的原因
#[derive(Error, Debug)]
pub enum ActionError {
    /// 可接线条件
    #[error("{0}")]
    Specialized(Box<dyn HttpSpecialized>),

    /// 未接线故障
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl ActionError {
    pub fn specialized(condition: impl HttpSpecialized + 'static) -> Self {
        ActionError::Specialized(Box::new(condition))
    }

    pub fn fault(error: impl Into<anyhow::Error>) -> Self {
        ActionError::Fault(error.into())
    }
}

impl From<MissingArgument> for ActionError {
    fn from(condition: MissingArgument) -> Self {
        ActionError::specialized(condition)
    }
}

impl From<HttpCondition> for ActionError {
    fn from(condition: HttpCondition) -> Self {
        ActionError::specialized(condition)
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::Fault(err.into())
    }
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;
