//! 全局错误处理中间件
//!
//! - [`HttpErrorHandler`]：统一渲染 [`HttpException`] / [`ServerFault`]，并把
//!   axum 自身产生的 404/405 响应转换为统一错误载荷
//! - [`ShutdownHandler`]：最外层，捕获处理函数 panic 并返回 500

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::exception::{
    ErrorType, HttpException, RequestContext, ServerFault, GENERIC_FAULT_DESCRIPTION,
};
use crate::middleware::Middleware;
use crate::payload::{ActionPayload, ErrorDetail, APPLICATION_JSON};

pub const ERROR_HANDLER: &str = "error-handler";
pub const SHUTDOWN_HANDLER: &str = "shutdown-handler";

/// 错误渲染中间件
#[derive(Debug, Clone, Copy)]
pub struct HttpErrorHandler {
    /// 是否在 500 响应中暴露错误详情
    pub display_error_details: bool,
    pub log_errors: bool,
    /// 日志中是否包含完整错误链
    pub log_error_details: bool,
}

impl Default for HttpErrorHandler {
    fn default() -> Self {
        Self {
            display_error_details: false,
            log_errors: true,
            log_error_details: false,
        }
    }
}

impl HttpErrorHandler {
    pub fn new(display_error_details: bool, log_errors: bool, log_error_details: bool) -> Self {
        Self {
            display_error_details,
            log_errors,
            log_error_details,
        }
    }

    fn render(&self, context: &RequestContext, response: Response) -> Response {
        if let Some(fault) = response.extensions().get::<Arc<ServerFault>>().cloned() {
            if self.log_errors {
                if self.log_error_details {
                    tracing::error!(
                        method = %fault.method,
                        path = %fault.path,
                        error = ?fault.error,
                        "Unhandled server fault"
                    );
                } else {
                    tracing::error!(
                        method = %fault.method,
                        path = %fault.path,
                        error = %fault.error,
                        "Unhandled server fault"
                    );
                }
            }
            return replace_payload(response, fault.to_payload(self.display_error_details));
        }

        if let Some(exception) = response.extensions().get::<Arc<HttpException>>().cloned() {
            if self.log_errors {
                if self.log_error_details {
                    tracing::warn!(
                        status = %exception.status.as_u16(),
                        path = %exception.path,
                        message = %exception.message,
                        details = ?exception.details,
                        "Request failed"
                    );
                } else {
                    tracing::warn!(
                        status = %exception.status.as_u16(),
                        path = %exception.path,
                        message = %exception.message,
                        "Request failed"
                    );
                }
            }
            return replace_payload(response, exception.to_payload());
        }

        if is_json(&response) {
            return response;
        }

        // axum 路由层直接生成的 404 / 405，此时 Allow 头尚未写入
        let exception = match response.status() {
            StatusCode::NOT_FOUND => {
                HttpException::not_found(context, "Not found.").with_type(ErrorType::ResourceNotFound)
            }
            StatusCode::METHOD_NOT_ALLOWED => {
                HttpException::method_not_allowed(context, "Method not allowed.")
            }
            _ => return response,
        };

        if self.log_errors {
            tracing::debug!(
                status = %exception.status.as_u16(),
                method = %context.method,
                path = context.path(),
                "Transport error rendered"
            );
        }
        replace_payload(response, exception.to_payload())
    }
}

#[async_trait]
impl Middleware for HttpErrorHandler {
    fn name(&self) -> &str {
        ERROR_HANDLER
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let context = RequestContext::new(request.method().clone(), request.uri().clone());
        let response = next.run(request).await;
        self.render(&context, response)
    }
}

/// 用新的载荷替换响应体，保留原响应的头与 Extension
fn replace_payload(response: Response, payload: ActionPayload) -> Response {
    let (mut parts, _) = response.into_parts();
    let (rendered, body) = payload.into_response().into_parts();

    parts.status = rendered.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    Response::from_parts(parts, body)
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(APPLICATION_JSON))
}

/// panic 捕获中间件
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownHandler {
    pub display_error_details: bool,
}

impl ShutdownHandler {
    pub fn new(display_error_details: bool) -> Self {
        Self {
            display_error_details,
        }
    }
}

#[async_trait]
impl Middleware for ShutdownHandler {
    fn name(&self) -> &str {
        SHUTDOWN_HANDLER
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(method = %method, path = %path, panic = %message, "Request handler panicked");

                let description = if self.display_error_details {
                    message
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
                .into_response()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
