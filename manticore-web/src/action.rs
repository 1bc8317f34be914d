//! Action 分发协议
//!
//! 每个 Action 接收 [`ActionContext`]，返回：
//!
//! - `ActionOutcome::Ready(payload)` - 立即完成
//! - `ActionOutcome::Pending(deferred)` - 延迟结果，分发器在此处挂起等待
//!
//! 失败时，实现了 [`HttpSpecialized`](crate::exception::HttpSpecialized) 的条件
//! 由分发器调用 `wire` 转换为 [`HttpException`]，其余故障以 [`ServerFault`] 上抛。

use axum::{
    extract::{FromRequestParts, Path, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::exception::{
    ActionError, ActionResult, HttpCondition, HttpException, MissingArgument, RequestContext,
    ServerFault,
};
use crate::payload::ActionPayload;
use crate::registrar::RouteHandler;
use crate::validation::DEFAULT_MAX_BODY_BYTES;

/// 路径参数
pub type PathArgs = HashMap<String, String>;

/// Action 执行契约
pub trait Action: Send + Sync + 'static {
    fn action(&self, ctx: ActionContext) -> ActionResult<ActionOutcome>;
}

impl<F> Action for F
where
    F: Fn(ActionContext) -> ActionResult<ActionOutcome> + Send + Sync + 'static,
{
    fn action(&self, ctx: ActionContext) -> ActionResult<ActionOutcome> {
        self(ctx)
    }
}

/// Action 的返回值
pub enum ActionOutcome {
    Ready(ActionPayload),
    Pending(Deferred),
}

impl ActionOutcome {
    /// 以 `status_code` 返回序列化后的数据
    pub fn respond_with_data<T: Serialize>(data: &T, status_code: u16) -> ActionResult<Self> {
        Ok(ActionOutcome::Ready(ActionPayload::with_data(data, status_code)?))
    }

    /// 包装一个异步结果
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = ActionResult<ActionPayload>> + Send + 'static,
    {
        ActionOutcome::Pending(Deferred::new(future))
    }
}

impl From<ActionPayload> for ActionOutcome {
    fn from(payload: ActionPayload) -> Self {
        ActionOutcome::Ready(payload)
    }
}

impl From<Deferred> for ActionOutcome {
    fn from(deferred: Deferred) -> Self {
        ActionOutcome::Pending(deferred)
    }
}

/// 尚未完成的 Action 结果
pub struct Deferred(BoxFuture<'static, ActionResult<ActionPayload>>);

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ActionResult<ActionPayload>> + Send + 'static,
    {
        Deferred(Box::pin(future))
    }

    /// 由 oneshot 通道另一端结算；发送端被丢弃视为故障
    pub fn from_receiver(receiver: oneshot::Receiver<ActionResult<ActionPayload>>) -> Self {
        Deferred::new(async move {
            receiver.await.map_err(|_| {
                ActionError::fault(anyhow::anyhow!(
                    "Deferred result was dropped before it settled"
                ))
            })?
        })
    }
}

impl Future for Deferred {
    type Output = ActionResult<ActionPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

/// 单次请求的 Action 上下文
pub struct ActionContext {
    request: Request,
    args: PathArgs,
    context: RequestContext,
    body_limit: usize,
}

impl ActionContext {
    pub fn new(request: Request, args: PathArgs) -> Self {
        let context = RequestContext {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        };
        Self {
            request,
            args,
            context,
            body_limit: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// 设置 [`json`](Self::json) 读取请求体的字节上限
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_context(&self) -> &RequestContext {
        &self.context
    }

    pub fn args(&self) -> &PathArgs {
        &self.args
    }

    /// 读取必需的路径参数
    pub fn resolve_arg(&self, name: &str) -> ActionResult<&str> {
        self.args
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| MissingArgument { name: name.to_string() }.into())
    }

    /// 读取并解析路径参数
    pub fn parse_arg<T: FromStr>(&self, name: &str) -> ActionResult<T> {
        self.resolve_arg(name)?
            .parse()
            .map_err(|_| HttpCondition::bad_request(format!("Invalid argument `{}`.", name)).into())
    }

    /// 以 JSON 读取请求体；请求体只能读取一次
    ///
    /// 超过上限时返回 413 条件
    pub async fn json<T: DeserializeOwned>(&mut self) -> ActionResult<T> {
        let body = std::mem::take(self.request.body_mut());
        let mut stream = body.into_data_stream();
        let mut bytes = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| HttpCondition::bad_request(format!("Failed to read body: {}", e)))?;
            if bytes.len() + chunk.len() > self.body_limit {
                return Err(HttpCondition::new(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("Request body exceeds {} bytes.", self.body_limit),
                )
                .into());
            }
            bytes.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| HttpCondition::bad_request(format!("Malformed JSON body: {}", e)).into())
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}

/// 分发失败
#[derive(Debug)]
pub enum DispatchError {
    /// 已接线的传输层错误
    Wired(HttpException),
    /// 未接线的故障
    Unwired(ServerFault),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::Wired(exception) => exception.into_response(),
            DispatchError::Unwired(fault) => fault.into_response(),
        }
    }
}

/// Action 分发器
#[derive(Debug, Clone, Copy)]
pub struct ActionDispatcher {
    body_limit: usize,
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Action 通过 `ActionContext::json` 读取请求体时的字节上限
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub async fn dispatch(
        &self,
        action: &dyn Action,
        request: Request,
        args: PathArgs,
    ) -> Result<Response, DispatchError> {
        let ctx = ActionContext::new(request, args).with_body_limit(self.body_limit);
        let context = ctx.request_context().clone();

        let payload = match action.action(ctx) {
            Ok(ActionOutcome::Ready(payload)) => payload,
            Ok(ActionOutcome::Pending(deferred)) => {
                tracing::trace!(path = context.path(), "Awaiting deferred action result");
                deferred.await.map_err(|e| self.fail(&context, e))?
            }
            Err(e) => return Err(self.fail(&context, e)),
        };

        if payload.status().is_none() {
            return Err(DispatchError::Unwired(ServerFault::new(
                &context,
                anyhow::anyhow!("Action returned invalid status code {}", payload.status_code),
            )));
        }

        Ok(payload.into_response())
    }

    fn fail(&self, context: &RequestContext, error: ActionError) -> DispatchError {
        match error {
            ActionError::Specialized(condition) => {
                let exception = condition.wire(context);
                tracing::debug!(
                    status = %exception.status.as_u16(),
                    path = context.path(),
                    condition = %condition,
                    "Action condition wired"
                );
                DispatchError::Wired(exception)
            }
            ActionError::Fault(error) => {
                tracing::error!(
                    method = %context.method,
                    path = context.path(),
                    error = %error,
                    "Action failed with an unwired fault"
                );
                DispatchError::Unwired(ServerFault::new(context, error))
            }
        }
    }

    /// 为 Action 生成路由处理函数：提取路径参数并分发
    pub fn handler(self: &Arc<Self>, action: Arc<dyn Action>) -> RouteHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |request: Request| -> BoxFuture<'static, Response> {
            let dispatcher = Arc::clone(&dispatcher);
            let action = Arc::clone(&action);
            Box::pin(async move {
                let (mut parts, body) = request.into_parts();
                let args = match Path::<PathArgs>::from_request_parts(&mut parts, &()).await {
                    Ok(Path(args)) => args,
                    Err(_) => PathArgs::new(),
                };
                let request = Request::from_parts(parts, body);

                match dispatcher.dispatch(action.as_ref(), request, args).await {
                    Ok(response) => response,
                    Err(e) => e.into_response(),
                }
            })
        })
    }
}

#[cfg(test)]
pub(crate) fn empty_request(method: axum::http::Method, uri: &str) -> Request {
    let mut request = Request::new(axum::body::Body::empty());
    *request.method_mut() = method;
    *request.uri_mut() = uri.parse().unwrap_or_default();
    request
}
