//! 中间件模块
//!
//! 路由级中间件统一实现 [`Middleware`] trait。分组和 Action 声明中间件时使用
//! [`MiddlewareRef`]：按名称引用（注册表解析）或直接持有实例。

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ConfigError, ConfigResult};

/// 路由中间件
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// 处理请求；调用 `next.run(request)` 继续执行内层链
    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// 中间件引用
#[derive(Clone)]
pub enum MiddlewareRef {
    /// 按名称引用，注册时通过 [`MiddlewareRegistry`] 解析
    Named(Cow<'static, str>),

    /// 直接持有中间件实例
    Instance(Arc<dyn Middleware>),
}

impl MiddlewareRef {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        MiddlewareRef::Named(name.into())
    }

    pub fn instance<M: Middleware + 'static>(middleware: M) -> Self {
        MiddlewareRef::Instance(Arc::new(middleware))
    }

    pub fn name(&self) -> &str {
        match self {
            MiddlewareRef::Named(name) => &**name,
            MiddlewareRef::Instance(m) => m.name(),
        }
    }
}

impl PartialEq for MiddlewareRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MiddlewareRef::Named(a), MiddlewareRef::Named(b)) => a == b,
            (MiddlewareRef::Instance(a), MiddlewareRef::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for MiddlewareRef {}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareRef::Named(name) => write!(f, "Named({})", name),
            MiddlewareRef::Instance(m) => write!(f, "Instance({})", m.name()),
        }
    }
}

impl From<&'static str> for MiddlewareRef {
    fn from(name: &'static str) -> Self {
        MiddlewareRef::Named(Cow::Borrowed(name))
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        MiddlewareRef::Named(Cow::Owned(name))
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        MiddlewareRef::Instance(middleware)
    }
}

/// 声明处的中间件形态：空 / 单个 / 有序列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MiddlewareSpec {
    #[default]
    None,
    One(MiddlewareRef),
    Many(Vec<MiddlewareRef>),
}

impl MiddlewareSpec {
    /// 归一化为有序列表
    pub fn into_refs(self) -> Vec<MiddlewareRef> {
        match self {
            MiddlewareSpec::None => Vec::new(),
            MiddlewareSpec::One(m) => vec![m],
            MiddlewareSpec::Many(list) => list,
        }
    }

    pub fn to_refs(&self) -> Vec<MiddlewareRef> {
        self.clone().into_refs()
    }
}

impl From<MiddlewareRef> for MiddlewareSpec {
    fn from(m: MiddlewareRef) -> Self {
        MiddlewareSpec::One(m)
    }
}

impl From<&'static str> for MiddlewareSpec {
    fn from(name: &'static str) -> Self {
        MiddlewareSpec::One(name.into())
    }
}

impl From<Vec<MiddlewareRef>> for MiddlewareSpec {
    fn from(list: Vec<MiddlewareRef>) -> Self {
        MiddlewareSpec::Many(list)
    }
}

impl From<&'static [&'static str]> for MiddlewareSpec {
    fn from(names: &'static [&'static str]) -> Self {
        match names {
            [] => MiddlewareSpec::None,
            [one] => MiddlewareSpec::One((*one).into()),
            many => MiddlewareSpec::Many(many.iter().map(|n| (*n).into()).collect()),
        }
    }
}

/// 命名中间件注册表
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    named: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含内置中间件：`request-logging`、`request-id`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(REQUEST_LOGGING, RequestLogging);
        registry.register(REQUEST_ID, RequestId);
        registry
    }

    pub fn register<M: Middleware + 'static>(&mut self, name: impl Into<String>, middleware: M) {
        self.register_arc(name, Arc::new(middleware));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        let name = name.into();
        if self.named.insert(name.clone(), middleware).is_some() {
            tracing::warn!(middleware = %name, "Named middleware replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    /// 解析引用；未注册的名称是配置错误
    pub fn resolve(&self, reference: &MiddlewareRef) -> ConfigResult<Arc<dyn Middleware>> {
        match reference {
            MiddlewareRef::Instance(m) => Ok(Arc::clone(m)),
            MiddlewareRef::Named(name) => self
                .named
                .get(&**name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownMiddleware(name.to_string())),
        }
    }
}

/// 把 [`Middleware`] 适配为 axum 的 `from_fn` 层
pub(crate) fn layer_fn(
    middleware: Arc<dyn Middleware>,
) -> impl Fn(Request, Next) -> futures_util::future::BoxFuture<'static, Response> + Clone + Send + Sync + 'static
{
    move |request: Request, next: Next| -> futures_util::future::BoxFuture<'static, Response> {
        let middleware = Arc::clone(&middleware);
        Box::pin(async move { middleware.handle(request, next).await })
    }
}

pub const REQUEST_LOGGING: &str = "request-logging";
pub const REQUEST_ID: &str = "request-id";

/// 请求日志中间件
pub struct RequestLogging;

#[async_trait]
impl Middleware for RequestLogging {
    fn name(&self) -> &str {
        REQUEST_LOGGING
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let start = Instant::now();

        let response = next.run(request).await;

        tracing::info!(
            method = %method,
            uri = %uri,
            status = %response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "Request completed"
        );

        response
    }
}

/// 请求 ID 中间件
///
/// 保留客户端传入的 `X-Request-ID`，否则生成 UUID v4
pub struct RequestId;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[async_trait]
impl Middleware for RequestId {
    fn name(&self) -> &str {
        REQUEST_ID
    }

    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let existing = request.headers().get(REQUEST_ID_HEADER).cloned();
        let request_id = match existing {
            Some(value) => value,
            None => {
                let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
                request
                    .headers_mut()
                    .insert(REQUEST_ID_HEADER, generated.clone());
                generated
            }
        };

        let mut response = next.run(request).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
        response
    }
}
