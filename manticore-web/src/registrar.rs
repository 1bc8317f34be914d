//! 路由注册
//!
//! [`RouteRegistrar`] 把 [`RouteDefinition`] 的中间件引用解析为实例，按
//! `[参数约束, 中间件..., 校验]` 的顺序组装，交给 [`RoutingTable`] 注册。只在启动期运行。

use axum::{
    extract::Request,
    http::Method,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::ActionDispatcher;
use crate::error::{ConfigError, ConfigResult};
use crate::exception::{HttpException, RequestContext};
use crate::middleware::{layer_fn, Middleware, MiddlewareRegistry};
use crate::route::{RouteDefinition, RouteIndex};

/// 路由处理函数
pub type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// 传输层路由表
pub trait RoutingTable {
    /// `chain[0]` 最先执行
    fn register(
        &mut self,
        method: Method,
        path: &str,
        chain: Vec<Arc<dyn Middleware>>,
        handler: RouteHandler,
    ) -> ConfigResult<()>;
}

/// 基于 `axum::Router` 的路由表，同一路径的不同方法会合并
///
/// 新路径先插入与 axum 相同的 `matchit` 匹配器，冲突在注册时以
/// [`ConfigError::ConflictingRoute`] 返回。
pub struct AxumRoutingTable {
    paths: Vec<String>,
    routes: HashMap<String, PathEntry>,
    matcher: matchit::Router<()>,
}

impl Default for AxumRoutingTable {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            routes: HashMap::new(),
            matcher: matchit::Router::new(),
        }
    }
}

struct PathEntry {
    methods: Vec<Method>,
    router: MethodRouter,
}

impl AxumRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(|entry| entry.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 已注册的方法，按注册顺序
    pub fn methods(&self, path: &str) -> &[Method] {
        self.routes
            .get(path)
            .map(|entry| entry.methods.as_slice())
            .unwrap_or_default()
    }

    pub fn into_router(mut self) -> Router {
        let mut router = Router::new();
        for path in self.paths {
            if let Some(entry) = self.routes.remove(&path) {
                let allowed = entry
                    .methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                router = router.route(&path, entry.router.fallback(move |request: Request| {
                    method_not_allowed(request, allowed)
                }));
            }
        }
        router
    }
}

/// 路径存在但方法未注册
async fn method_not_allowed(request: Request, allowed: String) -> Response {
    let context = RequestContext::new(request.method().clone(), request.uri().clone());
    HttpException::method_not_allowed(
        &context,
        format!("Method not allowed. Must be one of: {}", allowed),
    )
    .into_response()
}

impl RoutingTable for AxumRoutingTable {
    fn register(
        &mut self,
        method: Method,
        path: &str,
        chain: Vec<Arc<dyn Middleware>>,
        handler: RouteHandler,
    ) -> ConfigResult<()> {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| ConfigError::UnsupportedMethod(method.to_string()))?;

        if !path.starts_with('/') {
            return Err(ConfigError::InvalidState(format!(
                "route path `{}` must start with `/`",
                path
            )));
        }

        let mut route: MethodRouter = on(filter, move |request: Request| handler(request));
        // 最后应用的层在最外面
        for middleware in chain.into_iter().rev() {
            route = route.layer(from_fn(layer_fn(middleware)));
        }

        match self.routes.get_mut(path) {
            Some(entry) => {
                if entry.methods.contains(&method) {
                    return Err(ConfigError::InvalidState(format!(
                        "route {} {} registered twice",
                        method, path
                    )));
                }
                entry.methods.push(method);
                let existing = std::mem::replace(&mut entry.router, MethodRouter::new());
                entry.router = existing.merge(route);
            }
            None => {
                self.matcher
                    .insert(path, ())
                    .map_err(|e| ConfigError::ConflictingRoute {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?;
                self.paths.push(path.to_string());
                self.routes.insert(
                    path.to_string(),
                    PathEntry {
                        methods: vec![method],
                        router: route,
                    },
                );
            }
        }

        Ok(())
    }
}

/// 路由注册器
pub struct RouteRegistrar {
    middlewares: MiddlewareRegistry,
    dispatcher: Arc<ActionDispatcher>,
}

impl RouteRegistrar {
    pub fn new(middlewares: MiddlewareRegistry, dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            middlewares,
            dispatcher,
        }
    }

    /// 按给定顺序注册，返回注册的路由数量
    pub fn register(
        &self,
        definitions: &[RouteDefinition],
        table: &mut dyn RoutingTable,
    ) -> ConfigResult<usize> {
        let mut index = RouteIndex::new();

        for definition in definitions {
            index.insert(&definition.method, &definition.full_path, definition.controller)?;

            let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
            if let Some(constraints) = &definition.constraints {
                chain.push(Arc::clone(constraints) as Arc<dyn Middleware>);
            }
            for reference in &definition.middlewares {
                chain.push(self.middlewares.resolve(reference)?);
            }

            if let Some(validation) = &definition.validation {
                chain.push(Arc::clone(validation) as Arc<dyn Middleware>);
            }

            tracing::debug!(
                method = %definition.method,
                path = %definition.full_path,
                chain = ?chain.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
                "Registering route"
            );

            let handler = self.dispatcher.handler(Arc::clone(&definition.action));
            table.register(
                definition.method.clone(),
                &definition.full_path,
                chain,
                handler,
            )?;
        }

        tracing::info!(routes = definitions.len(), "✅ Routes registered");
        Ok(definitions.len())
    }
}
