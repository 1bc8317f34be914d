//! 应用构建器
//!
//! [`AppBuilder`] 把元数据来源、中间件注册表与配置组装成一个 `axum::Router`：
//!
//! 1. 分组解析 + 路由构建（[`RouteFactory`]）
//! 2. 路由注册（[`RouteRegistrar`]），未匹配路径返回 404 错误载荷
//! 3. 全局中间件，由内向外：追加的前置中间件、错误处理、panic 捕获、CORS
//!
//! 任何配置错误都在 `build` 时返回，不会进入请求处理阶段。

use axum::{
    extract::Request,
    middleware::from_fn,
    response::{IntoResponse, Response},
    Router,
};
use manticore_core::{constants, Environment};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::action::ActionDispatcher;
use crate::controller::{MetadataSource, StaticMetadata};
use crate::error::{ConfigError, ConfigResult};
use crate::error_handler::{HttpErrorHandler, ShutdownHandler};
use crate::exception::{HttpException, RequestContext};
use crate::group::GroupResolver;
use crate::group_cache::GroupCache;
use crate::middleware::{layer_fn, Middleware, MiddlewareRef, MiddlewareRegistry, REQUEST_LOGGING};
use crate::registrar::{AxumRoutingTable, RouteRegistrar};
use crate::route::RouteFactory;
use crate::server::ServerProperties;
use crate::validation::{ValidationConfig, ValidationMiddlewareFactory};

/// 应用设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub server: ServerProperties,
    /// 500 响应中是否展示错误详情
    pub display_error_details: bool,
    pub log_errors: bool,
    pub log_error_details: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server: ServerProperties::default(),
            display_error_details: false,
            log_errors: true,
            log_error_details: false,
        }
    }
}

impl AppSettings {
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            server: ServerProperties::from_environment(env),
            display_error_details: env.get_bool_or(constants::APP_DISPLAY_ERROR_DETAILS, false),
            log_errors: env.get_bool_or(constants::APP_LOG_ERRORS, true),
            log_error_details: env.get_bool_or(constants::APP_LOG_ERROR_DETAILS, false),
        }
    }
}

pub struct AppBuilder {
    metadata: Arc<dyn MetadataSource>,
    settings: AppSettings,
    middlewares: MiddlewareRegistry,
    pre_middlewares: Vec<MiddlewareRef>,
    validation: ValidationConfig,
    error_handler: bool,
    shutdown_handler: bool,
}

impl AppBuilder {
    pub fn new(metadata: Arc<dyn MetadataSource>, settings: AppSettings) -> Self {
        Self {
            metadata,
            settings,
            middlewares: MiddlewareRegistry::with_defaults(),
            pre_middlewares: Vec::new(),
            validation: ValidationConfig::default(),
            error_handler: true,
            shutdown_handler: true,
        }
    }

    /// 使用 `#[derive(RouteGroup)]` / `#[derive(ActionRoute)]` 注册的元数据
    pub fn from_inventory(settings: AppSettings) -> ConfigResult<Self> {
        Ok(Self::new(Arc::new(StaticMetadata::from_inventory()?), settings))
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// 追加全局前置中间件，按追加顺序在路由匹配之前执行
    pub fn append_middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.pre_middlewares.push(middleware.into());
        self
    }

    /// 注册命名中间件，供分组 / Action 按名称引用
    pub fn register_middleware<M: Middleware + 'static>(
        mut self,
        name: impl Into<String>,
        middleware: M,
    ) -> Self {
        self.middlewares.register(name, middleware);
        self
    }

    pub fn register_middleware_arc(
        mut self,
        name: impl Into<String>,
        middleware: Arc<dyn Middleware>,
    ) -> Self {
        self.middlewares.register_arc(name, middleware);
        self
    }

    /// 关闭错误处理时 panic 捕获一并关闭
    pub fn use_default_error_handler(mut self, enabled: bool) -> Self {
        self.error_handler = enabled;
        if !enabled {
            self.shutdown_handler = false;
        }
        self
    }

    /// panic 捕获依赖错误处理中间件
    pub fn use_default_shutdown_handler(mut self, enabled: bool) -> ConfigResult<Self> {
        if enabled && !self.error_handler {
            return Err(ConfigError::InvalidState(
                "the shutdown handler requires the default error handler".to_string(),
            ));
        }
        self.shutdown_handler = enabled;
        Ok(self)
    }

    pub fn with_validation_config(mut self, config: ValidationConfig) -> Self {
        self.validation = config;
        self
    }

    pub fn build(self) -> ConfigResult<Router> {
        tracing::info!("🔍 Resolving route groups...");

        let cache = Arc::new(GroupCache::new(GroupResolver::new(Arc::clone(&self.metadata))));
        let dispatcher = ActionDispatcher::new().with_body_limit(self.validation.max_body_bytes);
        let validation = ValidationMiddlewareFactory::new(Arc::new(self.validation));
        let mut factory = RouteFactory::new(Arc::clone(&cache), validation);
        let routes = factory.build_all(self.metadata.as_ref())?;

        let registrar = RouteRegistrar::new(self.middlewares.clone(), Arc::new(dispatcher));
        let mut table = AxumRoutingTable::new();
        let count = registrar.register(&routes, &mut table)?;

        let mut router = table.into_router().fallback(not_found);

        let mut pre = Vec::with_capacity(self.pre_middlewares.len() + 1);
        if self.settings.server.enable_request_logging {
            pre.push(self.middlewares.resolve(&MiddlewareRef::named(REQUEST_LOGGING))?);
        }
        for reference in &self.pre_middlewares {
            pre.push(self.middlewares.resolve(reference)?);
        }
        for middleware in pre.into_iter().rev() {
            router = router.layer(from_fn(layer_fn(middleware)));
        }

        if self.error_handler {
            let handler = HttpErrorHandler::new(
                self.settings.display_error_details,
                self.settings.log_errors,
                self.settings.log_error_details,
            );
            router = router.layer(from_fn(layer_fn(Arc::new(handler))));

            if self.shutdown_handler {
                let shutdown = ShutdownHandler::new(self.settings.display_error_details);
                router = router.layer(from_fn(layer_fn(Arc::new(shutdown))));
            }
        }

        if self.settings.server.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        tracing::info!(
            routes = count,
            groups = cache.len(),
            error_handler = self.error_handler,
            shutdown_handler = self.error_handler && self.shutdown_handler,
            "✅ Application built"
        );

        Ok(router)
    }
}

async fn not_found(request: Request) -> Response {
    let context = RequestContext::new(request.method().clone(), request.uri().clone());
    HttpException::not_found(&context, "Not found.").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionContext, ActionOutcome};
    use crate::controller::ActionMetadata;
    use crate::exception::{ActionResult, GENERIC_FAULT_DESCRIPTION};
    use crate::group::GroupDeclaration;
    use crate::middleware::Middleware;
    use crate::payload::ActionPayload;
    use crate::validation::{FieldRule, ValidationSchema};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, HeaderValue, Method, StatusCode},
        middleware::Next,
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Api;
    struct V1;
    struct Users;
    struct Hidden;
    struct Health;

    /// 把自身名称追加到 `x-trace` 请求头
    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, mut request: Request, next: Next) -> Response {
            let trace = match request.headers().get("x-trace").and_then(|v| v.to_str().ok()) {
                Some(prev) => format!("{},{}", prev, self.0),
                None => self.0.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&trace) {
                request.headers_mut().insert("x-trace", value);
            }
            next.run(request).await
        }
    }

    fn trace(ctx: ActionContext) -> ActionResult<ActionOutcome> {
        let trace = ctx
            .request()
            .headers()
            .get("x-trace")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        ActionOutcome::respond_with_data(&json!({ "trace": trace }), 200)
    }

    fn show_user(ctx: ActionContext) -> ActionResult<ActionOutcome> {
        let id: u64 = ctx.parse_arg("id")?;
        ActionOutcome::respond_with_data(&json!({ "id": id }), 200)
    }

    fn needs_id(ctx: ActionContext) -> ActionResult<ActionOutcome> {
        let id = ctx.resolve_arg("id")?;
        ActionOutcome::respond_with_data(&json!({ "id": id }), 200)
    }

    fn deferred(_ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Ok(ActionOutcome::pending(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(ActionPayload::ok(json!({ "x": 1 })))
        }))
    }

    fn ready(_ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Ok(ActionPayload::ok(json!({ "x": 1 })).into())
    }

    fn create_user(mut ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Ok(ActionOutcome::pending(async move {
            let body: Value = ctx.json().await?;
            Ok(ActionPayload::new(201, Some(body)))
        }))
    }

    fn broken(_ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Err(anyhow::anyhow!("database exploded").into())
    }

    fn panics(_ctx: ActionContext) -> ActionResult<ActionOutcome> {
        panic!("kaboom")
    }

    fn metadata() -> StaticMetadata {
        let schema = ValidationSchema::new()
            .field("email", [FieldRule::Required, FieldRule::Email])
            .field("name", [FieldRule::Required, FieldRule::String]);

        StaticMetadata::new()
            .with_group::<Api>(GroupDeclaration::new("api/").middleware("a"))
            .with_group::<V1>(GroupDeclaration::new("v1").parent::<Api>().middleware("b"))
            .with_group::<Users>(GroupDeclaration::new("/users/").parent::<V1>().middleware("c"))
            .with_group::<Hidden>(GroupDeclaration::new("hidden").parent::<Api>().skip(true))
            .action(ActionMetadata::new::<Users>(Method::GET, "/trace", trace).with_middleware("d"))
            .action(ActionMetadata::new::<Users>(Method::GET, "/:id", show_user))
            .action(ActionMetadata::new::<Users>(Method::POST, "/", create_user).with_schema(schema))
            .action(ActionMetadata::new::<Hidden>(Method::GET, "/", ready))
            .action(ActionMetadata::new::<Health>(Method::GET, "/ready", ready))
            .action(ActionMetadata::new::<Health>(Method::GET, "/deferred", deferred))
            .action(ActionMetadata::new::<Health>(Method::GET, "/needs-id", needs_id))
            .action(ActionMetadata::new::<Health>(Method::GET, "/broken", broken))
            .action(ActionMetadata::new::<Health>(Method::GET, "/panics", panics))
    }

    fn builder_with(metadata: StaticMetadata, settings: AppSettings) -> AppBuilder {
        AppBuilder::new(Arc::new(metadata), settings)
            .register_middleware("a", Tag("a"))
            .register_middleware("b", Tag("b"))
            .register_middleware("c", Tag("c"))
            .register_middleware("d", Tag("d"))
    }

    fn app() -> Router {
        builder_with(metadata(), AppSettings::default())
            .append_middleware(MiddlewareRef::instance(Tag("pre")))
            .build()
            .unwrap()
    }

    async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        router.oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_middleware_runs_global_then_ancestor_first() {
        let response = send(app(), Method::GET, "/api/v1/users/trace", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["trace"], "pre,a,b,c,d");
    }

    #[tokio::test]
    async fn test_ready_payload_wire_format() {
        let response = send(app(), Method::GET, "/ready", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(response).await, br#"{"statusCode":200,"data":{"x":1}}"#);
    }

    #[tokio::test]
    async fn test_deferred_payload_matches_ready() {
        let ready = send(app(), Method::GET, "/ready", None).await;
        let deferred = send(app(), Method::GET, "/deferred", None).await;
        assert_eq!(ready.status(), deferred.status());
        assert_eq!(body_bytes(ready).await, body_bytes(deferred).await);
    }

    #[tokio::test]
    async fn test_path_argument_reaches_action() {
        let response = send(app(), Method::GET, "/api/v1/users/42", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["id"], 42);
    }

    #[tokio::test]
    async fn test_missing_argument_is_bad_request() {
        let response = send(app(), Method::GET, "/needs-id", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "BAD_REQUEST");
        assert!(body["error"]["description"].as_str().unwrap().contains("id"));
    }

    #[tokio::test]
    async fn test_unparsable_argument_is_bad_request() {
        let response = send(app(), Method::GET, "/api/v1/users/abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_skipped_group_is_not_routed() {
        let response = send(app(), Method::GET, "/api/hidden", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["type"], "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found_payload() {
        let response = send(app(), Method::GET, "/nowhere", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({
                "statusCode": 404,
                "error": {"type": "RESOURCE_NOT_FOUND", "description": "Not found."}
            })
        );
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_allowed_payload() {
        let response = send(app(), Method::DELETE, "/ready", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body_json(response).await,
            json!({
                "statusCode": 405,
                "error": {
                    "type": "NOT_ALLOWED",
                    "description": "Method not allowed. Must be one of: GET"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_param_pattern_is_enforced() {
        let metadata = StaticMetadata::new()
            .action(ActionMetadata::new::<Health>(Method::GET, "/orders/{id:[0-9]+}", ready));
        let router = builder_with(metadata, AppSettings::default()).build().unwrap();

        let response = send(router.clone(), Method::GET, "/orders/7", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(router, Method::GET, "/orders/seven", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["type"], "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_action_body_limit_follows_validation_config() {
        let metadata = StaticMetadata::new()
            .action(ActionMetadata::new::<Health>(Method::POST, "/echo", create_user));
        let router = builder_with(metadata, AppSettings::default())
            .with_validation_config(ValidationConfig::new().max_body_bytes(16))
            .build()
            .unwrap();

        let response = send(router.clone(), Method::POST, "/echo", Some(json!({"a": 1}))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let large = json!({"name": "a value well past sixteen bytes"});
        let response = send(router, Method::POST, "/echo", Some(large)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_body() {
        let response = send(
            app(),
            Method::POST,
            "/api/v1/users",
            Some(json!({"email": "not-an-email"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["email"][0], "email must be a valid email address");
        assert_eq!(body["error"]["details"]["name"][0], "name is required");
    }

    #[tokio::test]
    async fn test_validation_passes_body_through() {
        let user = json!({"email": "ada@example.com", "name": "Ada"});
        let response = send(app(), Method::POST, "/api/v1/users", Some(user.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["data"], user);
    }

    #[tokio::test]
    async fn test_fault_description_is_gated() {
        let response = send(app(), Method::GET, "/broken", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"]["description"],
            GENERIC_FAULT_DESCRIPTION
        );

        let settings = AppSettings {
            display_error_details: true,
            ..AppSettings::default()
        };
        let router = builder_with(metadata(), settings).build().unwrap();
        let response = send(router, Method::GET, "/broken", None).await;
        assert_eq!(body_json(response).await["error"]["description"], "database exploded");
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let response = send(app(), Method::GET, "/panics", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["type"], "SERVER_ERROR");
    }

    #[test]
    fn test_duplicate_route_fails_build() {
        let metadata = metadata().action(ActionMetadata::new::<V1>(Method::GET, "/users/:uid", ready));
        let err = builder_with(metadata, AppSettings::default()).build().unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousRoute { .. }));
    }

    #[test]
    fn test_conflicting_patterns_fail_build() {
        let metadata = StaticMetadata::new()
            .action(ActionMetadata::new::<Health>(Method::GET, "/files/:id", ready))
            .action(ActionMetadata::new::<Health>(Method::GET, "/files/*rest", ready));
        let err = builder_with(metadata, AppSettings::default()).build().unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingRoute { .. }));
    }

    #[test]
    fn test_unknown_middleware_fails_build() {
        let err = AppBuilder::new(Arc::new(metadata()), AppSettings::default())
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownMiddleware("a".into()));
    }

    #[test]
    fn test_cyclic_group_fails_build() {
        let metadata = StaticMetadata::new()
            .with_group::<Api>(GroupDeclaration::new("api").parent::<V1>())
            .with_group::<V1>(GroupDeclaration::new("v1").parent::<Api>())
            .action(ActionMetadata::new::<V1>(Method::GET, "/", ready));
        let err = builder_with(metadata, AppSettings::default()).build().unwrap_err();
        assert!(matches!(err, ConfigError::CyclicGroup { .. }));
    }

    #[test]
    fn test_shutdown_handler_requires_error_handler() {
        let builder = AppBuilder::new(Arc::new(StaticMetadata::new()), AppSettings::default())
            .use_default_error_handler(false);
        assert!(matches!(
            builder.use_default_shutdown_handler(true),
            Err(ConfigError::InvalidState(_))
        ));

        let builder = AppBuilder::new(Arc::new(StaticMetadata::new()), AppSettings::default());
        assert!(builder.use_default_shutdown_handler(false).is_ok());
    }

    #[tokio::test]
    async fn test_without_error_handler_faults_use_generic_payload() {
        let router = builder_with(metadata(), AppSettings::default())
            .use_default_error_handler(false)
            .build()
            .unwrap();
        let response = send(router, Method::GET, "/broken", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["type"], "SERVER_ERROR");
    }

    #[test]
    fn test_settings_from_environment() {
        use manticore_core::{ConfigValue, MapPropertySource};

        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(constants::APP_DISPLAY_ERROR_DETAILS, ConfigValue::Bool(true))
                .with_property(constants::SERVER_ENABLE_REQUEST_LOGGING, ConfigValue::Bool(false)),
        ));

        let settings = AppSettings::from_environment(&env);
        assert!(settings.display_error_details);
        assert!(settings.log_errors);
        assert!(!settings.server.enable_request_logging);
    }
}
