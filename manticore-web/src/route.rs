//! 路由构建
//!
//! [`RouteFactory`] 把分组解析结果与 Action 元数据合并为 [`RouteDefinition`]：
//!
//! - 完整路径 = `/` + 分组前缀 + Action 路径后缀
//! - 中间件 = 分组链（祖先在前）+ Action 自身声明 + 校验中间件（最后）
//! - 分组被 skip 的 Action 不生成路由
//! - `{name:pattern}` 参数改写为 `:name`，模式由 [`PathConstraints`] 在链首校验，
//!   不匹配时返回 404
//!
//! 相同 `(method, path)` 的路由在构建期即报错，参数名不参与比较
//! （`/users/:id` 与 `/users/:uid` 视为同一路由）。

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Request},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::{Action, PathArgs};
use crate::controller::{ActionMetadata, ControllerId, MetadataSource};
use crate::error::{ConfigError, ConfigResult};
use crate::exception::{ErrorType, HttpException, RequestContext};
use crate::group::join_segments;
use crate::group_cache::GroupCache;
use crate::middleware::{Middleware, MiddlewareRef};
use crate::validation::{ValidationMiddleware, ValidationMiddlewareFactory};

/// 可注册的路由
#[derive(Clone)]
pub struct RouteDefinition {
    pub controller: ControllerId,
    pub method: Method,
    pub full_path: String,
    /// 外层在前
    pub middlewares: Vec<MiddlewareRef>,
    /// 链上最先执行的参数约束
    pub constraints: Option<Arc<PathConstraints>>,
    /// 链上最后执行的校验中间件
    pub validation: Option<Arc<ValidationMiddleware>>,
    pub action: Arc<dyn Action>,
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("controller", &self.controller)
            .field("method", &self.method)
            .field("full_path", &self.full_path)
            .field("middlewares", &self.middlewares)
            .field("constrained", &self.constraints.is_some())
            .field("validated", &self.validation.is_some())
            .finish()
    }
}

/// 路由唯一性键：方法 + 路径形状
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub shape: String,
}

impl RouteKey {
    pub fn new(method: &Method, path: &str) -> Self {
        Self {
            method: method.clone(),
            shape: route_shape(path),
        }
    }
}

/// 抹去参数名后的路径形状，例如 `/users/:id` -> `/users/:`
pub fn route_shape(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment.starts_with(':') || (segment.starts_with('{') && segment.ends_with('}')) {
                ":"
            } else if segment.starts_with('*') {
                "*"
            } else {
                segment
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// `{name}` / `{name:pattern}` 形式的参数改写为 `:name`，并收集模式
fn normalize_params(path: &str) -> ConfigResult<(String, Vec<ParamConstraint>)> {
    let mut constraints = Vec::new();
    let mut segments = Vec::new();

    for segment in path.split('/') {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) => {
                let (name, pattern) = match inner.split_once(':') {
                    Some((name, pattern)) => (name.trim(), pattern.trim()),
                    None => (inner.trim(), ""),
                };
                if !pattern.is_empty() {
                    constraints.push(ParamConstraint::new(name, pattern)?);
                }
                segments.push(format!(":{}", name));
            }
            None => segments.push(segment.to_string()),
        }
    }

    Ok((segments.join("/"), constraints))
}

pub const PATH_CONSTRAINTS: &str = "path-constraints";

/// 单个路径参数的模式，按整段匹配
#[derive(Debug, Clone)]
pub struct ParamConstraint {
    pub name: String,
    pub pattern: Regex,
}

impl ParamConstraint {
    pub fn new(name: impl Into<String>, pattern: &str) -> ConfigResult<Self> {
        let name = name.into();
        let pattern = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            ConfigError::InvalidParamPattern {
                param: name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { name, pattern })
    }
}

/// 路径参数约束中间件
#[derive(Debug)]
pub struct PathConstraints {
    constraints: Vec<ParamConstraint>,
}

impl PathConstraints {
    pub fn new(constraints: Vec<ParamConstraint>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[ParamConstraint] {
        &self.constraints
    }

    /// 第一个不满足模式的参数名
    pub fn violation(&self, args: &PathArgs) -> Option<&str> {
        self.constraints
            .iter()
            .find(|c| args.get(&c.name).is_some_and(|v| !c.pattern.is_match(v)))
            .map(|c| c.name.as_str())
    }
}

#[async_trait]
impl Middleware for PathConstraints {
    fn name(&self) -> &str {
        PATH_CONSTRAINTS
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let (mut parts, body) = request.into_parts();
        let args = match Path::<PathArgs>::from_request_parts(&mut parts, &()).await {
            Ok(Path(args)) => args,
            Err(_) => PathArgs::new(),
        };

        if let Some(param) = self.violation(&args) {
            let context = RequestContext::from_parts(&parts);
            tracing::debug!(path = context.path(), param, "Path parameter rejected by pattern");
            return HttpException::not_found(&context, "Not found.")
                .with_type(ErrorType::ResourceNotFound)
                .into_response();
        }

        next.run(Request::from_parts(parts, body)).await
    }
}

/// 记录已登记的路由，检测重复
#[derive(Debug, Default)]
pub struct RouteIndex {
    seen: HashMap<RouteKey, ControllerId>,
}

impl RouteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        method: &Method,
        path: &str,
        controller: ControllerId,
    ) -> ConfigResult<()> {
        let key = RouteKey::new(method, path);
        if let Some(first) = self.seen.get(&key) {
            return Err(ConfigError::AmbiguousRoute {
                method: method.to_string(),
                path: path.to_string(),
                first: first.name(),
                second: controller.name(),
            });
        }
        self.seen.insert(key, controller);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// 路由工厂
pub struct RouteFactory {
    cache: Arc<GroupCache>,
    validation: ValidationMiddlewareFactory,
    index: RouteIndex,
}

impl RouteFactory {
    pub fn new(cache: Arc<GroupCache>, validation: ValidationMiddlewareFactory) -> Self {
        Self {
            cache,
            validation,
            index: RouteIndex::new(),
        }
    }

    /// 构建单个路由；分组被 skip 时返回 `None`
    pub fn build(&mut self, action: &ActionMetadata) -> ConfigResult<Option<RouteDefinition>> {
        let group = self.cache.get_or_resolve(&action.controller)?;

        if group.skip {
            tracing::debug!(
                controller = action.controller.name(),
                method = %action.method,
                path = %action.path,
                "Route skipped by group"
            );
            return Ok(None);
        }

        let (full_path, constraints) = normalize_params(&format!(
            "/{}",
            join_segments([group.base_path.as_str(), &*action.path])
        ))?;
        self.index.insert(&action.method, &full_path, action.controller)?;

        let mut middlewares = group.middlewares.clone();
        middlewares.extend(action.middleware.to_refs());

        let validation = match &action.schema {
            Some(schema) => Some(self.validation.create(schema)?),
            None => None,
        };

        tracing::debug!(
            controller = action.controller.short_name(),
            method = %action.method,
            path = %full_path,
            middlewares = middlewares.len(),
            validated = validation.is_some(),
            "Route built"
        );

        Ok(Some(RouteDefinition {
            controller: action.controller,
            method: action.method.clone(),
            full_path,
            middlewares,
            constraints: (!constraints.is_empty())
                .then(|| Arc::new(PathConstraints::new(constraints))),
            validation,
            action: Arc::clone(&action.action),
        }))
    }

    /// 按来源顺序构建所有控制器的所有 Action
    pub fn build_all(&mut self, source: &dyn MetadataSource) -> ConfigResult<Vec<RouteDefinition>> {
        let mut routes = Vec::new();
        for controller in source.controllers() {
            for action in source.actions(&controller) {
                if let Some(route) = self.build(&action)? {
                    routes.push(route);
                }
            }
        }
        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionContext, ActionOutcome};
    use crate::controller::StaticMetadata;
    use crate::exception::ActionResult;
    use crate::group::{GroupDeclaration, GroupResolver};
    use crate::payload::ActionPayload;
    use crate::validation::{FieldRule, ValidationSchema};

    struct Api;
    struct Users;
    struct Admin;
    struct Accounts;

    fn noop(_ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Ok(ActionPayload::empty(204).into())
    }

    fn groups() -> StaticMetadata {
        StaticMetadata::new()
            .with_group::<Api>(GroupDeclaration::new("api/").middleware("a"))
            .with_group::<Users>(GroupDeclaration::new("/users/").parent::<Api>().middleware("b"))
            .with_group::<Admin>(GroupDeclaration::new("admin").parent::<Api>().skip(true))
    }

    fn factory(metadata: StaticMetadata) -> (RouteFactory, Arc<StaticMetadata>) {
        let metadata = Arc::new(metadata);
        let cache = Arc::new(GroupCache::new(GroupResolver::new(metadata.clone())));
        (RouteFactory::new(cache, ValidationMiddlewareFactory::default()), metadata)
    }

    #[test]
    fn test_full_path_and_middleware_order() {
        let (mut factory, _) = factory(groups());
        let action = ActionMetadata::new::<Users>(Method::GET, "/:id", noop).with_middleware("c");

        let route = factory.build(&action).unwrap().unwrap();
        assert_eq!(route.full_path, "/api/users/:id");
        assert_eq!(
            route.middlewares,
            vec![
                MiddlewareRef::named("a"),
                MiddlewareRef::named("b"),
                MiddlewareRef::named("c"),
            ]
        );
        assert!(route.validation.is_none());
    }

    #[test]
    fn test_root_suffix_maps_to_group_path() {
        let (mut factory, _) = factory(groups());
        let route = factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/", noop))
            .unwrap()
            .unwrap();
        assert_eq!(route.full_path, "/api/users");

        let route = factory
            .build(&ActionMetadata::new::<Accounts>(Method::GET, "", noop))
            .unwrap()
            .unwrap();
        assert_eq!(route.full_path, "/");
    }

    #[test]
    fn test_skipped_group_produces_no_route() {
        let (mut factory, _) = factory(groups());
        let action = ActionMetadata::new::<Admin>(Method::GET, "/stats", noop);
        assert!(factory.build(&action).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_route_is_ambiguous() {
        let (mut factory, _) = factory(
            groups().with_group::<Accounts>(GroupDeclaration::new("api/users")),
        );
        factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/:id", noop))
            .unwrap();

        let err = factory
            .build(&ActionMetadata::new::<Accounts>(Method::GET, "/:uid", noop))
            .unwrap_err();
        match err {
            ConfigError::AmbiguousRoute { method, first, second, .. } => {
                assert_eq!(method, "GET");
                assert!(first.ends_with("Users"));
                assert!(second.ends_with("Accounts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_path_different_method_is_fine() {
        let (mut factory, _) = factory(groups());
        factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/", noop))
            .unwrap();
        assert!(factory
            .build(&ActionMetadata::new::<Users>(Method::POST, "/", noop))
            .is_ok());
    }

    #[test]
    fn test_brace_params_are_rewritten() {
        let (mut factory, _) = factory(groups());
        let route = factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/{id}/posts/{slug:[a-z]+}", noop))
            .unwrap()
            .unwrap();
        assert_eq!(route.full_path, "/api/users/:id/posts/:slug");

        let constraints = route.constraints.unwrap();
        let names: Vec<&str> = constraints.constraints().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["slug"]);
    }

    #[test]
    fn test_unconstrained_route_has_no_constraint_middleware() {
        let (mut factory, _) = factory(groups());
        let route = factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/{id}", noop))
            .unwrap()
            .unwrap();
        assert!(route.constraints.is_none());
    }

    #[test]
    fn test_invalid_param_pattern_is_rejected() {
        let (mut factory, _) = factory(groups());
        let err = factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/{id:[0-9}", noop))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParamPattern { ref param, .. } if param == "id"));
    }

    #[test]
    fn test_constraint_matches_whole_segment() {
        let constraints = PathConstraints::new(vec![ParamConstraint::new("id", "[0-9]+").unwrap()]);
        let args = |v: &str| PathArgs::from([("id".to_string(), v.to_string())]);

        assert_eq!(constraints.violation(&args("42")), None);
        assert_eq!(constraints.violation(&args("42abc")), Some("id"));
        assert_eq!(constraints.violation(&args("abc")), Some("id"));
        assert_eq!(constraints.violation(&PathArgs::new()), None);
    }

    #[test]
    fn test_constrained_params_still_share_a_shape() {
        let (mut factory, _) = factory(
            groups().with_group::<Accounts>(GroupDeclaration::new("api/users")),
        );
        factory
            .build(&ActionMetadata::new::<Users>(Method::GET, "/{id:[0-9]+}", noop))
            .unwrap();
        let err = factory
            .build(&ActionMetadata::new::<Accounts>(Method::GET, "/{slug:[a-z]+}", noop))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousRoute { .. }));
    }

    #[test]
    fn test_schema_attaches_validation() {
        let (mut factory, _) = factory(groups());
        let schema = ValidationSchema::new().field("name", [FieldRule::Required]);
        let route = factory
            .build(&ActionMetadata::new::<Users>(Method::POST, "/", noop).with_schema(schema))
            .unwrap()
            .unwrap();
        assert!(route.validation.is_some());
        assert_eq!(route.middlewares.len(), 2);
    }

    #[test]
    fn test_build_all_follows_source_order() {
        let metadata = groups()
            .action(ActionMetadata::new::<Users>(Method::GET, "/", noop))
            .action(ActionMetadata::new::<Admin>(Method::GET, "/", noop))
            .action(ActionMetadata::new::<Accounts>(Method::GET, "/health", noop))
            .action(ActionMetadata::new::<Users>(Method::POST, "/", noop));
        let (mut factory, source) = factory(metadata);

        let routes = factory.build_all(source.as_ref()).unwrap();
        let summary: Vec<(String, String)> = routes
            .iter()
            .map(|r| (r.method.to_string(), r.full_path.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("GET".to_string(), "/api/users".to_string()),
                ("POST".to_string(), "/api/users".to_string()),
                ("GET".to_string(), "/health".to_string()),
            ]
        );
    }

    #[test]
    fn test_route_shape() {
        assert_eq!(route_shape("/users/:id"), "/users/:");
        assert_eq!(route_shape("/users/{uid}"), "/users/:");
        assert_eq!(route_shape("/files/*rest"), "/files/*");
        assert_eq!(route_shape("/"), "/");
    }
}
