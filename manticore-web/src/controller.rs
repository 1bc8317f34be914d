//! 控制器元数据
//!
//! 控制器身份由类型决定（[`ControllerId`]）。分组声明与 Action 路由元数据通过
//! [`MetadataSource`] 提供，框架只读不写。
//!
//! [`StaticMetadata`] 是默认实现：既可以手动登记，也可以通过
//! `#[derive(RouteGroup)]` / `#[derive(ActionRoute)]` 生成的 inventory 注册项自动收集。

use axum::http::Method;
use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::action::Action;
use crate::error::{ConfigError, ConfigResult};
use crate::group::{GroupDeclaration, RouteGroup};
use crate::middleware::MiddlewareSpec;
use crate::validation::ValidationSchema;

/// 控制器身份
#[derive(Clone, Copy)]
pub struct ControllerId {
    type_id: TypeId,
    name: &'static str,
}

impl ControllerId {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 完整类型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 去掉模块路径的类型名
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for ControllerId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ControllerId {}

impl Hash for ControllerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ControllerId({})", self.name)
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// 单个 Action 的路由元数据
#[derive(Clone)]
pub struct ActionMetadata {
    pub controller: ControllerId,
    pub method: Method,
    /// 相对分组的路径后缀，例如 `/:id`
    pub path: Cow<'static, str>,
    pub middleware: MiddlewareSpec,
    /// 请求体校验规则；存在时注入校验中间件
    pub schema: Option<ValidationSchema>,
    pub action: Arc<dyn Action>,
}

impl ActionMetadata {
    pub fn new<C: 'static>(
        method: Method,
        path: impl Into<Cow<'static, str>>,
        action: impl Action,
    ) -> Self {
        Self::for_controller(ControllerId::of::<C>(), method, path, Arc::new(action))
    }

    pub fn for_controller(
        controller: ControllerId,
        method: Method,
        path: impl Into<Cow<'static, str>>,
        action: Arc<dyn Action>,
    ) -> Self {
        Self {
            controller,
            method,
            path: path.into(),
            middleware: MiddlewareSpec::None,
            schema: None,
            action,
        }
    }

    pub fn with_middleware(mut self, middleware: impl Into<MiddlewareSpec>) -> Self {
        self.middleware = middleware.into();
        self
    }

    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl std::fmt::Debug for ActionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMetadata")
            .field("controller", &self.controller)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middleware", &self.middleware)
            .field("validated", &self.schema.is_some())
            .finish()
    }
}

/// 元数据来源
pub trait MetadataSource: Send + Sync {
    /// 拥有 Action 的控制器，按登记顺序
    fn controllers(&self) -> Vec<ControllerId>;

    /// 控制器自身的分组声明（零个或一个）
    fn group(&self, controller: &ControllerId) -> Option<GroupDeclaration>;

    fn actions(&self, controller: &ControllerId) -> Vec<ActionMetadata>;
}

/// 分组注册信息（由 `#[derive(RouteGroup)]` 提交）
pub struct GroupRegistration {
    pub controller: fn() -> ControllerId,
    pub declaration: fn() -> GroupDeclaration,
}

/// Action 注册信息（由 `#[derive(ActionRoute)]` 提交）
pub struct ActionRegistration {
    pub controller: fn() -> ControllerId,
    pub method: &'static str,
    pub path: &'static str,
    pub middleware: &'static [&'static str],
    pub schema: Option<fn() -> ValidationSchema>,
    pub create: fn() -> Arc<dyn Action>,
}

inventory::collect!(GroupRegistration);
inventory::collect!(ActionRegistration);

/// 静态登记的元数据
#[derive(Default, Clone)]
pub struct StaticMetadata {
    order: Vec<ControllerId>,
    groups: HashMap<ControllerId, GroupDeclaration>,
    actions: HashMap<ControllerId, Vec<ActionMetadata>>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记 `C` 的分组声明（重复登记时覆盖）
    pub fn with_group<C: 'static>(mut self, declaration: GroupDeclaration) -> Self {
        self.declare_group(ControllerId::of::<C>(), declaration);
        self
    }

    /// 登记 `#[derive(RouteGroup)]` 类型
    pub fn route_group<C: RouteGroup>(self) -> Self {
        self.with_group::<C>(C::declaration())
    }

    pub fn action(mut self, action: ActionMetadata) -> Self {
        self.add_action(action);
        self
    }

    pub fn declare_group(&mut self, controller: ControllerId, declaration: GroupDeclaration) {
        self.groups.insert(controller, declaration);
    }

    pub fn add_action(&mut self, action: ActionMetadata) {
        let controller = action.controller;
        if !self.order.contains(&controller) {
            self.order.push(controller);
        }
        self.actions.entry(controller).or_default().push(action);
    }

    /// 收集 inventory 中的所有注册项
    ///
    /// inventory 不保证提交顺序，Action 按 (控制器名, 路径, 方法) 排序后登记
    pub fn from_inventory() -> ConfigResult<Self> {
        let mut metadata = Self::new();

        tracing::info!("🔍 Discovering route groups and actions from inventory...");

        for registration in inventory::iter::<GroupRegistration> {
            metadata.declare_group((registration.controller)(), (registration.declaration)());
        }

        let mut registrations: Vec<&ActionRegistration> =
            inventory::iter::<ActionRegistration>.into_iter().collect();
        registrations.sort_by_key(|r| ((r.controller)().name(), r.path, r.method));

        for registration in registrations {
            let method = Method::from_bytes(registration.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ConfigError::UnsupportedMethod(registration.method.to_string()))?;

            let mut action = ActionMetadata::for_controller(
                (registration.controller)(),
                method,
                registration.path,
                (registration.create)(),
            )
            .with_middleware(registration.middleware);

            if let Some(schema) = registration.schema {
                action = action.with_schema(schema());
            }
            metadata.add_action(action);
        }

        tracing::info!(
            groups = metadata.groups.len(),
            controllers = metadata.order.len(),
            "✅ Discovery completed"
        );

        Ok(metadata)
    }
}

impl MetadataSource for StaticMetadata {
    fn controllers(&self) -> Vec<ControllerId> {
        self.order.clone()
    }

    fn group(&self, controller: &ControllerId) -> Option<GroupDeclaration> {
        self.groups.get(controller).cloned()
    }

    fn actions(&self, controller: &ControllerId) -> Vec<ActionMetadata> {
        self.actions.get(controller).cloned().unwrap_or_default()
    }
}
