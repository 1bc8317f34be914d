//! # Manticore Web
//!
//! 基于 Axum 的路由分组与 Action 分发层
//!
//! ## 核心特性
//!
//! - **路由分组** - 控制器声明前缀、中间件与 skip 标记，并沿 parent 链继承
//! - **解析缓存** - 每个控制器的分组只解析一次
//! - **中间件编排** - 祖先分组的中间件先执行，校验中间件最后执行
//! - **Action 分发** - 同步或延迟结果，条件错误自动接线为 HTTP 错误
//! - **编译时注册** - `#[derive(RouteGroup)]` / `#[derive(ActionRoute)]` 通过 inventory 收集

pub mod action;
pub mod app;
pub mod controller;
pub mod error;
pub mod error_handler;
pub mod exception;
pub mod group;
pub mod group_cache;
pub mod middleware;
pub mod payload;
pub mod registrar;
pub mod route;
pub mod server;
pub mod validation;

// 宏生成的代码通过这些路径引用依赖
pub use async_trait::async_trait;
pub use axum;
pub use inventory;

pub use manticore_web_macros::{ActionRoute, RouteGroup};

pub mod prelude {
    //! 预导入模块

    pub use crate::action::{Action, ActionContext, ActionDispatcher, ActionOutcome, Deferred};
    pub use crate::app::{AppBuilder, AppSettings};
    pub use crate::controller::{ActionMetadata, ControllerId, MetadataSource, StaticMetadata};
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::error_handler::{HttpErrorHandler, ShutdownHandler};
    pub use crate::exception::{
        ActionError, ActionResult, ErrorType, HttpCondition, HttpException, HttpSpecialized,
        MissingArgument, RequestContext,
    };
    pub use crate::group::{GroupDeclaration, GroupModel, RouteGroup};
    pub use crate::middleware::{Middleware, MiddlewareRef, MiddlewareRegistry, MiddlewareSpec};
    pub use crate::payload::ActionPayload;
    pub use crate::server::{ServerProperties, WebServer};
    pub use crate::validation::{FieldRule, ValidationConfig, ValidationSchema};
    pub use manticore_web_macros::{ActionRoute, RouteGroup};

    pub use async_trait::async_trait;
    pub use axum;
    pub use axum::extract::Request;
    pub use axum::http::{Method, StatusCode};
    pub use axum::middleware::Next;
    pub use axum::response::{IntoResponse, Response};
    pub use axum::Router;
}
