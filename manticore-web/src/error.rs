//! 启动期配置错误
//!
//! 路由解析与注册阶段出现的错误都是致命的：`AppBuilder::build` 直接返回，
//! 不会进入请求处理阶段。

use manticore_core::ApplicationError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 分组的 parent 链形成了环
    #[error("Cyclic route group chain: {}", chain.join(" -> "))]
    CyclicGroup { chain: Vec<&'static str> },

    /// 两个路由生成了相同的 (method, path)
    #[error("Ambiguous route {method} {path}: declared by `{first}` and `{second}`")]
    AmbiguousRoute {
        method: String,
        path: String,
        first: &'static str,
        second: &'static str,
    },

    /// 路径模式在路由匹配器中互相冲突，例如 `/files/:id` 与 `/files/*rest`
    #[error("Conflicting route `{path}`: {reason}")]
    ConflictingRoute { path: String, reason: String },

    /// `{name:pattern}` 中的正则无法编译
    #[error("Invalid pattern for path parameter `{param}`: {reason}")]
    InvalidParamPattern { param: String, reason: String },

    /// 路由引用了未注册的中间件名称
    #[error("Unknown middleware `{0}`")]
    UnknownMiddleware(String),

    /// 校验规则引用了未注册的自定义规则
    #[error("Unknown validation rule `{0}`")]
    UnknownValidationRule(String),

    /// 无法识别的 HTTP 方法
    #[error("Unsupported HTTP method `{0}`")]
    UnsupportedMethod(String),

    /// 非法的构建器状态组合
    #[error("Invalid configuration: {0}")]
    InvalidState(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for ApplicationError {
    fn from(err: ConfigError) -> Self {
        ApplicationError::Config(err.to_string())
    }
}
