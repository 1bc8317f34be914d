/// 统一的错误处理类型
///
/// 应用层代码使用 `anyhow::Result`，通过 `.context()` 添加错误上下文；
/// 框架启动阶段的错误使用 [`ApplicationError`]。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::{Context, Result};
///
/// fn load(path: &str) -> Result<String> {
///     std::fs::read_to_string(path).context(format!("Failed to read '{}'", path))
/// }
/// ```
pub use anyhow::Result;

use thiserror::Error;

/// 应用启动与运行阶段的错误
#[derive(Error, Debug)]
pub enum ApplicationError {
    /// 配置错误（路由冲突、分组循环等），启动时即失败
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志系统初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
