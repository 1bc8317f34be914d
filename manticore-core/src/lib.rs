// manticore-core: Manticore Web 层的基础设施
//
// 提供：
// - 分层配置（TOML 文件 / 环境变量 / 内存）
// - 基于 tracing 的日志初始化
// - 统一的错误类型

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use error::{ApplicationError, ApplicationResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::error::{ApplicationError, ApplicationResult, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use anyhow::{anyhow, Context};
}
