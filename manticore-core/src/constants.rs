//! 框架配置常量定义
//!
//! 定义所有框架使用的配置键名称

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用 CORS
pub const SERVER_ENABLE_CORS: &str = "server.enable-cors";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== App 配置 ====================

/// 错误响应中是否展示详细信息（开发环境开启）
pub const APP_DISPLAY_ERROR_DETAILS: &str = "app.display-error-details";

/// 是否记录错误日志
pub const APP_LOG_ERRORS: &str = "app.log-errors";

/// 错误日志中是否包含详细信息
pub const APP_LOG_ERROR_DETAILS: &str = "app.log-error-details";

// ==================== Validation 配置 ====================

/// 校验中间件读取请求体的最大字节数
pub const VALIDATION_MAX_BODY_BYTES: &str = "validation.max-body-bytes";

/// 遇到第一个字段错误即停止
pub const VALIDATION_STOP_ON_FIRST_ERROR: &str = "validation.stop-on-first-error";

// ==================== Logging 配置 ====================

pub const LOGGING_LEVEL: &str = "logging.level";

pub const LOGGING_FORMAT: &str = "logging.format";

/// 环境变量配置源默认前缀
pub const DEFAULT_ENV_PREFIX: &str = "APP_";
