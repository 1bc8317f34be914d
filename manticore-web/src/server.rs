//! Web 服务器模块
//!
//! 基于 Axum 的 Web 服务器实现

use axum::Router;
use manticore_core::{constants, ApplicationError, ApplicationResult, Environment};
use tokio::net::TcpListener;

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用 CORS
    pub enable_cors: bool,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string(constants::SERVER_HOST).unwrap_or(defaults.host),
            port: env
                .get_i64(constants::SERVER_PORT)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            enable_cors: env.get_bool_or(constants::SERVER_ENABLE_CORS, defaults.enable_cors),
            enable_request_logging: env.get_bool_or(
                constants::SERVER_ENABLE_REQUEST_LOGGING,
                defaults.enable_request_logging,
            ),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Web 服务器
pub struct WebServer {
    properties: ServerProperties,
    router: Router,
}

impl WebServer {
    pub fn new(properties: ServerProperties, router: Router) -> Self {
        Self { properties, router }
    }

    /// 启动服务器，收到 Ctrl-C 后优雅退出
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.properties.address();

        tracing::info!("🚀 Starting Manticore Web Server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Other(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("✅ Server listening on http://{}", addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApplicationError::Other(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
