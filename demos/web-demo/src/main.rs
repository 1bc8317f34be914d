mod controller;
mod middleware;

use manticore_core::prelude::*;
use manticore_web::prelude::*;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🌐 Manticore Web - Route Group Demo");
    println!("===================================\n");

    let config_file = ["demos/web-demo/application.toml", "application.toml"]
        .into_iter()
        .map(Path::new)
        .find(|p| p.exists());

    let env = Environment::load(config_file)?;
    LoggingConfig::from_environment(&env).init()?;

    let settings = AppSettings::from_environment(&env);
    let router = AppBuilder::from_inventory(settings.clone())?
        .register_middleware("audit", middleware::Audit)
        .with_validation_config(ValidationConfig::from_environment(&env))
        .build()?;

    println!("📋 可用的 API 端点：\n");
    println!("  GET    /health              - 健康检查（延迟结果）");
    println!("  GET    /api/v1/users        - 用户列表");
    println!("  GET    /api/v1/users/:id    - 获取单个用户");
    println!("  POST   /api/v1/users        - 创建用户（请求体校验）\n");

    WebServer::new(settings.server, router).run().await?;
    Ok(())
}
