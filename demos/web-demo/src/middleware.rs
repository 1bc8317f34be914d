//! 示例中间件

use manticore_web::prelude::*;

/// 记录经过 v1 分组的请求
pub struct Audit;

#[async_trait]
impl Middleware for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = next.run(request).await;

        tracing::info!(
            method = %method,
            path = %path,
            status = %response.status().as_u16(),
            "📝 audit"
        );
        response
    }
}
