//! 示例控制器
//!
//! 分组结构：
//!
//! ```text
//! ApiGroup      /api           [request-id]
//! └─ V1Group    /api/v1        [audit]
//!    └─ UserController /api/v1/users
//! LegacyGroup   /api/legacy    (skip)
//! ```

use manticore_web::prelude::*;
use manticore_web::validation::ValidationSchema;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

fn users() -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        },
        User {
            id: 2,
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
        },
    ]
}

// ==================== 分组 ====================

#[derive(RouteGroup)]
#[group(prefix = "api", middleware = "request-id")]
pub struct ApiGroup;

#[derive(RouteGroup)]
#[group(prefix = "v1", parent = ApiGroup, middleware = ["audit"])]
pub struct V1Group;

#[derive(RouteGroup)]
#[group(prefix = "/users/", parent = V1Group)]
pub struct UserController;

#[derive(RouteGroup)]
#[group(prefix = "legacy", parent = ApiGroup, skip)]
pub struct LegacyGroup;

// ==================== 领域条件 ====================

#[derive(Debug, thiserror::Error)]
#[error("User {0} not found")]
pub struct UserNotFound(u64);

impl HttpSpecialized for UserNotFound {
    fn wire(&self, request: &RequestContext) -> HttpException {
        HttpException::not_found(request, self.to_string())
    }
}

impl From<UserNotFound> for ActionError {
    fn from(condition: UserNotFound) -> Self {
        ActionError::specialized(condition)
    }
}

// ==================== Action ====================

/// GET /api/v1/users
#[derive(Default, ActionRoute)]
#[action(method = "GET", path = "/", controller = UserController)]
pub struct ListUsers;

impl Action for ListUsers {
    fn action(&self, _ctx: ActionContext) -> ActionResult<ActionOutcome> {
        ActionOutcome::respond_with_data(&users(), 200)
    }
}

/// GET /api/v1/users/:id
#[derive(Default, ActionRoute)]
#[action(method = "GET", path = "/:id", controller = UserController)]
pub struct ShowUser;

impl Action for ShowUser {
    fn action(&self, ctx: ActionContext) -> ActionResult<ActionOutcome> {
        let id: u64 = ctx.parse_arg("id")?;
        let user = users()
            .into_iter()
            .find(|u| u.id == id)
            .ok_or(UserNotFound(id))?;
        ActionOutcome::respond_with_data(&user, 200)
    }
}

pub fn create_user_schema() -> ValidationSchema {
    ValidationSchema::new()
        .field("name", [FieldRule::Required, FieldRule::String, FieldRule::MinLength(2)])
        .field("email", [FieldRule::Required, FieldRule::Email])
}

/// POST /api/v1/users
///
/// 在后台任务中"保存"，通过 oneshot 通道返回延迟结果
#[derive(Default, ActionRoute)]
#[action(method = "POST", path = "/", controller = UserController, schema = create_user_schema)]
pub struct CreateUser;

impl Action for CreateUser {
    fn action(&self, mut ctx: ActionContext) -> ActionResult<ActionOutcome> {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = async {
                let body: serde_json::Value = ctx.json().await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
                let user = User {
                    id: 3,
                    name: body["name"].as_str().unwrap_or_default().to_string(),
                    email: body["email"].as_str().unwrap_or_default().to_string(),
                };
                Ok::<_, ActionError>(ActionPayload::with_data(&user, 201)?)
            }
            .await;
            let _ = tx.send(result);
        });

        Ok(Deferred::from_receiver(rx).into())
    }
}

/// GET /api/legacy/ping，分组被 skip，不会注册
#[derive(Default, ActionRoute)]
#[action(method = "GET", path = "/ping", controller = LegacyGroup)]
pub struct LegacyPing;

impl Action for LegacyPing {
    fn action(&self, _ctx: ActionContext) -> ActionResult<ActionOutcome> {
        ActionOutcome::respond_with_data(&"pong", 200)
    }
}

/// GET /health，无分组
#[derive(Default, ActionRoute)]
#[action(method = "GET", path = "/health")]
pub struct Health;

impl Action for Health {
    fn action(&self, _ctx: ActionContext) -> ActionResult<ActionOutcome> {
        Ok(ActionOutcome::pending(async {
            Ok(ActionPayload::ok(json!({ "status": "UP" })))
        }))
    }
}
