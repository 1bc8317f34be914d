//! Manticore Web Macros
//!
//! 编译时注册路由分组与 Action 的派生宏

mod action;
mod group;
mod utils;

use proc_macro::TokenStream;

/// 路由分组宏
///
/// 为控制器实现 `RouteGroup`，并把分组声明提交到全局注册表
///
/// # 示例
///
/// ```ignore
/// #[derive(RouteGroup)]
/// #[group(prefix = "api")]
/// struct ApiGroup;
///
/// #[derive(RouteGroup)]
/// #[group(prefix = "users", parent = ApiGroup, middleware = ["auth", "audit"])]
/// struct UserController;
/// ```
#[proc_macro_derive(RouteGroup, attributes(group))]
pub fn derive_route_group(input: TokenStream) -> TokenStream {
    group::derive_route_group_impl(input)
}

/// Action 路由宏
///
/// 类型需要实现 `Default` 与 `Action`
///
/// # 示例
///
/// ```ignore
/// #[derive(Default, ActionRoute)]
/// #[action(method = "GET", path = "/:id", controller = UserController)]
/// struct ShowUser;
///
/// impl Action for ShowUser {
///     fn action(&self, ctx: ActionContext) -> ActionResult<ActionOutcome> {
///         // ...
///     }
/// }
/// ```
#[proc_macro_derive(ActionRoute, attributes(action))]
pub fn derive_action_route(input: TokenStream) -> TokenStream {
    action::derive_action_route_impl(input)
}
