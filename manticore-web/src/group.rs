//! 路由分组
//!
//! 控制器可以声明一个分组（路径前缀 + 中间件 + skip 标记），并通过 `parent`
//! 继承另一个分组。[`GroupResolver`] 沿 parent 链把这些声明展开为一个
//! [`GroupModel`]：
//!
//! - 路径：祖先前缀在前，子级前缀在后，例如 `api/v1/users`
//! - 中间件：祖先声明的先执行
//! - skip：链上任一节点为 true，整个分组就被跳过

use std::borrow::Cow;
use std::sync::Arc;

use crate::controller::{ControllerId, MetadataSource};
use crate::error::{ConfigError, ConfigResult};
use crate::middleware::{MiddlewareRef, MiddlewareSpec};

/// 控制器上声明的分组（只读）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDeclaration {
    pub prefix: Cow<'static, str>,
    pub middleware: MiddlewareSpec,
    pub parent: Option<ControllerId>,
    pub skip: bool,
}

impl GroupDeclaration {
    pub fn new(prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// 继承 `P` 的分组
    pub fn parent<P: 'static>(self) -> Self {
        self.with_parent(ControllerId::of::<P>())
    }

    pub fn with_parent(mut self, parent: ControllerId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn middleware(mut self, middleware: impl Into<MiddlewareSpec>) -> Self {
        self.middleware = middleware.into();
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }
}

/// 由 `#[derive(RouteGroup)]` 实现
pub trait RouteGroup: 'static {
    fn declaration() -> GroupDeclaration;
}

/// 解析后的分组
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupModel {
    /// 不含首尾斜杠的前缀，例如 `api/v1/users`
    pub base_path: String,
    /// 祖先在前的中间件列表
    pub middlewares: Vec<MiddlewareRef>,
    pub skip: bool,
}

/// 沿 parent 链解析分组
pub struct GroupResolver {
    source: Arc<dyn MetadataSource>,
}

impl GroupResolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn MetadataSource> {
        &self.source
    }

    pub fn resolve(&self, controller: &ControllerId) -> ConfigResult<GroupModel> {
        let Some(mut declaration) = self.source.group(controller) else {
            return Ok(GroupModel::default());
        };

        let mut visited = vec![*controller];
        let mut path = String::new();
        let mut skip = false;
        // 按遍历顺序（子级在前）收集每个节点的中间件
        let mut collected: Vec<Vec<MiddlewareRef>> = Vec::new();

        loop {
            skip |= declaration.skip;
            path = join_segments([&*declaration.prefix, path.as_str()]);

            let own = std::mem::take(&mut declaration.middleware).into_refs();
            if !own.is_empty() {
                collected.push(own);
            }

            let Some(parent) = declaration.parent else {
                break;
            };
            if visited.contains(&parent) {
                let mut chain: Vec<&'static str> = visited.iter().map(|id| id.name()).collect();
                chain.push(parent.name());
                return Err(ConfigError::CyclicGroup { chain });
            }
            visited.push(parent);

            match self.source.group(&parent) {
                Some(next) => declaration = next,
                None => break,
            }
        }

        // 节点级反转：祖先先执行，同一节点内保持声明顺序
        collected.reverse();

        tracing::debug!(
            controller = controller.name(),
            base_path = %path,
            depth = visited.len(),
            skip,
            "Route group resolved"
        );

        Ok(GroupModel {
            base_path: path,
            middlewares: collected.into_iter().flatten().collect(),
            skip,
        })
    }
}

/// 以单个斜杠连接路径片段，丢弃空片段
pub fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
