//! 分组解析缓存
//!
//! 进程级、惰性填充、永不失效。命中时不再调用 [`GroupResolver`]。
//! 并发首访可能重复解析，但只保留第一个写入的结果；解析失败不缓存。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::controller::ControllerId;
use crate::error::ConfigResult;
use crate::group::{GroupModel, GroupResolver};

pub struct GroupCache {
    resolver: GroupResolver,
    entries: RwLock<HashMap<ControllerId, Arc<GroupModel>>>,
}

impl GroupCache {
    pub fn new(resolver: GroupResolver) -> Self {
        Self {
            resolver,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &GroupResolver {
        &self.resolver
    }

    pub fn get_or_resolve(&self, controller: &ControllerId) -> ConfigResult<Arc<GroupModel>> {
        if let Some(model) = self.entries.read().get(controller).cloned() {
            return Ok(model);
        }

        // 解析期间不持有锁
        let resolved = Arc::new(self.resolver.resolve(controller)?);

        let mut entries = self.entries.write();
        let model = entries.entry(*controller).or_insert(resolved);
        Ok(Arc::clone(model))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ActionMetadata, MetadataSource, StaticMetadata};
    use crate::error::ConfigError;
    use crate::group::GroupDeclaration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Api;
    struct Users;
    struct Ping;

    /// 统计 `group` 的调用次数
    struct Counting {
        inner: StaticMetadata,
        lookups: AtomicUsize,
    }

    impl MetadataSource for Counting {
        fn controllers(&self) -> Vec<ControllerId> {
            self.inner.controllers()
        }

        fn group(&self, controller: &ControllerId) -> Option<GroupDeclaration> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.group(controller)
        }

        fn actions(&self, controller: &ControllerId) -> Vec<ActionMetadata> {
            self.inner.actions(controller)
        }
    }

    fn counting(inner: StaticMetadata) -> Arc<Counting> {
        Arc::new(Counting {
            inner,
            lookups: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_resolver_runs_once_per_controller() {
        let source = counting(
            StaticMetadata::new()
                .with_group::<Api>(GroupDeclaration::new("api"))
                .with_group::<Users>(GroupDeclaration::new("users").parent::<Api>()),
        );
        let cache = GroupCache::new(GroupResolver::new(source.clone()));
        let id = ControllerId::of::<Users>();

        let first = cache.get_or_resolve(&id).unwrap();
        let after_first = source.lookups.load(Ordering::SeqCst);
        assert_eq!(after_first, 2);

        let second = cache.get_or_resolve(&id).unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), after_first);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.base_path, "api/users");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let source = counting(
            StaticMetadata::new().with_group::<Ping>(GroupDeclaration::new("ping").parent::<Ping>()),
        );
        let cache = GroupCache::new(GroupResolver::new(source.clone()));
        let id = ControllerId::of::<Ping>();

        assert!(matches!(cache.get_or_resolve(&id), Err(ConfigError::CyclicGroup { .. })));
        assert!(cache.is_empty());

        let before = source.lookups.load(Ordering::SeqCst);
        assert!(cache.get_or_resolve(&id).is_err());
        assert!(source.lookups.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_concurrent_first_access_yields_one_value() {
        let source = counting(StaticMetadata::new().with_group::<Api>(GroupDeclaration::new("api")));
        let cache = Arc::new(GroupCache::new(GroupResolver::new(source)));
        let id = ControllerId::of::<Api>();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_resolve(&id).unwrap())
            })
            .collect();

        let models: Vec<Arc<GroupModel>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get_or_resolve(&id).unwrap();
        assert!(models.iter().all(|m| Arc::ptr_eq(m, &stored)));
    }
}
