//! 请求作用域
//!
//! 每个 [`RequestScope`] 持有自己的请求作用域实例：同一个请求中多次获取
//! 得到同一个实例，作用域结束（`end()` 或 drop）时按构造逆序销毁。

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::bean::{BeanDefinition, Dependency, SharedBean};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::instance::InstanceRecord;
use crate::lifecycle::LifecycleCoordinator;
use crate::resolver::ResolvedDependency;

/// 一个请求作用域的共享状态
pub(crate) struct RequestState {
    id: u64,
    /// 同一请求内的构造串行化，嵌套构造可重入
    creation_lock: ReentrantMutex<()>,
    instances: Mutex<Vec<Arc<InstanceRecord>>>,
    ended: AtomicBool,
}

impl RequestState {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            creation_lock: ReentrantMutex::new(()),
            instances: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn cached(&self, name: &str) -> Option<SharedBean> {
        self.instances
            .lock()
            .iter()
            .find(|record| record.name() == name)
            .map(|record| record.bean())
    }

    /// 获取本请求中的实例，没有时用 `create` 构造并缓存
    pub(crate) fn get_or_create<F>(
        &self,
        definition: &BeanDefinition,
        create: F,
    ) -> ContainerResult<SharedBean>
    where
        F: FnOnce() -> ContainerResult<InstanceRecord>,
    {
        let name = definition.name();
        let _creation = self.creation_lock.lock();

        if self.ended.load(Ordering::SeqCst) {
            return Err(ContainerError::ScopeNotActive {
                bean: name.to_string(),
            });
        }

        if let Some(bean) = self.cached(name) {
            tracing::trace!("Returning request[{}] instance of bean '{}'", self.id, name);
            return Ok(bean);
        }

        tracing::debug!("Creating request[{}] instance of bean '{}'", self.id, name);
        let record = Arc::new(create()?);
        let bean = record.bean();
        self.instances.lock().push(record);
        Ok(bean)
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// 结束作用域，销毁所有实例；重复调用无效果
    pub(crate) fn end(&self) -> ContainerResult<()> {
        let _creation = self.creation_lock.lock();
        if self.ended.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let records: Vec<_> = std::mem::take(&mut *self.instances.lock());
        tracing::debug!(
            "Ending request[{}], destroying {} bean(s)",
            self.id,
            records.len()
        );

        let failures = LifecycleCoordinator::destroy_in_reverse(records);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::ShutdownIncomplete(failures))
        }
    }
}

/// 请求作用域
///
/// 通过 [`ApplicationContext::begin_request`](crate::ApplicationContext::begin_request) 创建。
/// 在作用域上调用 `BeanFactory` 的方法时，请求作用域的 Bean 可以被解析；
/// 单例和原型 Bean 与直接从容器获取时相同。
pub struct RequestScope {
    factory: Arc<DefaultListableBeanFactory>,
    state: Arc<RequestState>,
}

impl RequestScope {
    pub(crate) fn new(factory: Arc<DefaultListableBeanFactory>, id: u64) -> Self {
        Self {
            factory,
            state: Arc::new(RequestState::new(id)),
        }
    }

    /// 请求编号（容器内递增）
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// 本请求中已创建的实例数量
    pub fn instance_count(&self) -> usize {
        self.state.instance_count()
    }

    /// 结束请求，按构造逆序销毁本请求的实例
    pub fn end(self) -> ContainerResult<()> {
        self.state.end()
    }
}

impl BeanFactory for RequestScope {
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>> {
        self.factory.get_bean_in(name, Some(Arc::clone(&self.state)))
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.factory.contains_bean(name)
    }

    fn resolve_dependency(&self, dependency: &Dependency) -> ContainerResult<ResolvedDependency> {
        self.factory
            .resolve_in(dependency, Some(Arc::clone(&self.state)))
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if let Err(e) = self.state.end() {
            tracing::warn!("Request[{}] ended with errors: {}", self.state.id(), e);
        }
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id())
            .field("instances", &self.instance_count())
            .finish()
    }
}
