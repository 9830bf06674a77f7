//! Bean Factory - 核心容器接口
//!
//! 参考 Spring 的 BeanFactory 架构设计。`DefaultListableBeanFactory` 同时承担
//! 作用域管理：单例缓存、原型创建，以及把请求作用域的 Bean 交给
//! [`RequestScope`](crate::RequestScope)。

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{ReentrantMutex, RwLock};

use crate::{
    bean::{BeanDefinition, Capability, Dependency, Selector, SharedBean},
    error::{ContainerError, ContainerResult},
    instance::{InstanceRecord, PendingInstance},
    lifecycle::LifecycleCoordinator,
    provider::ObjectProvider,
    registry::Registry,
    request::{RequestScope, RequestState},
    resolver::{Dependencies, ResolutionContext, ResolvedDependency, Resolver},
    utils::dependency::CreationTracker,
    Scope,
};

/// BeanFactory - 最基础的容器接口
///
/// 提供基本的 Bean 访问功能，类似 Spring 的 BeanFactory
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 解析一个依赖描述
    fn resolve_dependency(&self, dependency: &Dependency) -> ContainerResult<ResolvedDependency>;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过名称获取 Bean，并转换为类型 `C`
    fn get_bean_as<C: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<C>> {
        single(self, &Dependency::named::<C>(name))
    }

    /// 通过类型获取唯一的 Bean
    fn get_bean_by_type<C: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<C>> {
        single(self, &Dependency::on::<C>())
    }

    /// 通过类型和 qualifier 获取 Bean
    fn get_bean_qualified<C: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> ContainerResult<Arc<C>> {
        single(self, &Dependency::on::<C>().qualified(qualifier))
    }

    /// 通过类型获取 Bean，不存在时返回 `None`
    fn get_optional_bean<C: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Option<Arc<C>>> {
        let resolved = self.resolve_dependency(&Dependency::on::<C>().optional())?;
        if resolved.is_absent() {
            return Ok(None);
        }
        resolved
            .as_single::<C>()
            .map(Some)
            .ok_or_else(|| mismatch::<C>("optional bean"))
    }

    /// 获取类型 `C` 的所有 Bean（注册顺序），附带 Bean 名称
    fn get_beans_of_type<C: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> ContainerResult<Vec<(String, Arc<C>)>> {
        self.resolve_dependency(&Dependency::all::<C>())?
            .as_many::<C>()
            .ok_or_else(|| mismatch::<C>("beans of type"))
    }

    /// 获取类型 `C` 的延迟 provider
    fn get_provider<C: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<ObjectProvider<C>> {
        self.resolve_dependency(&Dependency::provider::<C>())?
            .as_provider::<C>()
            .ok_or_else(|| mismatch::<C>("provider"))
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

fn single<F, C>(factory: &F, dependency: &Dependency) -> ContainerResult<Arc<C>>
where
    F: BeanFactory + ?Sized,
    C: ?Sized + Send + Sync + 'static,
{
    factory
        .resolve_dependency(dependency)?
        .as_single::<C>()
        .ok_or_else(|| mismatch::<C>(&dependency.describe()))
}

fn mismatch<C: ?Sized + 'static>(what: &str) -> ContainerError {
    ContainerError::TypeMismatch {
        bean: what.to_string(),
        expected: std::any::type_name::<C>().to_string(),
    }
}

/// ListableBeanFactory - 可列举的 Bean 工厂
///
/// 扩展 BeanFactory，提供列举所有 Bean 的能力
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 的名称（注册顺序）
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取满足能力的所有 Bean 名称
    fn get_bean_names_for_capability(&self, capability: Capability) -> Vec<String>;

    /// 获取指定类型的所有 Bean 名称
    fn get_bean_names_for_type<C: ?Sized + 'static>(&self) -> Vec<String>
    where
        Self: Sized,
    {
        self.get_bean_names_for_capability(Capability::of::<C>())
    }

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;

    /// 获取单个 Bean 定义
    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>>;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
///
/// 提供注册、冻结、预实例化和销毁的能力
pub trait ConfigurableBeanFactory: BeanFactory {
    /// 注册 Bean 定义
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()>;

    /// 检查是否包含指定的 Bean 定义
    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 预实例化所有非延迟的单例 Bean
    fn preinstantiate_singletons(&self) -> ContainerResult<()>;

    /// 冻结配置（不再允许注册 Bean 定义）
    fn freeze_configuration(&self);

    /// 检查配置是否已冻结
    fn is_configuration_frozen(&self) -> bool;

    /// 销毁单例并重新创建（下次获取时）
    fn reset_singleton(&self, name: &str) -> ContainerResult<()>;

    /// 销毁所有单例 Bean（逆序调用 destroy 回调）
    fn destroy_singletons(&self) -> ContainerResult<()>;
}

/// 容器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    Created,
    Running,
    ShuttingDown,
    Closed,
}

type SingletonSlot = Arc<OnceCell<Arc<InstanceRecord>>>;

/// DefaultListableBeanFactory - 所有 Bean 工厂接口的默认实现
///
/// 这是实际的 Bean 容器实现，类似 Spring 的 DefaultListableBeanFactory
pub struct DefaultListableBeanFactory {
    /// 供 ObjectProvider 使用的弱引用
    this: Weak<DefaultListableBeanFactory>,

    /// Bean 定义存储
    registry: Registry,

    /// 单例槽位，激活后读取无需加锁创建
    singletons: RwLock<HashMap<String, SingletonSlot>>,

    /// 单例创建锁，同一线程的嵌套创建可以重入
    creation_lock: ReentrantMutex<()>,

    /// 循环依赖检测
    creation_tracker: CreationTracker,

    lifecycle: LifecycleCoordinator,

    state: RwLock<FactoryState>,

    request_ids: AtomicU64,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: Weak::clone(this),
            registry: Registry::new(),
            singletons: RwLock::new(HashMap::new()),
            creation_lock: ReentrantMutex::new(()),
            creation_tracker: CreationTracker::new(),
            lifecycle: LifecycleCoordinator::new(),
            state: RwLock::new(FactoryState::Created),
            request_ids: AtomicU64::new(1),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> FactoryState {
        *self.state.read()
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state.write();
        if *state == FactoryState::Created {
            *state = FactoryState::Running;
        }
    }

    /// 是否允许创建新实例
    fn ensure_open(&self) -> ContainerResult<()> {
        match self.state() {
            FactoryState::Created | FactoryState::Running => Ok(()),
            FactoryState::ShuttingDown | FactoryState::Closed => Err(ContainerError::ContainerShutDown),
        }
    }

    /// 关闭过程中仍可读取已缓存的单例
    fn ensure_not_closed(&self) -> ContainerResult<()> {
        match self.state() {
            FactoryState::Closed => Err(ContainerError::ContainerShutDown),
            _ => Ok(()),
        }
    }

    /// 进入关闭阶段，此后不再创建新实例
    ///
    /// 在创建锁下切换状态，正在进行的单例构造会先完成。
    pub(crate) fn begin_shutdown(&self) {
        let _creation = self.creation_lock.lock();
        let mut state = self.state.write();
        if matches!(*state, FactoryState::Created | FactoryState::Running) {
            tracing::debug!("Bean factory entering shutdown, new instances are rejected");
            *state = FactoryState::ShuttingDown;
        }
    }

    /// 开启新的请求作用域
    pub fn begin_request(&self) -> ContainerResult<RequestScope> {
        self.ensure_open()?;
        let factory = self.this.upgrade().ok_or(ContainerError::ContainerShutDown)?;
        let id = self.request_ids.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Beginning request[{}]", id);
        Ok(RequestScope::new(factory, id))
    }

    /// 已激活的单例数量
    pub fn singleton_count(&self) -> usize {
        self.lifecycle.active_count()
    }

    /// 校验依赖图（缺失、歧义、循环、单例捕获请求 Bean）
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        Resolver::new(&self.registry).validate()
    }

    pub(crate) fn get_bean_in(
        &self,
        name: &str,
        request: Option<Arc<RequestState>>,
    ) -> ContainerResult<SharedBean> {
        tracing::trace!("Requesting bean: '{}'", name);
        let definition = self.registry.find_by_name(name)?;
        self.get_instance(&definition, &mut ResolutionContext::new(request))
    }

    pub(crate) fn resolve_in(
        &self,
        dependency: &Dependency,
        request: Option<Arc<RequestState>>,
    ) -> ContainerResult<ResolvedDependency> {
        self.ensure_not_closed()?;
        self.resolve(dependency, &mut ResolutionContext::new(request))
    }

    fn resolve(
        &self,
        dependency: &Dependency,
        ctx: &mut ResolutionContext,
    ) -> ContainerResult<ResolvedDependency> {
        let capability = dependency.capability();
        let resolver = Resolver::new(&self.registry);

        match dependency.selector() {
            Selector::Provider { .. } => {
                let factory = dependency.provider_factory().ok_or_else(|| {
                    ContainerError::TypeMismatch {
                        bean: dependency.describe(),
                        expected: "ObjectProvider".to_string(),
                    }
                })?;
                Ok(ResolvedDependency::Provider(factory(
                    Weak::clone(&self.this),
                    dependency.provided_target(),
                )))
            }
            Selector::All => {
                let mut beans = Vec::new();
                for definition in resolver.candidates(capability) {
                    let bean = self.get_instance(&definition, ctx)?;
                    beans.push((
                        definition.name().to_string(),
                        definition.cast(capability, bean)?,
                    ));
                }
                Ok(ResolvedDependency::Many(beans))
            }
            _ => match resolver.select(dependency)? {
                None => Ok(ResolvedDependency::Absent),
                Some(definition) => {
                    let bean = self.get_instance(&definition, ctx)?;
                    Ok(ResolvedDependency::Single(definition.cast(capability, bean)?))
                }
            },
        }
    }

    /// 按作用域获取实例
    fn get_instance(
        &self,
        definition: &Arc<BeanDefinition>,
        ctx: &mut ResolutionContext,
    ) -> ContainerResult<SharedBean> {
        self.ensure_not_closed()?;

        match definition.scope() {
            Scope::Singleton => self.get_singleton(definition, ctx),
            Scope::Request => {
                let request = ctx.request().cloned().ok_or_else(|| {
                    ContainerError::ScopeNotActive {
                        bean: definition.name().to_string(),
                    }
                })?;
                request.get_or_create(definition, || {
                    self.ensure_open()?;
                    self.create_instance(definition, ctx)
                })
            }
            Scope::Prototype => {
                self.ensure_open()?;
                tracing::debug!("Creating new instance of prototype bean '{}'", definition.name());
                Ok(self.create_instance(definition, ctx)?.bean())
            }
        }
    }

    fn singleton_slot(&self, name: &str) -> SingletonSlot {
        if let Some(slot) = self.singletons.read().get(name) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.singletons
                .write()
                .entry(name.to_string())
                .or_default(),
        )
    }

    fn get_singleton(
        &self,
        definition: &Arc<BeanDefinition>,
        ctx: &mut ResolutionContext,
    ) -> ContainerResult<SharedBean> {
        let name = definition.name();
        let slot = self.singleton_slot(name);

        if let Some(record) = slot.get() {
            tracing::trace!("Returning cached instance of singleton bean '{}'", name);
            return Ok(record.bean());
        }

        let _creation = self.creation_lock.lock();
        self.ensure_not_closed()?;

        // 等待锁期间其他线程可能已完成创建
        if let Some(record) = slot.get() {
            tracing::debug!("Singleton bean '{}' was created concurrently", name);
            return Ok(record.bean());
        }
        self.ensure_open()?;

        tracing::info!("Creating shared instance of singleton bean '{}'", name);

        // 单例在容器上下文中构造，不能捕获请求作用域的实例
        let request = ctx.take_request();
        let created = self.create_instance(definition, ctx);
        ctx.restore_request(request);

        let record = Arc::new(created?);
        self.lifecycle.track(Arc::clone(&record));
        let bean = record.bean();
        if slot.set(record).is_err() {
            tracing::warn!("Singleton bean '{}' was already cached", name);
        }

        tracing::debug!("Singleton bean '{}' created and cached", name);
        Ok(bean)
    }

    /// 解析依赖、调用构造函数，再执行 init 回调
    fn create_instance(
        &self,
        definition: &Arc<BeanDefinition>,
        ctx: &mut ResolutionContext,
    ) -> ContainerResult<InstanceRecord> {
        let name = definition.name();
        ctx.enter(name)?;

        // 经 ObjectProvider 重新进入容器时解析栈是新的，按线程记录的创建链兜底
        if !self.creation_tracker.start_creating(name) {
            let path = self.creation_tracker.cycle_through(name);
            ctx.exit();
            return Err(ContainerError::CircularDependency { path });
        }

        // 使用 RAII 模式确保在任何情况下都会清理标记
        struct CreationGuard<'a> {
            tracker: &'a CreationTracker,
            name: &'a str,
        }

        impl Drop for CreationGuard<'_> {
            fn drop(&mut self) {
                self.tracker.finish_creating(self.name);
            }
        }

        let guard = CreationGuard {
            tracker: &self.creation_tracker,
            name,
        };
        let created = self.construct(definition, ctx);
        drop(guard);
        ctx.exit();
        created
    }

    fn construct(
        &self,
        definition: &Arc<BeanDefinition>,
        ctx: &mut ResolutionContext,
    ) -> ContainerResult<InstanceRecord> {
        let name = definition.name();

        let mut resolved = Vec::with_capacity(definition.dependencies().len());
        for dependency in definition.dependencies() {
            tracing::trace!("Resolving {} for bean '{}'", dependency.describe(), name);
            resolved.push(self.resolve(dependency, ctx)?);
        }
        let dependencies = Dependencies::new(name, resolved);

        let value = definition
            .recipe()
            .create(&dependencies)
            .map_err(|e| ContainerError::from_recipe(name, e))?;

        self.lifecycle
            .on_create(PendingInstance::new(Arc::clone(definition), value))
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>> {
        self.get_bean_in(name, None)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    fn resolve_dependency(&self, dependency: &Dependency) -> ContainerResult<ResolvedDependency> {
        self.resolve_in(dependency, None)
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.registry.names()
    }

    fn get_bean_names_for_capability(&self, capability: Capability) -> Vec<String> {
        self.registry.names_for_capability(capability)
    }

    fn get_bean_definition_count(&self) -> usize {
        self.registry.len()
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.registry.find_by_name(name)
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        tracing::trace!(
            "Attempting to register bean: name='{}', type='{}', scope={}",
            definition.name(),
            definition.type_name(),
            definition.scope()
        );
        self.registry.register(definition)
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let eager: Vec<_> = self
            .registry
            .definitions()
            .into_iter()
            .filter(|definition| definition.scope() == Scope::Singleton && !definition.is_lazy())
            .collect();

        tracing::debug!("Pre-instantiating {} singleton beans", eager.len());

        for definition in eager {
            self.get_instance(&definition, &mut ResolutionContext::new(None))?;
        }

        Ok(())
    }

    fn freeze_configuration(&self) {
        self.registry.freeze();
    }

    fn is_configuration_frozen(&self) -> bool {
        self.registry.is_frozen()
    }

    fn reset_singleton(&self, name: &str) -> ContainerResult<()> {
        let definition = self.registry.find_by_name(name)?;
        if definition.scope() != Scope::Singleton {
            return Err(ContainerError::InvalidConfiguration(format!(
                "bean '{}' is {} scoped, only singletons can be reset",
                name,
                definition.scope()
            )));
        }

        let _creation = self.creation_lock.lock();
        self.ensure_open()?;

        let previous = self.singletons.write().remove(name);
        let Some(record) = previous.as_ref().and_then(|slot| slot.get()) else {
            tracing::debug!("Singleton bean '{}' has not been created, nothing to reset", name);
            return Ok(());
        };

        self.lifecycle.untrack(name);
        tracing::info!("Resetting singleton bean '{}'", name);
        LifecycleCoordinator::destroy(record)
    }

    fn destroy_singletons(&self) -> ContainerResult<()> {
        let _creation = self.creation_lock.lock();
        {
            let mut state = self.state.write();
            if *state == FactoryState::Closed {
                tracing::debug!("Bean factory already shut down");
                return Ok(());
            }
            *state = FactoryState::ShuttingDown;
        }

        tracing::info!("Destroying singleton beans");
        let failures = self.lifecycle.on_shutdown();
        self.singletons.write().clear();
        *self.state.write() = FactoryState::Closed;
        tracing::info!("Singleton beans destruction completed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::ShutdownIncomplete(failures))
        }
    }
}

impl std::fmt::Debug for DefaultListableBeanFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultListableBeanFactory")
            .field("registry", &self.registry)
            .field("singletons", &self.singleton_count())
            .field("state", &self.state())
            .finish()
    }
}
