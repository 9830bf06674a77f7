//! 应用上下文 - 容器门面
//!
//! [`ApplicationContext`] 把 Bean 工厂、配置环境和 shutdown hook 组合在一起，
//! 并在注册时应用 `[beans.<name>]` 配置表中的元数据覆盖。

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::bean::{BeanDefinition, Capability, Dependency};
use crate::bean_factory::{
    BeanFactory, ConfigurableBeanFactory, DefaultListableBeanFactory, FactoryState,
    ListableBeanFactory,
};
use crate::config::{Environment, PropertySource};
use crate::constants::{BEANS_CONFIG_PREFIX, ENVIRONMENT_BEAN_NAME};
use crate::error::{ContainerError, ContainerResult, HookPhase};
use crate::request::RequestScope;
use crate::resolver::ResolvedDependency;
use crate::Scope;

/// 容器关闭时执行的回调
pub type ShutdownHook = Box<dyn Fn() -> ContainerResult<()> + Send + Sync>;

/// 配置文件中对单个 Bean 元数据的覆盖
///
/// ```toml
/// [beans.rateDiscountPolicy]
/// primary = true
///
/// [beans.memberService]
/// scope = "prototype"
/// lazy = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DefinitionOverride {
    pub scope: Option<Scope>,
    pub primary: Option<bool>,
    pub lazy: Option<bool>,
    /// 追加的 qualifier 标签
    pub qualifiers: Option<Vec<String>>,
}

impl DefinitionOverride {
    /// 把覆盖项应用到 Bean 定义上
    pub fn apply(&self, mut definition: BeanDefinition) -> BeanDefinition {
        if let Some(scope) = self.scope {
            definition = definition.with_scope(scope);
        }
        if let Some(primary) = self.primary {
            definition = definition.with_primary(primary);
        }
        if let Some(lazy) = self.lazy {
            definition = definition.with_lazy(lazy);
        }
        for qualifier in self.qualifiers.iter().flatten() {
            definition = definition.with_qualifier(qualifier.clone());
        }
        definition
    }
}

/// 应用上下文
///
/// 典型用法：
///
/// ```ignore
/// let context = ApplicationContext::builder()
///     .add_property_source(Box::new(TomlPropertySource::from_file("application.toml")?))
///     .register(BeanDefinition::of("memberRepository", |_| Ok(MemoryMemberRepository::new())))
///     .build()?;
/// context.start()?;
/// let repository = context.get_bean_by_type::<MemoryMemberRepository>()?;
/// context.shutdown()?;
/// ```
pub struct ApplicationContext {
    bean_factory: Arc<DefaultListableBeanFactory>,

    environment: Arc<Environment>,

    shutdown_hooks: RwLock<Vec<ShutdownHook>>,

    closed: AtomicBool,
}

impl ApplicationContext {
    /// 创建空的上下文（只包含 environment 核心 Bean）
    pub fn new() -> ContainerResult<Self> {
        Self::with_environment(Arc::new(Environment::new()))
    }

    /// 使用已有的配置环境创建上下文
    pub fn with_environment(environment: Arc<Environment>) -> ContainerResult<Self> {
        let context = Self {
            bean_factory: DefaultListableBeanFactory::new(),
            environment,
            shutdown_hooks: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        context.register_core_beans()?;
        Ok(context)
    }

    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    fn register_core_beans(&self) -> ContainerResult<()> {
        let environment = Arc::clone(&self.environment);
        self.bean_factory.register_bean_definition(
            BeanDefinition::of(ENVIRONMENT_BEAN_NAME, move |_| Ok(Arc::clone(&environment)))
                .provides(|holder: Arc<Arc<Environment>>| Arc::clone(&*holder)),
        )?;
        tracing::debug!("Registered core bean '{}'", ENVIRONMENT_BEAN_NAME);
        Ok(())
    }

    /// 获取底层 BeanFactory
    pub fn get_bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 读取 `[beans.*]` 配置表
    pub fn definition_overrides(&self) -> ContainerResult<HashMap<String, DefinitionOverride>> {
        self.environment.bind(BEANS_CONFIG_PREFIX)
    }

    /// 注册 Bean 定义，先应用配置中的元数据覆盖
    pub fn register(&self, definition: BeanDefinition) -> ContainerResult<()> {
        self.register_with_overrides(definition, &self.definition_overrides()?)
    }

    fn register_with_overrides(
        &self,
        definition: BeanDefinition,
        overrides: &HashMap<String, DefinitionOverride>,
    ) -> ContainerResult<()> {
        let definition = match overrides.get(definition.name()) {
            Some(overrides) => {
                tracing::debug!(
                    "Applying configured overrides to bean '{}': {:?}",
                    definition.name(),
                    overrides
                );
                overrides.apply(definition)
            }
            None => definition,
        };
        self.bean_factory.register_bean_definition(definition)
    }

    /// 注册无依赖的单例 Bean
    pub fn register_singleton<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Singleton, factory)
    }

    /// 注册无依赖的原型 Bean
    pub fn register_prototype<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Prototype, factory)
    }

    /// 注册无依赖的请求作用域 Bean
    pub fn register_request<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register_scoped(name, Scope::Request, factory)
    }

    fn register_scoped<T, F>(&self, name: impl Into<String>, scope: Scope, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register(BeanDefinition::of(name, move |_| factory()).with_scope(scope))
    }

    /// 注册 shutdown hook，在销毁 Bean 之前按注册顺序执行
    pub fn register_shutdown_hook<F>(&self, hook: F)
    where
        F: Fn() -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.shutdown_hooks.write().push(Box::new(hook));
    }

    /// 启动容器
    ///
    /// 冻结注册、校验依赖图，再实例化 `with_lazy(false)` 的单例。
    pub fn start(&self) -> ContainerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::ContainerShutDown);
        }
        tracing::info!("Starting ApplicationContext");

        for name in self.definition_overrides()?.keys() {
            if !self.bean_factory.contains_bean_definition(name) {
                tracing::warn!("Configured overrides for unknown bean '{}' are ignored", name);
            }
        }

        self.bean_factory.freeze_configuration();
        self.validate_dependencies()?;
        self.bean_factory.mark_running();
        self.bean_factory.preinstantiate_singletons()?;

        tracing::info!(
            "ApplicationContext started with {} bean definition(s), {} singleton(s) active",
            self.bean_factory.get_bean_definition_count(),
            self.bean_factory.singleton_count()
        );
        Ok(())
    }

    /// 校验依赖图
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        self.bean_factory.validate_dependencies()?;
        tracing::info!(
            "Dependency validation passed for {} bean(s)",
            self.bean_factory.get_bean_definition_count()
        );
        Ok(())
    }

    /// 开启新的请求作用域
    pub fn begin_request(&self) -> ContainerResult<RequestScope> {
        self.bean_factory.begin_request()
    }

    /// 销毁单例，下次获取时重新创建
    pub fn reset_singleton(&self, name: &str) -> ContainerResult<()> {
        self.bean_factory.reset_singleton(name)
    }

    pub fn state(&self) -> FactoryState {
        self.bean_factory.state()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 关闭容器
    ///
    /// 先停止创建新实例并执行 shutdown hooks，再按构造逆序销毁所有单例。
    /// hooks 中仍可读取已创建的单例。所有失败都会收集到
    /// [`ContainerError::ShutdownIncomplete`] 中一次性返回；重复调用无效果。
    pub fn shutdown(&self) -> ContainerResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("ApplicationContext already shut down");
            return Ok(());
        }
        tracing::info!("Starting application shutdown");

        // 等待进行中的单例构造完成，之后不再创建新实例
        self.bean_factory.begin_shutdown();

        let mut failures = Vec::new();

        let hooks = std::mem::take(&mut *self.shutdown_hooks.write());
        tracing::info!("Executing {} shutdown hook(s)", hooks.len());
        for (idx, hook) in hooks.iter().enumerate() {
            match hook() {
                Ok(()) => tracing::debug!("Shutdown hook {} executed successfully", idx + 1),
                Err(e) => {
                    tracing::warn!("Shutdown hook {} failed: {}", idx + 1, e);
                    failures.push(ContainerError::LifecycleHookFailure {
                        bean: format!("shutdown hook #{}", idx + 1),
                        phase: HookPhase::Shutdown,
                        source: e.into(),
                    });
                }
            }
        }

        match self.bean_factory.destroy_singletons() {
            Ok(()) => {}
            Err(ContainerError::ShutdownIncomplete(errors)) => failures.extend(errors),
            Err(e) => failures.push(e),
        }

        if failures.is_empty() {
            tracing::info!("Application shutdown complete");
            Ok(())
        } else {
            tracing::warn!("Application shutdown completed with {} failure(s)", failures.len());
            Err(ContainerError::ShutdownIncomplete(failures))
        }
    }
}

impl BeanFactory for ApplicationContext {
    fn get_bean(&self, name: &str) -> ContainerResult<Arc<dyn Any + Send + Sync>> {
        self.bean_factory.get_bean(name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }

    fn resolve_dependency(&self, dependency: &Dependency) -> ContainerResult<ResolvedDependency> {
        self.bean_factory.resolve_dependency(dependency)
    }
}

impl ListableBeanFactory for ApplicationContext {
    fn get_bean_names(&self) -> Vec<String> {
        self.bean_factory.get_bean_names()
    }

    fn get_bean_names_for_capability(&self, capability: Capability) -> Vec<String> {
        self.bean_factory.get_bean_names_for_capability(capability)
    }

    fn get_bean_definition_count(&self) -> usize {
        self.bean_factory.get_bean_definition_count()
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.bean_factory.get_bean_definition(name)
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("bean_factory", &self.bean_factory)
            .field("environment", &self.environment)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 应用上下文构建器
///
/// 注册的定义在 `build()` 时才写入容器，此时所有配置源都已加入，
/// `[beans.*]` 覆盖与调用顺序无关。
pub struct ApplicationContextBuilder {
    environment: Arc<Environment>,
    definitions: Vec<BeanDefinition>,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            environment: Arc::new(Environment::new()),
            definitions: Vec::new(),
        }
    }

    /// 注册 Bean
    pub fn register(mut self, definition: BeanDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// 添加配置源到 Environment
    pub fn add_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.environment.add_property_source(source);
        self
    }

    /// 添加配置源（可变引用版本，不消费 self）
    pub(crate) fn add_property_source_mut(&mut self, source: Box<dyn PropertySource>) {
        self.environment.add_property_source(source);
    }

    /// 设置激活的 profiles
    pub fn set_active_profiles(self, profiles: Vec<String>) -> Self {
        self.environment.set_active_profiles(profiles);
        self
    }

    /// 构建上下文
    pub fn build(self) -> ContainerResult<Arc<ApplicationContext>> {
        let context = ApplicationContext::with_environment(self.environment)?;
        let overrides = context.definition_overrides()?;
        for definition in self.definitions {
            context.register_with_overrides(definition, &overrides)?;
        }
        tracing::debug!(
            "ApplicationContext built with {} bean definition(s)",
            context.get_bean_definition_count()
        );
        Ok(Arc::new(context))
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
