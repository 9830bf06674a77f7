// trellis-core: 类似 Spring 的依赖注入容器
//
// 提供类型安全的依赖注入功能，支持：
// - 单例、请求和原型作用域
// - 构造函数注入（按类型、qualifier、名称、集合和延迟 provider）
// - 生命周期管理（init/destroy 回调，逆序销毁）
// - 配置驱动的 Bean 元数据覆盖

pub mod app;
pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod scope;
pub mod utils;

// Helper trait for init/destroy callbacks
// Allows both () and Result<()> return types
pub trait IntoResult {
    fn into_result(self) -> anyhow::Result<()>;
}

impl IntoResult for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl IntoResult for anyhow::Result<()> {
    fn into_result(self) -> anyhow::Result<()> {
        self
    }
}

impl IntoResult for ContainerResult<()> {
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(anyhow::Error::from)
    }
}

// 重新导出常用类型
pub use app::{RunningApplication, TrellisApplication};
pub use bean::{BeanDefinition, BeanRecipe, Capability, Dependency, FunctionFactory, Selector};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory,
    FactoryState, ListableBeanFactory,
};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use context::{
    ApplicationContext, ApplicationContextBuilder, DefinitionOverride, ShutdownHook,
};
pub use error::{ContainerError, ContainerResult, HookPhase};
pub use instance::{InstanceRecord, InstanceState};
pub use lifecycle::{Lifecycle, LifecycleCoordinator};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use provider::ObjectProvider;
pub use registry::Registry;
pub use request::RequestScope;
pub use resolver::Dependencies;
pub use scope::Scope;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::{RunningApplication, TrellisApplication};
    pub use crate::bean::{BeanDefinition, Capability, Dependency, FunctionFactory};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory,
        ListableBeanFactory,
    };
    pub use crate::config::{
        self, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
        PropertySource, TomlPropertySource,
    };
    pub use crate::context::{ApplicationContext, ApplicationContextBuilder};
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::Lifecycle;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::provider::ObjectProvider;
    pub use crate::request::RequestScope;
    pub use crate::resolver::Dependencies;
    pub use crate::scope::Scope;
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
