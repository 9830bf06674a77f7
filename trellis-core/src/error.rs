//! 容器统一错误类型
//!
//! 注册、解析、作用域和生命周期相关的错误都汇总到 [`ContainerError`]。
//! 用户提供的构造函数和回调返回 `anyhow::Result`，由容器包装成
//! [`ContainerError::BeanCreationFailed`] 或 [`ContainerError::LifecycleHookFailure`]。

use std::fmt;
use thiserror::Error;

/// 容器操作的结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 生命周期回调所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// 初始化回调（@PostConstruct）
    Init,
    /// 销毁回调（@PreDestroy）
    Destroy,
    /// 容器级 shutdown hook
    Shutdown,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Init => write!(f, "init"),
            HookPhase::Destroy => write!(f, "destroy"),
            HookPhase::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContainerError {
    /// 按名称或类型都找不到匹配的 Bean，且依赖不是可选的
    #[error("no bean found for {reference}")]
    NotFound { reference: String },

    /// 同一类型有多个候选，且没有 qualifier 或唯一的 primary 来消歧
    #[error("expected a single bean of type '{capability}' but found {}: [{}]", .candidates.len(), .candidates.join(", "))]
    AmbiguousDependency {
        capability: String,
        candidates: Vec<String>,
    },

    /// 解析图中存在环
    #[error("circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("bean '{name}' is already registered")]
    DuplicateRegistration { name: String },

    #[error("{phase} callback of bean '{bean}' failed: {source}")]
    LifecycleHookFailure {
        bean: String,
        phase: HookPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create bean '{bean}': {source}")]
    BeanCreationFailed {
        bean: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("bean '{bean}' cannot be used as '{expected}'")]
    TypeMismatch { bean: String, expected: String },

    /// request 作用域的 Bean 在请求作用域之外被访问
    #[error("bean '{bean}' is request scoped but no request scope is active")]
    ScopeNotActive { bean: String },

    #[error("container has been shut down")]
    ContainerShutDown,

    #[error("cannot register bean '{name}': configuration is frozen")]
    ConfigurationFrozen { name: String },

    /// shutdown 过程中收集到的所有回调失败
    #[error("{} lifecycle callback(s) failed during shutdown", .0.len())]
    ShutdownIncomplete(Vec<ContainerError>),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to initialize logging: {0}")]
    LoggingInitFailed(String),
}

impl ContainerError {
    pub(crate) fn not_found(reference: impl Into<String>) -> Self {
        ContainerError::NotFound {
            reference: reference.into(),
        }
    }

    /// 构造函数返回的错误：容器自身的错误原样透传，其余包装为 BeanCreationFailed
    pub(crate) fn from_recipe(bean: &str, error: anyhow::Error) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(container_error) => container_error,
            Err(source) => ContainerError::BeanCreationFailed {
                bean: bean.to_string(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound { .. })
    }
}
