//! 核心组件和配置键常量定义
//!
//! 容器和应用启动流程使用相同的标识符，避免硬编码

/// Environment 在容器中注册的 Bean 名称
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// Bean 元数据覆盖的配置前缀：`[beans.<name>]`
pub const BEANS_CONFIG_PREFIX: &str = "beans";

/// 日志配置前缀：`[logging]`
pub const LOGGING_CONFIG_PREFIX: &str = "logging";

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "application.toml";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "APP_";

/// 激活 profile 的配置键（环境变量 `APP_PROFILES_ACTIVE`）
pub const PROFILES_ACTIVE_KEY: &str = "profiles.active";
