use crate::bean::BeanDefinition;
use crate::config::{Environment, EnvironmentPropertySource, TomlPropertySource};
use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX, PROFILES_ACTIVE_KEY};
use crate::context::{ApplicationContext, ApplicationContextBuilder};
use crate::error::ContainerResult;
use crate::logging::LoggingConfig;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

type Initializer = Box<dyn Fn(&Arc<ApplicationContext>) -> ContainerResult<()> + Send + Sync>;

/// Trellis 应用程序
///
/// 提供便捷的应用启动方式：加载配置文件和环境变量、初始化日志、
/// 注册 Bean、启动容器。
pub struct TrellisApplication {
    /// 应用名称
    name: String,

    /// 配置文件路径
    config_files: Vec<String>,

    /// 环境变量前缀
    env_prefix: String,

    /// 激活的 profiles
    profiles: Vec<String>,

    /// 是否显示 banner
    show_banner: bool,

    /// 日志配置
    logging_config: Option<LoggingConfig>,

    definitions: Vec<BeanDefinition>,

    /// 自定义初始化函数
    initializers: Vec<Initializer>,
}

impl TrellisApplication {
    /// 创建新的应用
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec![DEFAULT_CONFIG_FILE.to_string()],
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            profiles: Vec::new(),
            show_banner: true,
            logging_config: None,
            definitions: Vec::new(),
            initializers: Vec::new(),
        }
    }

    /// 设置配置文件路径
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    /// 添加多个配置文件
    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    /// 设置环境变量前缀
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 设置激活的 profiles
    pub fn profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    /// 设置是否显示 banner
    pub fn banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    /// 设置日志配置
    ///
    /// 如果不设置，将从 `[logging]` 配置和环境变量读取
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 注册 Bean 定义
    pub fn register(mut self, definition: BeanDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// 添加初始化器，在容器启动之前执行
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<ApplicationContext>) -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.initializers.push(Box::new(f));
        self
    }

    /// 运行应用
    pub fn run(self) -> ContainerResult<RunningApplication> {
        // 记录启动开始时间
        let start_time = std::time::Instant::now();

        // 解析 active profiles
        // 优先级：代码设置 > 配置键 profiles.active（环境变量 APP_PROFILES_ACTIVE）
        let active_profiles = self.resolve_profiles()?;

        // 加载配置文件（按优先级：default -> profile specific -> environment）
        let mut builder = ApplicationContext::builder();
        self.load_configurations(&mut builder, &active_profiles)?;
        builder = builder
            .add_property_source(Box::new(EnvironmentPropertySource::new(&self.env_prefix)))
            .set_active_profiles(active_profiles.clone());

        for definition in self.definitions {
            builder = builder.register(definition);
        }
        let context = builder.build()?;

        // 初始化日志系统
        let logging_config = match self.logging_config {
            Some(config) => config,
            None => LoggingConfig::from_environment(context.environment())?,
        };
        if let Err(e) = logging_config.init() {
            // 已有全局 subscriber 时沿用它
            tracing::debug!("Keeping existing tracing subscriber: {}", e);
        }

        if self.show_banner {
            print_banner();
        }

        tracing::info!("Starting {} application", self.name);
        if active_profiles.is_empty() {
            tracing::info!("No active profiles set, using default configuration");
        } else {
            tracing::info!("Active profiles: {:?}", active_profiles);
        }
        tracing::debug!("Environment variable prefix: {}", self.env_prefix);

        for initializer in &self.initializers {
            initializer(&context)?;
        }

        context.start()?;

        tracing::info!(
            "Started {} in {}ms",
            self.name,
            start_time.elapsed().as_millis()
        );

        Ok(RunningApplication {
            name: self.name,
            context,
        })
    }

    fn resolve_profiles(&self) -> ContainerResult<Vec<String>> {
        if !self.profiles.is_empty() {
            return Ok(self.profiles.clone());
        }

        let probe = Environment::new();
        for config_file in &self.config_files {
            if Path::new(config_file).exists() {
                probe.add_property_source(Box::new(TomlPropertySource::from_file(config_file)?));
            }
        }
        probe.add_property_source(Box::new(EnvironmentPropertySource::new(&self.env_prefix)));

        Ok(probe
            .get_string_array(PROFILES_ACTIVE_KEY)
            .unwrap_or_default())
    }

    /// 加载配置文件
    ///
    /// 加载顺序（优先级从低到高）：
    /// 1. application.toml (default)
    /// 2. application-{profile}.toml (profile specific)
    fn load_configurations(
        &self,
        builder: &mut ApplicationContextBuilder,
        active_profiles: &[String],
    ) -> ContainerResult<()> {
        for base_config in &self.config_files {
            try_load_config_file(builder, base_config, 0)?;
        }

        for (index, profile) in active_profiles.iter().enumerate() {
            for base_config in &self.config_files {
                let profile_config = profile_config_path(base_config, profile);
                try_load_config_file(builder, &profile_config, 10 + index as i32)?;
            }
        }

        Ok(())
    }
}

impl Default for TrellisApplication {
    fn default() -> Self {
        Self::new("TrellisApplication")
    }
}

/// 获取 profile 配置文件路径
///
/// 例如：application.toml -> application-dev.toml
fn profile_config_path(base_path: &str, profile: &str) -> String {
    match base_path.rfind('.') {
        Some(dot_pos) => {
            let (name, ext) = base_path.split_at(dot_pos);
            format!("{}-{}{}", name, profile, ext)
        }
        None => format!("{}-{}", base_path, profile),
    }
}

/// 文件不存在时跳过，格式错误时报错
fn try_load_config_file(
    builder: &mut ApplicationContextBuilder,
    config_file: &str,
    priority: i32,
) -> ContainerResult<()> {
    if !Path::new(config_file).exists() {
        tracing::debug!("Configuration file not found: {}", config_file);
        return Ok(());
    }
    let source = TomlPropertySource::from_file(config_file)?;
    tracing::info!(
        "Loaded configuration from: {} (priority: {})",
        config_file,
        priority
    );
    builder.add_property_source_mut(Box::new(source.with_priority(priority)));
    Ok(())
}

fn print_banner() {
    println!();
    println!(r"  _             _ _ _     ");
    println!(r" | |_ _ __ ___ | | (_)___ ");
    println!(r" | __| '__/ _ \| | | / __|");
    println!(r" | |_| | |  __/| | | \__ \");
    println!(r"  \__|_|  \___||_|_|_|___/");
    println!();
    println!("  :: Trellis ::        (v{})", env!("CARGO_PKG_VERSION"));
    println!();
}

/// 已启动的应用，关闭时销毁容器中的 Bean
pub struct RunningApplication {
    name: String,
    context: Arc<ApplicationContext>,
}

impl RunningApplication {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<ApplicationContext> {
        &self.context
    }

    /// 关闭应用
    pub fn shutdown(self) -> ContainerResult<()> {
        tracing::info!("Shutting down {}", self.name);
        self.context.shutdown()
    }
}

impl Deref for RunningApplication {
    type Target = ApplicationContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean_factory::BeanFactoryExt;
    use std::io::Write;

    struct Greeting(String);

    #[test]
    fn test_profile_config_path() {
        assert_eq!(
            profile_config_path("application.toml", "dev"),
            "application-dev.toml"
        );
        assert_eq!(profile_config_path("config/app", "prod"), "config/app-prod");
    }

    #[test]
    fn test_run_loads_profile_overlay() {
        let dir = std::env::temp_dir().join(format!("trellis-app-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("application.toml");
        std::fs::File::create(&base)
            .unwrap()
            .write_all(b"[greeting]\ntext = \"hello\"\nsuffix = \"!\"\n")
            .unwrap();
        std::fs::File::create(dir.join("application-dev.toml"))
            .unwrap()
            .write_all(b"[greeting]\ntext = \"hello dev\"\n")
            .unwrap();

        let app = TrellisApplication::new("test")
            .config_file(base.to_string_lossy().to_string())
            .env_prefix("TRELLIS_APP_TEST_")
            .profiles(vec!["dev".to_string()])
            .banner(false)
            .initializer(|context| {
                let environment = Arc::clone(context.environment());
                context.register_singleton("greeting", move || {
                    Ok(Greeting(format!(
                        "{}{}",
                        environment.get_string_or("greeting.text", "?"),
                        environment.get_string_or("greeting.suffix", "")
                    )))
                })
            })
            .run()
            .unwrap();

        assert_eq!(app.get_bean_by_type::<Greeting>().unwrap().0, "hello dev!");
        assert!(app.environment().accepts_profiles("dev"));
        app.shutdown().unwrap();

        std::fs::remove_dir_all(&dir).ok();
    }
}
