//! 请求作用域演示
//!
//! `MyLogger` 每个请求一个实例，日志格式为 `[uuid][requestURL] message`。
//! 单例的 controller 和 service 通过 `ObjectProvider` 在请求中获取它。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_core::prelude::*;
use uuid::Uuid;

pub struct MyLogger {
    uuid: String,
    request_url: Mutex<String>,
}

impl MyLogger {
    pub fn new() -> Self {
        Self {
            uuid: String::new(),
            request_url: Mutex::new(String::new()),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn set_request_url(&self, request_url: impl Into<String>) {
        *self.request_url.lock() = request_url.into();
    }

    pub fn log(&self, message: &str) {
        tracing::info!("[{}][{}] {}", self.uuid, self.request_url.lock(), message);
    }
}

impl Default for MyLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for MyLogger {
    fn init(&mut self) -> anyhow::Result<()> {
        self.uuid = Uuid::new_v4().to_string();
        tracing::info!("[{}] request scope bean create", self.uuid);
        Ok(())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        tracing::info!("[{}] request scope bean close", self.uuid);
        Ok(())
    }
}

pub struct LogDemoService {
    logger: ObjectProvider<MyLogger>,
}

impl LogDemoService {
    pub fn new(logger: ObjectProvider<MyLogger>) -> Self {
        Self { logger }
    }

    pub fn logic(&self, request: &RequestScope, id: &str) -> ContainerResult<()> {
        self.logger
            .get_in(request)?
            .log(&format!("service id = {}", id));
        Ok(())
    }
}

pub struct LogDemoController {
    service: Arc<LogDemoService>,
    logger: ObjectProvider<MyLogger>,
}

impl LogDemoController {
    pub fn new(service: Arc<LogDemoService>, logger: ObjectProvider<MyLogger>) -> Self {
        Self { service, logger }
    }

    /// 处理 `log-demo` 请求
    pub async fn log_demo(&self, request: &RequestScope, request_url: &str) -> anyhow::Result<String> {
        let logger = self.logger.get_in(request)?;
        logger.set_request_url(request_url);
        logger.log("controller test");

        tokio::time::sleep(Duration::from_millis(100)).await;

        self.service.logic(request, "testId")?;
        Ok("OK".to_string())
    }
}
