//! 生命周期回调演示

use parking_lot::Mutex;
use trellis_core::Lifecycle;

/// 模拟外部网络连接：创建后连接，容器关闭前断开
pub struct NetworkClient {
    url: String,
    events: Mutex<Vec<String>>,
}

impl NetworkClient {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        tracing::info!("NetworkClient constructed, url = {}", url);
        Self {
            url,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect(&self) {
        tracing::info!("connect: {}", self.url);
        self.events.lock().push("connected".to_string());
    }

    pub fn call(&self, message: &str) {
        tracing::info!("call: {}, message = {}", self.url, message);
        self.events.lock().push(format!("call: {}", message));
    }

    fn disconnect(&self) {
        tracing::info!("close: {}", self.url);
        self.events.lock().push("disconnected".to_string());
    }

    /// 连接事件记录
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl Lifecycle for NetworkClient {
    fn init(&mut self) -> anyhow::Result<()> {
        self.connect();
        self.call("initial connection message");
        Ok(())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        self.disconnect();
        Ok(())
    }
}
