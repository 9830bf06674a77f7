use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bean 的作用域（生命周期策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// 单例模式（shared）- 容器中只有一个实例，关闭时由容器销毁
    #[default]
    #[serde(alias = "shared")]
    Singleton,

    /// 请求模式（per-request）- 每个请求作用域一个实例，作用域结束时销毁
    #[serde(alias = "per-request")]
    Request,

    /// 原型模式（unmanaged）- 每次获取都创建新实例，容器不负责销毁
    #[serde(alias = "unmanaged")]
    Prototype,
}

impl Scope {
    /// 容器（或请求作用域）是否负责调用销毁回调
    pub fn is_container_managed(&self) -> bool {
        !matches!(self, Scope::Prototype)
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "singleton" | "shared" => Ok(Scope::Singleton),
            "request" | "per-request" => Ok(Scope::Request),
            "prototype" | "unmanaged" => Ok(Scope::Prototype),
            _ => Err(format!("Invalid scope: {}", s)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "singleton"),
            Scope::Request => write!(f, "request"),
            Scope::Prototype => write!(f, "prototype"),
        }
    }
}
