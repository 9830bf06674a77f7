// hello-core: trellis 容器的完整演示
//
// 会员、订单和折扣策略通过构造函数注入装配；NetworkClient 演示生命周期回调；
// MyLogger 演示请求作用域和 ObjectProvider。

pub mod app_config;
pub mod discount;
pub mod member;
pub mod network;
pub mod order;
pub mod web;

use trellis_core::prelude::*;

/// 按给定配置文件创建并启动应用
pub fn application(config_file: &str) -> TrellisApplication {
    app_config::bean_definitions()
        .into_iter()
        .fold(TrellisApplication::new("HelloCore").config_file(config_file), |app, definition| {
            app.register(definition)
        })
}
