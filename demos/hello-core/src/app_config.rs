//! Bean 装配
//!
//! 所有组件在这里显式注册。`[beans.*]` 配置表可以覆盖 scope、primary、lazy。

use std::sync::Arc;

use trellis_core::prelude::*;

use crate::discount::{
    DiscountPolicy, DiscountProperties, DiscountService, FixDiscountPolicy, RateDiscountPolicy,
};
use crate::member::{MemberRepository, MemberService, MemberServiceImpl, MemoryMemberRepository};
use crate::network::NetworkClient;
use crate::order::{OrderService, OrderServiceImpl};
use crate::web::{LogDemoController, LogDemoService, MyLogger};

/// 主折扣策略的 qualifier
pub const MAIN_DISCOUNT_POLICY: &str = "mainDiscountPolicy";

pub fn bean_definitions() -> Vec<BeanDefinition> {
    vec![
        // 会员
        BeanDefinition::for_type(|_| Ok(MemoryMemberRepository::new()))
            .provides(|r: Arc<MemoryMemberRepository>| r as Arc<dyn MemberRepository>),
        BeanDefinition::of("memberService", |deps| {
            Ok(MemberServiceImpl::new(deps.get::<dyn MemberRepository>(0)?))
        })
        .with_dependency(Dependency::on::<dyn MemberRepository>())
        .provides(|s: Arc<MemberServiceImpl>| s as Arc<dyn MemberService>),
        // 折扣
        BeanDefinition::for_type(|deps| {
            let properties: DiscountProperties = deps.get::<Environment>(0)?.bind("discount")?;
            Ok(FixDiscountPolicy::new(properties.fix_amount))
        })
        .with_dependency(Dependency::on::<Environment>())
        .provides(|p: Arc<FixDiscountPolicy>| p as Arc<dyn DiscountPolicy>),
        BeanDefinition::for_type(|deps| {
            let properties: DiscountProperties = deps.get::<Environment>(0)?.bind("discount")?;
            Ok(RateDiscountPolicy::new(properties.rate))
        })
        .with_dependency(Dependency::on::<Environment>())
        .with_qualifier(MAIN_DISCOUNT_POLICY)
        .provides(|p: Arc<RateDiscountPolicy>| p as Arc<dyn DiscountPolicy>),
        BeanDefinition::for_type(|deps| {
            Ok(DiscountService::new(deps.all_named::<dyn DiscountPolicy>(0)?))
        })
        .with_dependency(Dependency::all::<dyn DiscountPolicy>()),
        // 订单
        BeanDefinition::of("orderService", |deps| {
            Ok(OrderServiceImpl::new(
                deps.get::<dyn MemberRepository>(0)?,
                deps.get::<dyn DiscountPolicy>(1)?,
            ))
        })
        .with_dependency(Dependency::on::<dyn MemberRepository>())
        .with_dependency(Dependency::on::<dyn DiscountPolicy>().qualified(MAIN_DISCOUNT_POLICY))
        .provides(|s: Arc<OrderServiceImpl>| s as Arc<dyn OrderService>),
        // 生命周期
        BeanDefinition::for_type(|deps| {
            let url = deps
                .get::<Environment>(0)?
                .get_string_or("network.url", "http://localhost:8080");
            Ok(NetworkClient::new(url))
        })
        .with_dependency(Dependency::on::<Environment>())
        .with_lazy(false)
        .with_lifecycle::<NetworkClient>(),
        // 请求作用域
        BeanDefinition::for_type(|_| Ok(MyLogger::new()))
            .with_scope(Scope::Request)
            .with_lifecycle::<MyLogger>(),
        BeanDefinition::for_type(|deps| Ok(LogDemoService::new(deps.provider::<MyLogger>(0)?)))
            .with_dependency(Dependency::provider::<MyLogger>()),
        BeanDefinition::for_type(|deps| {
            Ok(LogDemoController::new(
                deps.get::<LogDemoService>(0)?,
                deps.provider::<MyLogger>(1)?,
            ))
        })
        .with_dependency(Dependency::on::<LogDemoService>())
        .with_dependency(Dependency::provider::<MyLogger>()),
    ]
}
