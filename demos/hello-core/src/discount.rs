//! 折扣策略

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::member::{Grade, Member};

pub trait DiscountPolicy: Send + Sync {
    /// 返回折扣金额
    fn discount(&self, member: &Member, price: u64) -> u64;
}

/// `[discount]` 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscountProperties {
    /// 固定折扣金额
    pub fix_amount: u64,
    /// 比例折扣（百分比）
    pub rate: u64,
}

impl Default for DiscountProperties {
    fn default() -> Self {
        Self {
            fix_amount: 1000,
            rate: 10,
        }
    }
}

/// VIP 固定减免
pub struct FixDiscountPolicy {
    amount: u64,
}

impl FixDiscountPolicy {
    pub fn new(amount: u64) -> Self {
        Self { amount }
    }
}

impl DiscountPolicy for FixDiscountPolicy {
    fn discount(&self, member: &Member, _price: u64) -> u64 {
        match member.grade {
            Grade::Vip => self.amount,
            Grade::Basic => 0,
        }
    }
}

/// VIP 按比例减免
pub struct RateDiscountPolicy {
    rate: u64,
}

impl RateDiscountPolicy {
    pub fn new(rate: u64) -> Self {
        Self { rate }
    }
}

impl DiscountPolicy for RateDiscountPolicy {
    fn discount(&self, member: &Member, price: u64) -> u64 {
        match member.grade {
            Grade::Vip => price * self.rate / 100,
            Grade::Basic => 0,
        }
    }
}

/// 按折扣码选择策略
pub struct DiscountService {
    policies: HashMap<String, Arc<dyn DiscountPolicy>>,
}

impl DiscountService {
    pub fn new(policies: Vec<(String, Arc<dyn DiscountPolicy>)>) -> Self {
        tracing::debug!(
            "DiscountService knows policies: {:?}",
            policies.iter().map(|(name, _)| name).collect::<Vec<_>>()
        );
        Self {
            policies: policies.into_iter().collect(),
        }
    }

    pub fn discount(&self, member: &Member, price: u64, code: &str) -> anyhow::Result<u64> {
        let policy = self
            .policies
            .get(code)
            .ok_or_else(|| anyhow::anyhow!("unknown discount code '{}'", code))?;
        Ok(policy.discount(member, price))
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<_> = self.policies.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
