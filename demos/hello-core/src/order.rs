//! 订单

use std::sync::Arc;

use crate::discount::DiscountPolicy;
use crate::member::MemberRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub member_id: u64,
    pub item_name: String,
    pub item_price: u64,
    pub discount_price: u64,
}

impl Order {
    pub fn calculate_price(&self) -> u64 {
        self.item_price.saturating_sub(self.discount_price)
    }
}

pub trait OrderService: Send + Sync {
    fn create_order(&self, member_id: u64, item_name: &str, item_price: u64) -> anyhow::Result<Order>;
}

/// 构造函数注入：会员存储 + 主折扣策略
pub struct OrderServiceImpl {
    member_repository: Arc<dyn MemberRepository>,
    discount_policy: Arc<dyn DiscountPolicy>,
}

impl OrderServiceImpl {
    pub fn new(
        member_repository: Arc<dyn MemberRepository>,
        discount_policy: Arc<dyn DiscountPolicy>,
    ) -> Self {
        Self {
            member_repository,
            discount_policy,
        }
    }

    pub fn member_repository(&self) -> &Arc<dyn MemberRepository> {
        &self.member_repository
    }
}

impl OrderService for OrderServiceImpl {
    fn create_order(&self, member_id: u64, item_name: &str, item_price: u64) -> anyhow::Result<Order> {
        let member = self
            .member_repository
            .find_by_id(member_id)
            .ok_or_else(|| anyhow::anyhow!("member {} not found", member_id))?;
        let discount_price = self.discount_policy.discount(&member, item_price);
        Ok(Order {
            member_id,
            item_name: item_name.to_string(),
            item_price,
            discount_price,
        })
    }
}
