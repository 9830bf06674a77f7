//! Bean 实例记录
//!
//! 实例状态只能单向推进：Created -> Initialized -> Active -> Destroyed。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{BeanDefinition, BoxedBean, SharedBean};
use crate::Scope;

/// 实例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceState {
    /// 构造函数已返回
    Created,
    /// init 回调已执行（或没有 init 回调）
    Initialized,
    /// 已分配构造序号，可以被共享
    Active,
    /// destroy 回调已执行（或已被认领）
    Destroyed,
}

/// 尚未共享的实例，init 回调可以获得独占访问
pub(crate) struct PendingInstance {
    definition: Arc<BeanDefinition>,
    value: BoxedBean,
    state: InstanceState,
}

impl PendingInstance {
    pub(crate) fn new(definition: Arc<BeanDefinition>, value: BoxedBean) -> Self {
        Self {
            definition,
            value,
            state: InstanceState::Created,
        }
    }

    pub(crate) fn definition(&self) -> &Arc<BeanDefinition> {
        &self.definition
    }

    pub(crate) fn value_mut(&mut self) -> &mut dyn Any {
        &mut *self.value
    }

    pub(crate) fn mark_initialized(&mut self) {
        debug_assert_eq!(self.state, InstanceState::Created);
        self.state = InstanceState::Initialized;
    }

    /// 分配构造序号并转为可共享的记录
    pub(crate) fn activate(self, sequence: u64) -> InstanceRecord {
        debug_assert_eq!(self.state, InstanceState::Initialized);
        InstanceRecord {
            definition: self.definition,
            bean: SharedBean::from(self.value),
            sequence,
            state: Mutex::new(InstanceState::Active),
        }
    }
}

/// 已激活的实例
pub struct InstanceRecord {
    definition: Arc<BeanDefinition>,
    bean: SharedBean,
    sequence: u64,
    state: Mutex<InstanceState>,
}

impl InstanceRecord {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn scope(&self) -> Scope {
        self.definition.scope()
    }

    /// 构造序号，越大表示越晚完成构造
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> InstanceState {
        *self.state.lock()
    }

    pub fn bean(&self) -> SharedBean {
        Arc::clone(&self.bean)
    }

    pub fn definition(&self) -> &Arc<BeanDefinition> {
        &self.definition
    }

    /// 认领销毁权，保证 destroy 回调最多执行一次
    pub(crate) fn begin_destroy(&self) -> bool {
        let mut state = self.state.lock();
        if *state == InstanceState::Destroyed {
            return false;
        }
        *state = InstanceState::Destroyed;
        true
    }
}

impl fmt::Debug for InstanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRecord")
            .field("name", &self.name())
            .field("scope", &self.scope())
            .field("sequence", &self.sequence)
            .field("state", &self.state())
            .finish()
    }
}
