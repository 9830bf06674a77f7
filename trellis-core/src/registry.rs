//! Bean 定义注册表
//!
//! 保存所有 [`BeanDefinition`]，按名称和能力查找。定义在注册后不可变，
//! 注册表在容器启动后冻结。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, Capability};
use crate::error::{ContainerError, ContainerResult};

#[derive(Default)]
struct RegistryInner {
    /// 按注册顺序保存
    definitions: Vec<Arc<BeanDefinition>>,
    by_name: HashMap<String, usize>,
    frozen: bool,
}

/// Bean 定义注册表
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Bean 定义
    ///
    /// 名称已存在时返回 `DuplicateRegistration`，先注册的定义保持不变。
    pub fn register(&self, definition: BeanDefinition) -> ContainerResult<()> {
        definition.validate_types()?;

        let mut inner = self.inner.write();
        let name = definition.name().to_string();

        if inner.frozen {
            return Err(ContainerError::ConfigurationFrozen { name });
        }

        if inner.by_name.contains_key(&name) {
            tracing::warn!("Bean '{}' already exists, registration failed", name);
            return Err(ContainerError::DuplicateRegistration { name });
        }

        tracing::debug!(
            "Bean definition registered: name='{}', type='{}', scope={}",
            name,
            definition.type_name(),
            definition.scope()
        );

        let index = inner.definitions.len();
        inner.definitions.push(Arc::new(definition));
        inner.by_name.insert(name, index);
        Ok(())
    }

    /// 按名称精确查找
    pub fn find_by_name(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(name)
            .map(|&index| Arc::clone(&inner.definitions[index]))
            .ok_or_else(|| ContainerError::not_found(format!("bean named '{}'", name)))
    }

    /// 按能力查找所有匹配的定义（注册顺序）
    pub fn find_by_capability(&self, capability: Capability) -> Vec<Arc<BeanDefinition>> {
        self.inner
            .read()
            .definitions
            .iter()
            .filter(|definition| definition.satisfies(capability))
            .cloned()
            .collect()
    }

    pub fn names_for_capability(&self, capability: Capability) -> Vec<String> {
        self.find_by_capability(capability)
            .iter()
            .map(|definition| definition.name().to_string())
            .collect()
    }

    /// 所有 Bean 名称（注册顺序）
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .definitions
            .iter()
            .map(|definition| definition.name().to_string())
            .collect()
    }

    /// 所有定义的快照（注册顺序）
    pub fn definitions(&self) -> Vec<Arc<BeanDefinition>> {
        self.inner.read().definitions.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 冻结注册表，之后的注册返回 `ConfigurationFrozen`
    pub fn freeze(&self) {
        self.inner.write().frozen = true;
        tracing::debug!("Bean registry frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
