//! ObjectProvider - 延迟查找
//!
//! 注入 provider 不会构造目标 Bean，每次调用 `get` 时才解析。
//! 单例需要使用请求作用域的 Bean 时，注入 provider 并在请求中调用
//! [`ObjectProvider::get_in`]。

use std::fmt;
use std::sync::{Arc, Weak};

use crate::bean::{BoxedBean, Dependency};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};
use crate::request::RequestScope;

pub struct ObjectProvider<C: ?Sized> {
    factory: Weak<DefaultListableBeanFactory>,
    dependency: Dependency,
    _marker: std::marker::PhantomData<fn() -> Arc<C>>,
}

impl<C: ?Sized + Send + Sync + 'static> ObjectProvider<C> {
    pub(crate) fn new(factory: Weak<DefaultListableBeanFactory>, dependency: Dependency) -> Self {
        Self {
            factory,
            dependency,
            _marker: std::marker::PhantomData,
        }
    }

    /// 在容器上下文中解析目标 Bean
    pub fn get(&self) -> ContainerResult<Arc<C>> {
        let factory = self.factory()?;
        self.single(factory.as_ref())
    }

    /// 目标不存在时返回 `None`，其他错误照常返回
    pub fn get_if_available(&self) -> ContainerResult<Option<Arc<C>>> {
        match self.get() {
            Ok(bean) => Ok(Some(bean)),
            Err(ContainerError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 在给定的请求作用域中解析目标 Bean
    pub fn get_in(&self, request: &RequestScope) -> ContainerResult<Arc<C>> {
        self.single(request)
    }

    /// 目标依赖的描述
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    fn factory(&self) -> ContainerResult<Arc<DefaultListableBeanFactory>> {
        self.factory.upgrade().ok_or(ContainerError::ContainerShutDown)
    }

    fn single(&self, factory: &dyn BeanFactory) -> ContainerResult<Arc<C>> {
        factory
            .resolve_dependency(&self.dependency)?
            .as_single::<C>()
            .ok_or_else(|| ContainerError::TypeMismatch {
                bean: self.dependency.describe(),
                expected: std::any::type_name::<C>().to_string(),
            })
    }
}

impl<C: ?Sized> Clone for ObjectProvider<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Weak::clone(&self.factory),
            dependency: self.dependency.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<C: ?Sized> fmt::Debug for ObjectProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProvider")
            .field("dependency", &self.dependency.describe())
            .finish()
    }
}

/// 构造类型擦除的 provider，供 [`Dependency::provider`] 使用
pub(crate) fn erased_provider<C: ?Sized + Send + Sync + 'static>(
    factory: Weak<DefaultListableBeanFactory>,
    dependency: Dependency,
) -> BoxedBean {
    Box::new(ObjectProvider::<C>::new(factory, dependency))
}
