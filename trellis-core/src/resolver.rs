//! 依赖解析
//!
//! [`Resolver`] 负责从注册表中为一个依赖选出候选定义（名称、qualifier、
//! primary 消歧），并在启动时校验整个依赖图。实例的构造由
//! [`DefaultListableBeanFactory`](crate::DefaultListableBeanFactory) 完成，
//! 构造函数拿到的是已解析好的 [`Dependencies`]。

use std::collections::HashMap;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BoxedBean, Capability, Dependency, Selector};
use crate::error::{ContainerError, ContainerResult};
use crate::provider::ObjectProvider;
use crate::registry::Registry;
use crate::request::RequestState;
use crate::utils::dependency::{validate_dependency_graph, DependencyValidationError};
use crate::Scope;

/// 单个依赖的解析结果（类型擦除）
pub enum ResolvedDependency {
    /// 转换后的 `Arc<C>`
    Single(BoxedBean),
    /// 可选依赖没有候选
    Absent,
    /// 集合依赖：`(名称, Arc<C>)`，注册顺序
    Many(Vec<(String, BoxedBean)>),
    /// `ObjectProvider<C>`
    Provider(BoxedBean),
}

impl ResolvedDependency {
    pub fn as_single<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        match self {
            ResolvedDependency::Single(bean) => bean.downcast_ref::<Arc<C>>().cloned(),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ResolvedDependency::Absent)
    }

    pub fn as_many<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Vec<(String, Arc<C>)>> {
        match self {
            ResolvedDependency::Many(beans) => beans
                .iter()
                .map(|(name, bean)| {
                    bean.downcast_ref::<Arc<C>>()
                        .map(|typed| (name.clone(), Arc::clone(typed)))
                })
                .collect(),
            _ => None,
        }
    }

    pub fn as_provider<C: ?Sized + Send + Sync + 'static>(&self) -> Option<ObjectProvider<C>> {
        match self {
            ResolvedDependency::Provider(provider) => {
                provider.downcast_ref::<ObjectProvider<C>>().cloned()
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for ResolvedDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedDependency::Single(_) => f.write_str("Single"),
            ResolvedDependency::Absent => f.write_str("Absent"),
            ResolvedDependency::Many(beans) => f
                .debug_list()
                .entries(beans.iter().map(|(name, _)| name))
                .finish(),
            ResolvedDependency::Provider(_) => f.write_str("Provider"),
        }
    }
}

/// 构造函数收到的已解析依赖，按声明顺序通过下标访问
///
/// ```ignore
/// BeanDefinition::of("orderService", |deps| {
///     Ok(OrderServiceImpl::new(deps.get::<dyn MemberRepository>(0)?, deps.get::<dyn DiscountPolicy>(1)?))
/// })
/// .with_dependency(Dependency::on::<dyn MemberRepository>())
/// .with_dependency(Dependency::on::<dyn DiscountPolicy>().qualified("mainDiscountPolicy"))
/// ```
#[derive(Debug)]
pub struct Dependencies {
    bean: String,
    resolved: Vec<ResolvedDependency>,
}

impl Dependencies {
    pub(crate) fn new(bean: impl Into<String>, resolved: Vec<ResolvedDependency>) -> Self {
        Self {
            bean: bean.into(),
            resolved,
        }
    }

    /// 正在构造的 Bean 名称
    pub fn bean_name(&self) -> &str {
        &self.bean
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// 获取第 `index` 个依赖
    pub fn get<C: ?Sized + Send + Sync + 'static>(&self, index: usize) -> ContainerResult<Arc<C>> {
        match self.slot(index)? {
            ResolvedDependency::Absent => Err(ContainerError::not_found(format!(
                "optional dependency #{} of bean '{}'",
                index, self.bean
            ))),
            resolved => resolved
                .as_single::<C>()
                .ok_or_else(|| self.mismatch::<C>(index)),
        }
    }

    /// 获取第 `index` 个可选依赖
    pub fn optional<C: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> ContainerResult<Option<Arc<C>>> {
        match self.slot(index)? {
            ResolvedDependency::Absent => Ok(None),
            resolved => resolved
                .as_single::<C>()
                .map(Some)
                .ok_or_else(|| self.mismatch::<C>(index)),
        }
    }

    /// 获取第 `index` 个集合依赖（注册顺序）
    pub fn all<C: ?Sized + Send + Sync + 'static>(&self, index: usize) -> ContainerResult<Vec<Arc<C>>> {
        Ok(self
            .all_named::<C>(index)?
            .into_iter()
            .map(|(_, bean)| bean)
            .collect())
    }

    /// 获取第 `index` 个集合依赖，附带 Bean 名称
    pub fn all_named<C: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> ContainerResult<Vec<(String, Arc<C>)>> {
        self.slot(index)?
            .as_many::<C>()
            .ok_or_else(|| self.mismatch::<C>(index))
    }

    /// 获取第 `index` 个延迟依赖
    pub fn provider<C: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> ContainerResult<ObjectProvider<C>> {
        self.slot(index)?
            .as_provider::<C>()
            .ok_or_else(|| self.mismatch::<C>(index))
    }

    fn slot(&self, index: usize) -> ContainerResult<&ResolvedDependency> {
        self.resolved.get(index).ok_or_else(|| ContainerError::TypeMismatch {
            bean: self.bean.clone(),
            expected: format!(
                "dependency #{} (only {} declared)",
                index,
                self.resolved.len()
            ),
        })
    }

    fn mismatch<C: ?Sized + 'static>(&self, index: usize) -> ContainerError {
        ContainerError::TypeMismatch {
            bean: self.bean.clone(),
            expected: format!("dependency #{} as '{}'", index, std::any::type_name::<C>()),
        }
    }
}

/// 一条解析链的状态
///
/// `stack` 记录正在构造的 Bean，用于检测循环依赖；`request` 是当前请求作用域。
pub(crate) struct ResolutionContext {
    stack: Vec<String>,
    request: Option<Arc<RequestState>>,
}

impl ResolutionContext {
    pub(crate) fn new(request: Option<Arc<RequestState>>) -> Self {
        Self {
            stack: Vec::new(),
            request,
        }
    }

    /// 进入一个 Bean 的构造；已在链上时返回完整的环
    pub(crate) fn enter(&mut self, name: &str) -> ContainerResult<()> {
        if let Some(position) = self.stack.iter().position(|n| n == name) {
            let mut path = self.stack[position..].to_vec();
            path.push(name.to_string());
            return Err(ContainerError::CircularDependency { path });
        }
        self.stack.push(name.to_string());
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn request(&self) -> Option<&Arc<RequestState>> {
        self.request.as_ref()
    }

    /// 单例在容器上下文中构造，暂时移除请求作用域
    pub(crate) fn take_request(&mut self) -> Option<Arc<RequestState>> {
        self.request.take()
    }

    pub(crate) fn restore_request(&mut self, request: Option<Arc<RequestState>>) {
        self.request = request;
    }
}

/// 候选选择与依赖图校验
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// 满足能力的所有定义（注册顺序）
    pub fn candidates(&self, capability: Capability) -> Vec<Arc<BeanDefinition>> {
        self.registry.find_by_capability(capability)
    }

    /// 为按名称或按类型的依赖选出唯一的定义
    ///
    /// 可选依赖没有候选时返回 `Ok(None)`。
    pub fn select(&self, dependency: &Dependency) -> ContainerResult<Option<Arc<BeanDefinition>>> {
        let capability = dependency.capability();

        let selected = match dependency.selector() {
            Selector::Named(name) => match self.registry.find_by_name(name) {
                Ok(definition) if definition.satisfies(capability) => Ok(definition),
                Ok(definition) => Err(ContainerError::TypeMismatch {
                    bean: definition.name().to_string(),
                    expected: capability.type_name().to_string(),
                }),
                Err(e) => Err(e),
            },
            Selector::Unique { qualifier } | Selector::Provider { qualifier } => {
                self.select_unique(dependency, qualifier.as_deref())
            }
            Selector::All => {
                return Err(ContainerError::InvalidConfiguration(format!(
                    "{} cannot be narrowed to a single bean",
                    dependency.describe()
                )))
            }
        };

        match selected {
            Ok(definition) => Ok(Some(definition)),
            Err(ContainerError::NotFound { .. }) if dependency.is_optional() => {
                tracing::trace!("Optional {} is absent", dependency.describe());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn select_unique(
        &self,
        dependency: &Dependency,
        qualifier: Option<&str>,
    ) -> ContainerResult<Arc<BeanDefinition>> {
        let mut candidates = self.candidates(dependency.capability());

        if let Some(qualifier) = qualifier {
            candidates.retain(|definition| definition.matches_qualifier(qualifier));
        }

        if candidates.len() > 1 {
            let primary: Vec<_> = candidates
                .iter()
                .filter(|definition| definition.is_primary())
                .cloned()
                .collect();
            if primary.len() == 1 {
                candidates = primary;
            }
        }

        match candidates.len() {
            0 => Err(ContainerError::not_found(dependency.describe())),
            1 => Ok(candidates.remove(0)),
            _ => Err(ContainerError::AmbiguousDependency {
                capability: dependency.capability().type_name().to_string(),
                candidates: candidates
                    .iter()
                    .map(|definition| definition.name().to_string())
                    .collect(),
            }),
        }
    }

    /// 启动前校验依赖图
    ///
    /// - 必需依赖都能解析到唯一的候选
    /// - 没有循环依赖（provider 依赖不参与）
    /// - 单例不直接依赖请求作用域的 Bean
    pub fn validate(&self) -> ContainerResult<()> {
        let definitions = self.registry.definitions();
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();

        for definition in &definitions {
            let mut edges = Vec::new();

            for dependency in definition.dependencies() {
                let targets = match dependency.selector() {
                    Selector::Provider { .. } => continue,
                    Selector::All => self.candidates(dependency.capability()),
                    _ => self.select(dependency)?.into_iter().collect(),
                };

                for target in targets {
                    if definition.scope() == Scope::Singleton && target.scope() == Scope::Request {
                        return Err(ContainerError::InvalidConfiguration(format!(
                            "singleton bean '{}' depends directly on request scoped bean '{}'; inject an ObjectProvider instead",
                            definition.name(),
                            target.name()
                        )));
                    }
                    edges.push(target.name().to_string());
                }
            }

            graph.insert(definition.name().to_string(), edges);
        }

        let order: Vec<String> = definitions
            .iter()
            .map(|definition| definition.name().to_string())
            .collect();

        validate_dependency_graph(&order, &graph).map_err(|e| match e {
            DependencyValidationError::CircularDependency { cycle } => {
                ContainerError::CircularDependency { path: cycle }
            }
            DependencyValidationError::MissingDependency { missing, .. } => {
                ContainerError::not_found(format!("bean named '{}'", missing))
            }
        })?;

        tracing::info!("Dependency validation passed for {} bean(s)", order.len());
        Ok(())
    }
}
