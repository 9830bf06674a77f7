use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::bean_factory::DefaultListableBeanFactory;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::Lifecycle;
use crate::resolver::Dependencies;
use crate::utils::naming;
use crate::{IntoResult, Scope};

/// 容器中共享的 Bean 实例
pub type SharedBean = Arc<dyn Any + Send + Sync>;

/// 类型擦除后的值（构造函数产物，或转换为某个能力后的 `Arc<C>`）
pub type BoxedBean = Box<dyn Any + Send + Sync>;

/// 能力（capability）- Bean 声明可以满足的类型契约
///
/// 具体类型本身总是一种能力；trait object（如 `dyn DiscountPolicy`）
/// 通过 [`BeanDefinition::provides`] 声明。
#[derive(Clone, Copy)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Capability {}

impl std::hash::Hash for Capability {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bean 构造配方 - 用已解析的依赖创建实例
pub trait BeanRecipe: Send + Sync {
    /// 创建 Bean 实例
    fn create(&self, dependencies: &Dependencies) -> anyhow::Result<BoxedBean>;

    /// 把共享实例转换为产物类型本身的 `Arc<T>`
    fn cast_self(&self, bean: SharedBean) -> Option<BoxedBean>;

    /// 产物的类型 ID
    fn product_type_id(&self) -> TypeId;

    /// 产物的类型名称
    fn product_type_name(&self) -> &'static str;
}

/// 简单的函数工厂实现
pub struct FunctionFactory<T, F> {
    factory_fn: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> FunctionFactory<T, F> {
    pub fn new(factory_fn: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync,
    {
        Self {
            factory_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> BeanRecipe for FunctionFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync,
{
    fn create(&self, dependencies: &Dependencies) -> anyhow::Result<BoxedBean> {
        let instance = (self.factory_fn)(dependencies)?;
        Ok(Box::new(instance))
    }

    fn cast_self(&self, bean: SharedBean) -> Option<BoxedBean> {
        bean.downcast::<T>().ok().map(|typed| Box::new(typed) as BoxedBean)
    }

    fn product_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn product_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Caster = Arc<dyn Fn(SharedBean) -> Option<BoxedBean> + Send + Sync>;

/// 额外声明的能力及其转换函数
pub(crate) struct CapabilityBinding {
    capability: Capability,
    source: TypeId,
    cast: Caster,
}

/// 生命周期回调类型
pub(crate) type InitCallback = Box<dyn Fn(&mut dyn Any) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type DestroyCallback = Box<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;

/// 带有目标类型的回调，注册时校验类型与构造配方的产物一致
pub(crate) struct Hook<C> {
    source: TypeId,
    source_name: &'static str,
    callback: C,
}

/// 依赖的选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// 按类型查找唯一的 Bean，可用 qualifier 缩小范围
    Unique { qualifier: Option<String> },
    /// 按名称精确查找
    Named(String),
    /// 该类型的所有 Bean（按注册顺序）
    All,
    /// 延迟查找，注入 [`ObjectProvider`](crate::provider::ObjectProvider)
    Provider { qualifier: Option<String> },
}

pub(crate) type ProviderFactory = fn(Weak<DefaultListableBeanFactory>, Dependency) -> BoxedBean;

/// 依赖描述 - 构造函数需要的一个参数
#[derive(Debug, Clone)]
pub struct Dependency {
    capability: Capability,
    selector: Selector,
    optional: bool,
    provider_factory: Option<ProviderFactory>,
}

impl Dependency {
    /// 按类型注入唯一的 Bean
    pub fn on<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            capability: Capability::of::<C>(),
            selector: Selector::Unique { qualifier: None },
            optional: false,
            provider_factory: None,
        }
    }

    /// 按名称注入，并转换为类型 `C`
    pub fn named<C: ?Sized + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        Self {
            selector: Selector::Named(name.into()),
            ..Self::on::<C>()
        }
    }

    /// 注入类型 `C` 的所有 Bean
    pub fn all<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            selector: Selector::All,
            ..Self::on::<C>()
        }
    }

    /// 注入 `ObjectProvider<C>`，在使用时才解析
    pub fn provider<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            selector: Selector::Provider { qualifier: None },
            provider_factory: Some(crate::provider::erased_provider::<C>),
            ..Self::on::<C>()
        }
    }

    /// 设置 qualifier（匹配 Bean 名称或 qualifier 标签）
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        if let Selector::Unique { qualifier: q } | Selector::Provider { qualifier: q } =
            &mut self.selector
        {
            *q = Some(qualifier.into());
        } else {
            tracing::warn!("Qualifier ignored for dependency on {}", self.describe());
        }
        self
    }

    /// 标记为可选依赖：找不到时注入“缺失”而不是报错
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn provider_factory(&self) -> Option<ProviderFactory> {
        self.provider_factory
    }

    /// 去掉 provider 包装，得到 provider 实际要解析的依赖
    pub(crate) fn provided_target(&self) -> Self {
        let qualifier = match &self.selector {
            Selector::Provider { qualifier } => qualifier.clone(),
            _ => None,
        };
        Self {
            capability: self.capability,
            selector: Selector::Unique { qualifier },
            optional: self.optional,
            provider_factory: None,
        }
    }

    /// 用于错误信息的描述
    pub fn describe(&self) -> String {
        match &self.selector {
            Selector::Named(name) => format!("bean named '{}'", name),
            Selector::Unique { qualifier: Some(q) } | Selector::Provider { qualifier: Some(q) } => {
                format!("bean of type '{}' qualified by '{}'", self.capability, q)
            }
            Selector::Unique { qualifier: None } | Selector::Provider { qualifier: None } => {
                format!("bean of type '{}'", self.capability)
            }
            Selector::All => format!("beans of type '{}'", self.capability),
        }
    }
}

/// Bean 定义 - 描述如何创建和管理 Bean
///
/// 注册后不可变。
pub struct BeanDefinition {
    name: String,
    scope: Scope,
    recipe: Box<dyn BeanRecipe>,
    capabilities: Vec<CapabilityBinding>,
    dependencies: Vec<Dependency>,
    primary: bool,
    qualifiers: Vec<String>,
    lazy: bool,
    init_callback: Option<Hook<InitCallback>>,
    destroy_callback: Option<Hook<DestroyCallback>>,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义
    pub fn new<R>(name: impl Into<String>, recipe: R) -> Self
    where
        R: BeanRecipe + 'static,
    {
        Self {
            name: name.into(),
            scope: Scope::default(),
            recipe: Box::new(recipe),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            primary: false,
            qualifiers: Vec::new(),
            lazy: true,
            init_callback: None,
            destroy_callback: None,
        }
    }

    /// 用闭包创建 Bean 定义
    pub fn of<T, F>(name: impl Into<String>, factory_fn: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(name, FunctionFactory::new(factory_fn))
    }

    /// 以类型名的 camelCase 作为 Bean 名称，例如 `OrderServiceImpl` -> `orderServiceImpl`
    pub fn for_type<T, F>(factory_fn: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = naming::to_camel_case(naming::short_type_name(std::any::type_name::<T>()));
        Self::of(name, factory_fn)
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化（仅对单例有效，默认 true）
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// 追加一个构造依赖
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 设置依赖列表
    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// 标记为同类型候选中的首选 Bean
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// 添加 qualifier 标签
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    /// 声明该 Bean 还可以作为类型 `C` 注入
    ///
    /// ```ignore
    /// BeanDefinition::of("rateDiscountPolicy", |_| Ok(RateDiscountPolicy::default()))
    ///     .provides(|policy: Arc<RateDiscountPolicy>| policy as Arc<dyn DiscountPolicy>);
    /// ```
    pub fn provides<T, C, F>(mut self, cast: F) -> Self
    where
        T: Any + Send + Sync,
        C: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |bean: SharedBean| {
            bean.downcast::<T>()
                .ok()
                .map(|typed| Box::new(cast(typed)) as BoxedBean)
        });
        self.capabilities.push(CapabilityBinding {
            capability: Capability::of::<C>(),
            source: TypeId::of::<T>(),
            cast: caster,
        });
        self
    }

    /// 设置初始化回调（@PostConstruct）
    ///
    /// 回调在所有依赖就绪、实例被共享之前调用，因此可以获得 `&mut T`。
    pub fn with_init<T, F, R>(mut self, init_fn: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let callback: InitCallback = Box::new(move |bean: &mut dyn Any| {
            match bean.downcast_mut::<T>() {
                Some(typed) => init_fn(typed).into_result(),
                None => Err(anyhow::anyhow!(
                    "init callback expects '{}'",
                    std::any::type_name::<T>()
                )),
            }
        });
        self.init_callback = Some(Hook {
            source: TypeId::of::<T>(),
            source_name: std::any::type_name::<T>(),
            callback,
        });
        self
    }

    /// 设置销毁回调（@PreDestroy）
    ///
    /// 实例此时可能仍被其他地方持有，所以只提供 `&T`。
    pub fn with_destroy<T, F, R>(mut self, destroy_fn: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let callback: DestroyCallback = Box::new(move |bean: &dyn Any| {
            match bean.downcast_ref::<T>() {
                Some(typed) => destroy_fn(typed).into_result(),
                None => Err(anyhow::anyhow!(
                    "destroy callback expects '{}'",
                    std::any::type_name::<T>()
                )),
            }
        });
        self.destroy_callback = Some(Hook {
            source: TypeId::of::<T>(),
            source_name: std::any::type_name::<T>(),
            callback,
        });
        self
    }

    /// 使用类型自身的 [`Lifecycle`] 实现作为 init/destroy 回调
    pub fn with_lifecycle<T: Lifecycle>(self) -> Self {
        self.with_init(|bean: &mut T| bean.init())
            .with_destroy(|bean: &T| bean.destroy())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn qualifiers(&self) -> &[String] {
        &self.qualifiers
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn type_name(&self) -> &'static str {
        self.recipe.product_type_name()
    }

    pub(crate) fn recipe(&self) -> &dyn BeanRecipe {
        self.recipe.as_ref()
    }

    pub(crate) fn init_callback(&self) -> Option<&InitCallback> {
        self.init_callback.as_ref().map(|hook| &hook.callback)
    }

    pub(crate) fn destroy_callback(&self) -> Option<&DestroyCallback> {
        self.destroy_callback.as_ref().map(|hook| &hook.callback)
    }

    /// 所有声明的能力，第一个总是产物类型本身
    pub fn capabilities(&self) -> Vec<Capability> {
        let own = Capability {
            id: self.recipe.product_type_id(),
            name: self.recipe.product_type_name(),
        };
        std::iter::once(own)
            .chain(self.capabilities.iter().map(|binding| binding.capability))
            .collect()
    }

    pub fn satisfies(&self, capability: Capability) -> bool {
        self.recipe.product_type_id() == capability.type_id()
            || self
                .capabilities
                .iter()
                .any(|binding| binding.capability == capability)
    }

    /// qualifier 匹配 Bean 名称或任一 qualifier 标签
    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        self.name == qualifier || self.qualifiers.iter().any(|q| q == qualifier)
    }

    /// 把实例转换为能力 `capability` 对应的 `Arc<C>`
    pub(crate) fn cast(&self, capability: Capability, bean: SharedBean) -> ContainerResult<BoxedBean> {
        let cast = if self.recipe.product_type_id() == capability.type_id() {
            self.recipe.cast_self(bean)
        } else {
            self.capabilities
                .iter()
                .find(|binding| binding.capability == capability)
                .and_then(|binding| (binding.cast)(bean))
        };
        cast.ok_or_else(|| ContainerError::TypeMismatch {
            bean: self.name.clone(),
            expected: capability.type_name().to_string(),
        })
    }

    /// 校验能力转换和回调声明的类型与构造配方的产物一致
    pub(crate) fn validate_types(&self) -> ContainerResult<()> {
        let product = self.recipe.product_type_id();
        if let Some(binding) = self.capabilities.iter().find(|b| b.source != product) {
            return Err(ContainerError::TypeMismatch {
                bean: self.name.clone(),
                expected: format!("a cast into '{}' from its own type", binding.capability),
            });
        }
        let hooks = [
            self.init_callback.as_ref().map(|h| (h.source, h.source_name)),
            self.destroy_callback.as_ref().map(|h| (h.source, h.source_name)),
        ];
        for (source, source_name) in hooks.into_iter().flatten() {
            if source != product {
                return Err(ContainerError::TypeMismatch {
                    bean: self.name.clone(),
                    expected: source_name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("type_name", &self.recipe.product_type_name())
            .field("capabilities", &self.capabilities())
            .field("dependencies", &self.dependencies)
            .field("primary", &self.primary)
            .field("qualifiers", &self.qualifiers)
            .field("lazy", &self.lazy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct OrderServiceImpl;

    #[test]
    fn test_definition_satisfies_own_type_and_declared_capabilities() {
        let definition = BeanDefinition::of("english", |_| Ok(English))
            .provides(|e: Arc<English>| e as Arc<dyn Greeter>);

        assert!(definition.satisfies(Capability::of::<English>()));
        assert!(definition.satisfies(Capability::of::<dyn Greeter>()));
        assert!(!definition.satisfies(Capability::of::<String>()));
        assert_eq!(definition.capabilities().len(), 2);
    }

    #[test]
    fn test_cast_into_trait_object() {
        let definition = BeanDefinition::of("english", |_| Ok(English))
            .provides(|e: Arc<English>| e as Arc<dyn Greeter>);
        let bean: SharedBean = Arc::new(English);

        let boxed = definition
            .cast(Capability::of::<dyn Greeter>(), bean)
            .unwrap();
        let greeter = boxed.downcast_ref::<Arc<dyn Greeter>>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn test_for_type_uses_camel_case_name() {
        let definition = BeanDefinition::for_type(|_| Ok(OrderServiceImpl));
        assert_eq!(definition.name(), "orderServiceImpl");
    }

    #[test]
    fn test_validate_types_rejects_foreign_hook() {
        let definition = BeanDefinition::of("english", |_| Ok(English))
            .with_init(|_: &mut OrderServiceImpl| ());
        assert!(matches!(
            definition.validate_types(),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_types_accepts_own_hooks_and_casts() {
        let definition = BeanDefinition::of("english", |_| Ok(English))
            .provides(|e: Arc<English>| e as Arc<dyn Greeter>)
            .with_init(|_: &mut English| ())
            .with_destroy(|_: &English| ());
        assert!(definition.validate_types().is_ok());
        assert_eq!(definition.capabilities()[0], Capability::of::<English>());
        assert_eq!(definition.type_name(), std::any::type_name::<English>());
    }

    #[test]
    fn test_qualifier_matches_name_or_tag() {
        let definition = BeanDefinition::of("rateDiscountPolicy", |_| Ok(English))
            .with_qualifier("mainDiscountPolicy");
        assert!(definition.matches_qualifier("rateDiscountPolicy"));
        assert!(definition.matches_qualifier("mainDiscountPolicy"));
        assert!(!definition.matches_qualifier("fixDiscountPolicy"));
    }

    #[test]
    fn test_dependency_describe() {
        assert_eq!(
            Dependency::on::<English>().qualified("x").describe(),
            format!("bean of type '{}' qualified by 'x'", std::any::type_name::<English>())
        );
        assert_eq!(Dependency::named::<English>("y").describe(), "bean named 'y'");
    }
}
