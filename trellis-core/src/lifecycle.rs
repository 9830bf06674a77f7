use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ContainerError, ContainerResult, HookPhase};
use crate::instance::{InstanceRecord, PendingInstance};

/// 生命周期管理 trait
/// 类似 Spring 的 InitializingBean 和 DisposableBean
///
/// 通过 [`BeanDefinition::with_lifecycle`](crate::BeanDefinition::with_lifecycle) 启用。
pub trait Lifecycle: Any + Send + Sync {
    /// 初始化回调
    /// 在 Bean 创建并设置所有依赖后调用
    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 销毁回调
    /// 在容器关闭或请求作用域结束时调用
    fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 生命周期协调器
///
/// 负责执行 init 回调、分配构造序号，以及按构造的逆序执行 destroy 回调。
#[derive(Default)]
pub struct LifecycleCoordinator {
    sequence: AtomicU64,
    /// 容器负责销毁的单例实例（构造顺序）
    active: Mutex<Vec<Arc<InstanceRecord>>>,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行 init 回调并激活实例
    pub(crate) fn on_create(&self, mut pending: PendingInstance) -> ContainerResult<InstanceRecord> {
        let definition = Arc::clone(pending.definition());
        let name = definition.name();

        if let Some(init) = definition.init_callback() {
            tracing::trace!("Invoking init callback of bean '{}'", name);
            init(pending.value_mut()).map_err(|source| {
                tracing::warn!("Init callback of bean '{}' failed: {}", name, source);
                ContainerError::LifecycleHookFailure {
                    bean: name.to_string(),
                    phase: HookPhase::Init,
                    source,
                }
            })?;
        }

        pending.mark_initialized();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(pending.activate(sequence))
    }

    /// 登记由容器负责销毁的实例
    pub(crate) fn track(&self, record: Arc<InstanceRecord>) {
        self.active.lock().push(record);
    }

    /// 取消登记（用于 reset）
    pub(crate) fn untrack(&self, name: &str) -> Option<Arc<InstanceRecord>> {
        let mut active = self.active.lock();
        let position = active.iter().position(|record| record.name() == name)?;
        Some(active.remove(position))
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// 按构造逆序销毁所有登记的实例，返回收集到的失败
    pub(crate) fn on_shutdown(&self) -> Vec<ContainerError> {
        let records: Vec<_> = std::mem::take(&mut *self.active.lock());
        tracing::info!("Destroying {} container-managed bean(s)", records.len());
        Self::destroy_in_reverse(records)
    }

    /// 按构造序号从大到小依次销毁，一个失败不影响其余实例
    pub fn destroy_in_reverse(mut records: Vec<Arc<InstanceRecord>>) -> Vec<ContainerError> {
        records.sort_by(|a, b| b.sequence().cmp(&a.sequence()));
        records
            .iter()
            .filter_map(|record| Self::destroy(record).err())
            .collect()
    }

    /// 执行单个实例的 destroy 回调（最多一次）
    pub fn destroy(record: &InstanceRecord) -> ContainerResult<()> {
        if !record.begin_destroy() {
            return Ok(());
        }

        let Some(destroy) = record.definition().destroy_callback() else {
            tracing::trace!("Bean '{}' has no destroy callback", record.name());
            return Ok(());
        };

        let bean = record.bean();
        let target: &dyn Any = &*bean;
        match destroy(target) {
            Ok(()) => {
                tracing::debug!("Bean '{}' destroyed successfully", record.name());
                Ok(())
            }
            Err(source) => {
                tracing::warn!("Failed to destroy bean '{}': {}", record.name(), source);
                Err(ContainerError::LifecycleHookFailure {
                    bean: record.name().to_string(),
                    phase: HookPhase::Destroy,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Resource {
        name: &'static str,
        journal: Journal,
        ready: bool,
    }

    impl Lifecycle for Resource {
        fn init(&mut self) -> anyhow::Result<()> {
            self.ready = true;
            self.journal.lock().push(format!("init {}", self.name));
            Ok(())
        }

        fn destroy(&self) -> anyhow::Result<()> {
            self.journal.lock().push(format!("destroy {}", self.name));
            if self.name == "broken" {
                anyhow::bail!("cannot release {}", self.name);
            }
            Ok(())
        }
    }

    fn create(
        coordinator: &LifecycleCoordinator,
        name: &'static str,
        journal: &Journal,
    ) -> ContainerResult<Arc<InstanceRecord>> {
        let shared = Arc::clone(journal);
        let definition = Arc::new(
            BeanDefinition::of(name, move |_| {
                Ok(Resource {
                    name,
                    journal: Arc::clone(&shared),
                    ready: false,
                })
            })
            .with_lifecycle::<Resource>(),
        );
        let value = Box::new(Resource {
            name,
            journal: Arc::clone(journal),
            ready: false,
        });
        let record = Arc::new(coordinator.on_create(PendingInstance::new(definition, value))?);
        coordinator.track(Arc::clone(&record));
        Ok(record)
    }

    #[test]
    fn test_init_runs_before_activation() {
        let coordinator = LifecycleCoordinator::new();
        let journal = Journal::default();
        let record = create(&coordinator, "first", &journal).unwrap();

        let resource = record.bean().downcast::<Resource>().unwrap();
        assert!(resource.ready);
        assert_eq!(*journal.lock(), vec!["init first"]);
    }

    #[test]
    fn test_shutdown_destroys_in_reverse_and_collects_failures() {
        let coordinator = LifecycleCoordinator::new();
        let journal = Journal::default();
        create(&coordinator, "first", &journal).unwrap();
        create(&coordinator, "broken", &journal).unwrap();
        create(&coordinator, "third", &journal).unwrap();

        let failures = coordinator.on_shutdown();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            ContainerError::LifecycleHookFailure { bean, phase: HookPhase::Destroy, .. } if bean == "broken"
        ));

        let destroyed: Vec<_> = journal
            .lock()
            .iter()
            .filter(|entry| entry.starts_with("destroy"))
            .cloned()
            .collect();
        assert_eq!(destroyed, vec!["destroy third", "destroy broken", "destroy first"]);

        // 第二次 shutdown 没有可销毁的实例
        assert!(coordinator.on_shutdown().is_empty());
    }

    #[test]
    fn test_destroy_runs_at_most_once() {
        let coordinator = LifecycleCoordinator::new();
        let journal = Journal::default();
        let record = create(&coordinator, "first", &journal).unwrap();

        LifecycleCoordinator::destroy(&record).unwrap();
        LifecycleCoordinator::destroy(&record).unwrap();
        assert_eq!(journal.lock().len(), 2);
    }
}
