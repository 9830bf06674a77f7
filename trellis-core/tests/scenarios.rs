use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use trellis_core::prelude::*;
use trellis_core::{FactoryState, HookPhase, MapPropertySource};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

// ==================== 折扣策略 ====================

trait DiscountPolicy: Send + Sync {
    fn discount(&self, price: u64) -> u64;
}

struct FixedDiscount {
    amount: u64,
}

impl DiscountPolicy for FixedDiscount {
    fn discount(&self, _price: u64) -> u64 {
        self.amount
    }
}

struct PercentDiscount {
    rate: u64,
}

impl DiscountPolicy for PercentDiscount {
    fn discount(&self, price: u64) -> u64 {
        price * self.rate / 100
    }
}

fn fixed_discount() -> BeanDefinition {
    BeanDefinition::of("FixedDiscount", |_| Ok(FixedDiscount { amount: 1000 }))
        .provides(|p: Arc<FixedDiscount>| p as Arc<dyn DiscountPolicy>)
}

fn percent_discount() -> BeanDefinition {
    BeanDefinition::of("PercentDiscount", |_| Ok(PercentDiscount { rate: 10 }))
        .provides(|p: Arc<PercentDiscount>| p as Arc<dyn DiscountPolicy>)
}

struct OrderService {
    policy: Arc<dyn DiscountPolicy>,
}

impl OrderService {
    fn order_price(&self, price: u64) -> u64 {
        price - self.policy.discount(price)
    }
}

fn started(definitions: Vec<BeanDefinition>) -> Arc<ApplicationContext> {
    let mut builder = ApplicationContext::builder();
    for definition in definitions {
        builder = builder.register(definition);
    }
    let context = builder.build().unwrap();
    context.start().unwrap();
    context
}

// ==================== 作用域 ====================

#[test]
fn test_shared_bean_is_the_same_instance() {
    let context = started(vec![fixed_discount()]);

    let first = context.get_bean_by_type::<FixedDiscount>().unwrap();
    let second = context.get_bean_as::<FixedDiscount>("FixedDiscount").unwrap();
    let third = context.get_bean_by_type::<dyn DiscountPolicy>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(third.discount(10000), 1000);
    assert_eq!(context.get_bean_factory().singleton_count(), 1);
}

#[test]
fn test_per_request_bean_is_distinct_across_requests_and_reused_within_one() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let context = started(vec![BeanDefinition::of("requestCounter", move |_| {
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    })
    .with_scope(Scope::Request)]);

    let first_request = context.begin_request().unwrap();
    let second_request = context.begin_request().unwrap();
    assert_ne!(first_request.id(), second_request.id());

    let a = first_request.get_bean_by_type::<usize>().unwrap();
    let b = first_request.get_bean_by_type::<usize>().unwrap();
    let c = second_request.get_bean_by_type::<usize>().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_per_request_bean_outside_request_fails() {
    let context = started(vec![BeanDefinition::of("requestBean", |_| Ok(1u8))
        .with_scope(Scope::Request)]);

    assert!(matches!(
        context.get_bean_by_type::<u8>(),
        Err(ContainerError::ScopeNotActive { .. })
    ));
}

#[test]
fn test_per_request_beans_destroyed_in_reverse_order_at_scope_end() {
    struct Connection;
    struct Transaction;

    let log = journal();
    let (l1, l2) = (Arc::clone(&log), Arc::clone(&log));
    let context = started(vec![
        BeanDefinition::of("connection", |_| Ok(Connection))
            .with_scope(Scope::Request)
            .with_destroy(move |_: &Connection| l1.lock().push("close connection".to_string())),
        BeanDefinition::of("transaction", |deps| {
            deps.get::<Connection>(0)?;
            Ok(Transaction)
        })
        .with_scope(Scope::Request)
        .with_dependency(Dependency::on::<Connection>())
        .with_destroy(move |_: &Transaction| l2.lock().push("end transaction".to_string())),
    ]);

    let request = context.begin_request().unwrap();
    request.get_bean_by_type::<Transaction>().unwrap();
    assert_eq!(request.instance_count(), 2);
    assert!(entries(&log).is_empty());

    request.end().unwrap();
    assert_eq!(entries(&log), vec!["end transaction", "close connection"]);

    // 容器关闭不会再次访问请求作用域的实例
    context.shutdown().unwrap();
    assert_eq!(entries(&log).len(), 2);
}

#[test]
fn test_unmanaged_bean_is_new_each_time_and_never_destroyed() {
    struct Report;

    let log = journal();
    let (init_log, destroy_log) = (Arc::clone(&log), Arc::clone(&log));
    let context = started(vec![BeanDefinition::of("report", |_| Ok(Report))
        .with_scope(Scope::Prototype)
        .with_init(move |_: &mut Report| init_log.lock().push("init".to_string()))
        .with_destroy(move |_: &Report| destroy_log.lock().push("destroy".to_string()))]);

    let first = context.get_bean_by_type::<Report>().unwrap();
    let second = context.get_bean_by_type::<Report>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    context.shutdown().unwrap();
    assert_eq!(entries(&log), vec!["init", "init"]);
}

// ==================== 解析 ====================

#[test]
fn test_cycle_reports_both_beans() {
    struct A;
    struct B;

    let context = ApplicationContext::builder()
        .register(
            BeanDefinition::of("A", |deps| {
                deps.get::<B>(0)?;
                Ok(A)
            })
            .with_dependency(Dependency::on::<B>()),
        )
        .register(
            BeanDefinition::of("B", |deps| {
                deps.get::<A>(0)?;
                Ok(B)
            })
            .with_dependency(Dependency::on::<A>()),
        )
        .build()
        .unwrap();

    // 未启动时直接获取：运行时检测
    match context.get_bean("A") {
        Err(ContainerError::CircularDependency { path }) => {
            assert_eq!(path, vec!["A", "B", "A"]);
        }
        other => panic!("Expected CircularDependency, got {:?}", other.map(|_| ())),
    }

    // 启动时校验依赖图
    match context.start() {
        Err(ContainerError::CircularDependency { path }) => {
            assert!(path.contains(&"A".to_string()));
            assert!(path.contains(&"B".to_string()));
        }
        other => panic!("Expected CircularDependency, got {:?}", other),
    }
}

#[test]
fn test_prototype_cycle_through_provider_fails_with_path() {
    struct A;
    struct B;

    // provider 边不参与启动校验，循环在运行时暴露
    let context = started(vec![
        BeanDefinition::of("A", |deps| {
            deps.provider::<B>(0)?.get()?;
            Ok(A)
        })
        .with_scope(Scope::Prototype)
        .with_dependency(Dependency::provider::<B>()),
        BeanDefinition::of("B", |deps| {
            deps.get::<A>(0)?;
            Ok(B)
        })
        .with_scope(Scope::Prototype)
        .with_dependency(Dependency::on::<A>()),
    ]);

    match context.get_bean("A") {
        Err(ContainerError::CircularDependency { path }) => {
            assert_eq!(path, vec!["A", "B", "A"]);
        }
        other => panic!("Expected CircularDependency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_registration_keeps_the_first() {
    let context = ApplicationContext::new().unwrap();
    context.register(fixed_discount()).unwrap();

    let duplicate = BeanDefinition::of("FixedDiscount", |_| Ok(PercentDiscount { rate: 50 }));
    match context.register(duplicate) {
        Err(ContainerError::DuplicateRegistration { name }) => assert_eq!(name, "FixedDiscount"),
        other => panic!("Expected DuplicateRegistration, got {:?}", other),
    }

    let bean = context.get_bean_as::<dyn DiscountPolicy>("FixedDiscount").unwrap();
    assert_eq!(bean.discount(10000), 1000);
}

#[test]
fn test_single_candidate_resolves_without_qualifier() {
    let context = started(vec![percent_discount()]);
    let policy = context.get_bean_by_type::<dyn DiscountPolicy>().unwrap();
    assert_eq!(policy.discount(20000), 2000);
}

#[test]
fn test_two_candidates_are_ambiguous_until_qualified() {
    let context = started(vec![fixed_discount(), percent_discount()]);

    match context.get_bean_by_type::<dyn DiscountPolicy>() {
        Err(ContainerError::AmbiguousDependency { candidates, .. }) => {
            assert_eq!(candidates, vec!["FixedDiscount", "PercentDiscount"]);
        }
        other => panic!("Expected AmbiguousDependency, got {:?}", other.map(|_| ())),
    }

    let percent = context
        .get_bean_qualified::<dyn DiscountPolicy>("PercentDiscount")
        .unwrap();
    assert_eq!(percent.discount(20000), 2000);
}

#[test]
fn test_discount_scenario_by_capability_and_by_name() {
    let context = started(vec![fixed_discount(), percent_discount()]);

    assert!(matches!(
        context.get_bean_by_type::<dyn DiscountPolicy>(),
        Err(ContainerError::AmbiguousDependency { .. })
    ));

    let fixed = context
        .get_bean_as::<dyn DiscountPolicy>("FixedDiscount")
        .unwrap();
    assert_eq!(fixed.discount(10000), 1000);
}

#[test]
fn test_injected_dependency_uses_qualifier() {
    let context = started(vec![
        fixed_discount(),
        percent_discount(),
        BeanDefinition::of("orderService", |deps| {
            Ok(OrderService {
                policy: deps.get::<dyn DiscountPolicy>(0)?,
            })
        })
        .with_dependency(Dependency::on::<dyn DiscountPolicy>().qualified("PercentDiscount")),
    ]);

    let order_service = context.get_bean_by_type::<OrderService>().unwrap();
    assert_eq!(order_service.order_price(20000), 18000);
}

#[test]
fn test_unqualified_injection_of_ambiguous_capability_fails_at_start() {
    let context = ApplicationContext::builder()
        .register(fixed_discount())
        .register(percent_discount())
        .register(
            BeanDefinition::of("orderService", |deps| {
                Ok(OrderService {
                    policy: deps.get::<dyn DiscountPolicy>(0)?,
                })
            })
            .with_dependency(Dependency::on::<dyn DiscountPolicy>()),
        )
        .build()
        .unwrap();

    assert!(matches!(
        context.start(),
        Err(ContainerError::AmbiguousDependency { .. })
    ));
}

#[test]
fn test_primary_wins_over_non_primary() {
    let context = started(vec![fixed_discount(), percent_discount().with_primary(true)]);
    let policy = context.get_bean_by_type::<dyn DiscountPolicy>().unwrap();
    assert_eq!(policy.discount(20000), 2000);
}

#[test]
fn test_configured_primary_disambiguates() {
    let context = ApplicationContext::builder()
        .add_property_source(Box::new(
            MapPropertySource::new("overrides")
                .with_property("beans.FixedDiscount.primary", ConfigValue::Bool(true)),
        ))
        .register(fixed_discount())
        .register(percent_discount())
        .build()
        .unwrap();
    context.start().unwrap();

    let policy = context.get_bean_by_type::<dyn DiscountPolicy>().unwrap();
    assert_eq!(policy.discount(20000), 1000);
}

#[test]
fn test_optional_dependency_is_absent() {
    struct Mailer;
    struct Notifier {
        mailer: Option<Arc<Mailer>>,
    }

    let context = started(vec![BeanDefinition::of("notifier", |deps| {
        Ok(Notifier {
            mailer: deps.optional::<Mailer>(0)?,
        })
    })
    .with_dependency(Dependency::on::<Mailer>().optional())]);

    let notifier = context.get_bean_by_type::<Notifier>().unwrap();
    assert!(notifier.mailer.is_none());
    assert!(context.get_optional_bean::<Mailer>().unwrap().is_none());
}

#[test]
fn test_missing_required_dependency_is_not_found() {
    #[derive(Debug)]
    struct Mailer;

    let context = ApplicationContext::new().unwrap();
    assert!(context.get_bean_by_type::<Mailer>().unwrap_err().is_not_found());
    assert!(context.get_bean("mailer").unwrap_err().is_not_found());
}

#[test]
fn test_collection_dependency_in_registration_order() {
    struct DiscountService {
        policies: Vec<(String, Arc<dyn DiscountPolicy>)>,
    }

    let context = started(vec![
        percent_discount(),
        fixed_discount(),
        BeanDefinition::of("discountService", |deps| {
            Ok(DiscountService {
                policies: deps.all_named::<dyn DiscountPolicy>(0)?,
            })
        })
        .with_dependency(Dependency::all::<dyn DiscountPolicy>()),
    ]);

    let service = context.get_bean_by_type::<DiscountService>().unwrap();
    let names: Vec<_> = service.policies.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["PercentDiscount", "FixedDiscount"]);
    assert_eq!(
        context.get_bean_names_for_type::<dyn DiscountPolicy>(),
        vec!["PercentDiscount", "FixedDiscount"]
    );

    // 没有候选时得到空集合
    assert!(context.get_beans_of_type::<OrderService>().unwrap().is_empty());
}

#[test]
fn test_provider_yields_fresh_prototype_per_call() {
    struct Ticket {
        number: usize,
    }
    struct TicketMachine {
        tickets: ObjectProvider<Ticket>,
    }

    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);
    let context = started(vec![
        BeanDefinition::of("ticket", move |_| {
            Ok(Ticket {
                number: counter.fetch_add(1, Ordering::SeqCst),
            })
        })
        .with_scope(Scope::Prototype),
        BeanDefinition::of("ticketMachine", |deps| {
            Ok(TicketMachine {
                tickets: deps.provider::<Ticket>(0)?,
            })
        })
        .with_dependency(Dependency::provider::<Ticket>()),
    ]);

    let machine = context.get_bean_by_type::<TicketMachine>().unwrap();
    // provider 注入时不构造目标
    assert_eq!(issued.load(Ordering::SeqCst), 0);

    let first = machine.tickets.get().unwrap();
    let second = machine.tickets.get().unwrap();
    assert_eq!((first.number, second.number), (0, 1));
}

#[test]
fn test_shared_bean_reaches_per_request_bean_through_provider() {
    struct RequestLog {
        id: u64,
    }
    struct Controller {
        logs: ObjectProvider<RequestLog>,
    }

    let ids = Arc::new(AtomicUsize::new(100));
    let next = Arc::clone(&ids);
    let context = started(vec![
        BeanDefinition::of("requestLog", move |_| {
            Ok(RequestLog {
                id: next.fetch_add(1, Ordering::SeqCst) as u64,
            })
        })
        .with_scope(Scope::Request),
        BeanDefinition::of("controller", |deps| {
            Ok(Controller {
                logs: deps.provider::<RequestLog>(0)?,
            })
        })
        .with_dependency(Dependency::provider::<RequestLog>()),
    ]);

    let controller = context.get_bean_by_type::<Controller>().unwrap();
    assert!(matches!(
        controller.logs.get(),
        Err(ContainerError::ScopeNotActive { .. })
    ));

    let request = context.begin_request().unwrap();
    let a = controller.logs.get_in(&request).unwrap();
    let b = request.get_bean_by_type::<RequestLog>().unwrap();
    assert_eq!(a.id, b.id);
}

#[test]
fn test_singleton_capturing_request_bean_is_rejected_at_start() {
    struct RequestLog;
    struct Controller;

    let context = ApplicationContext::builder()
        .register(BeanDefinition::of("requestLog", |_| Ok(RequestLog)).with_scope(Scope::Request))
        .register(
            BeanDefinition::of("controller", |deps| {
                deps.get::<RequestLog>(0)?;
                Ok(Controller)
            })
            .with_dependency(Dependency::on::<RequestLog>()),
        )
        .build()
        .unwrap();

    assert!(matches!(
        context.start(),
        Err(ContainerError::InvalidConfiguration(_))
    ));
}

// ==================== 生命周期 ====================

struct NetworkClient {
    url: String,
    journal: Journal,
}

impl Lifecycle for NetworkClient {
    fn init(&mut self) -> anyhow::Result<()> {
        self.journal.lock().push("connected".to_string());
        Ok(())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        self.journal.lock().push("disconnected".to_string());
        Ok(())
    }
}

#[test]
fn test_network_client_connects_then_disconnects() {
    let log = journal();
    let client_log = Arc::clone(&log);
    let context = started(vec![BeanDefinition::of("networkClient", move |_| {
        Ok(NetworkClient {
            url: "http://hello-spring.dev".to_string(),
            journal: Arc::clone(&client_log),
        })
    })
    .with_lifecycle::<NetworkClient>()]);

    let client = context.get_bean_by_type::<NetworkClient>().unwrap();
    assert_eq!(client.url, "http://hello-spring.dev");
    drop(client);

    context.shutdown().unwrap();
    assert_eq!(entries(&log), vec!["connected", "disconnected"]);
}

#[test]
fn test_init_runs_bottom_up_and_destroy_in_reverse() {
    struct Repository;
    struct Service;
    struct Controller;

    let log = journal();
    let hook = |name: &'static str, log: &Journal| {
        let (init_log, destroy_log) = (Arc::clone(log), Arc::clone(log));
        (
            move || init_log.lock().push(format!("init {}", name)),
            move || destroy_log.lock().push(format!("destroy {}", name)),
        )
    };
    let (repo_init, repo_destroy) = hook("repository", &log);
    let (service_init, service_destroy) = hook("service", &log);
    let (controller_init, controller_destroy) = hook("controller", &log);

    let context = started(vec![
        BeanDefinition::of("controller", |deps| {
            deps.get::<Service>(0)?;
            Ok(Controller)
        })
        .with_dependency(Dependency::on::<Service>())
        .with_init(move |_: &mut Controller| controller_init())
        .with_destroy(move |_: &Controller| controller_destroy()),
        BeanDefinition::of("service", |deps| {
            deps.get::<Repository>(0)?;
            Ok(Service)
        })
        .with_dependency(Dependency::on::<Repository>())
        .with_init(move |_: &mut Service| service_init())
        .with_destroy(move |_: &Service| service_destroy()),
        BeanDefinition::of("repository", |_| Ok(Repository))
            .with_init(move |_: &mut Repository| repo_init())
            .with_destroy(move |_: &Repository| repo_destroy()),
    ]);

    context.get_bean_by_type::<Controller>().unwrap();
    context.shutdown().unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "init repository",
            "init service",
            "init controller",
            "destroy controller",
            "destroy service",
            "destroy repository",
        ]
    );
}

#[test]
fn test_failing_destroy_hook_does_not_stop_others() {
    struct First;
    struct Second;
    struct Third;

    let log = journal();
    let (l1, l3) = (Arc::clone(&log), Arc::clone(&log));
    let context = started(vec![
        BeanDefinition::of("first", |_| Ok(First))
            .with_lazy(false)
            .with_destroy(move |_: &First| l1.lock().push("first".to_string())),
        BeanDefinition::of("second", |_| Ok(Second))
            .with_lazy(false)
            .with_destroy(|_: &Second| -> anyhow::Result<()> { Err(anyhow!("socket already closed")) }),
        BeanDefinition::of("third", |_| Ok(Third))
            .with_lazy(false)
            .with_destroy(move |_: &Third| l3.lock().push("third".to_string())),
    ]);

    match context.shutdown() {
        Err(ContainerError::ShutdownIncomplete(failures)) => {
            assert_eq!(failures.len(), 1);
            match &failures[0] {
                ContainerError::LifecycleHookFailure { bean, phase, .. } => {
                    assert_eq!(bean, "second");
                    assert_eq!(*phase, HookPhase::Destroy);
                }
                other => panic!("Expected LifecycleHookFailure, got {:?}", other),
            }
        }
        other => panic!("Expected ShutdownIncomplete, got {:?}", other),
    }
    assert_eq!(entries(&log), vec!["third", "first"]);

    // 回调最多执行一次
    context.shutdown().unwrap();
    assert_eq!(entries(&log).len(), 2);
}

#[test]
fn test_failing_init_hook_is_reported_and_bean_not_cached() {
    struct Flaky;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let context = ApplicationContext::new().unwrap();
    context
        .register(BeanDefinition::of("flaky", |_| Ok(Flaky)).with_init(
            move |_: &mut Flaky| -> anyhow::Result<()> {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow!("not ready"))
                } else {
                    Ok(())
                }
            },
        ))
        .unwrap();
    context.start().unwrap();

    assert!(matches!(
        context.get_bean("flaky"),
        Err(ContainerError::LifecycleHookFailure { phase: HookPhase::Init, .. })
    ));
    assert!(context.get_bean("flaky").is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lookups_after_shutdown_fail() {
    let context = started(vec![fixed_discount()]);
    context.shutdown().unwrap();

    assert!(matches!(
        context.get_bean_by_type::<FixedDiscount>(),
        Err(ContainerError::ContainerShutDown)
    ));
    assert!(matches!(
        context.begin_request(),
        Err(ContainerError::ContainerShutDown)
    ));
}

#[test]
fn test_shutdown_hook_reads_cached_but_cannot_construct() {
    struct Lazy;

    let log = journal();
    let context = started(vec![
        fixed_discount(),
        BeanDefinition::of("lazy", |_| Ok(Lazy)),
    ]);
    context.get_bean_by_type::<FixedDiscount>().unwrap();

    let hook_log = Arc::clone(&log);
    let weak = Arc::downgrade(&context);
    context.register_shutdown_hook(move || {
        let context = weak.upgrade().ok_or(ContainerError::ContainerShutDown)?;
        let cached = context.get_bean_by_type::<FixedDiscount>().is_ok();
        let fresh = context.get_bean("lazy");
        hook_log.lock().push(format!(
            "cached={} fresh_rejected={}",
            cached,
            matches!(fresh, Err(ContainerError::ContainerShutDown))
        ));
        Ok(())
    });

    context.shutdown().unwrap();
    assert_eq!(entries(&log), vec!["cached=true fresh_rejected=true"]);
}

#[test]
fn test_reset_singleton_destroys_and_recreates() {
    let log = journal();
    let destroy_log = Arc::clone(&log);
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let context = started(vec![BeanDefinition::of("cache", move |_| {
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    })
    .with_destroy(move |generation: &usize| {
        destroy_log.lock().push(format!("evict {}", generation))
    })]);

    let first = context.get_bean_by_type::<usize>().unwrap();
    context.reset_singleton("cache").unwrap();
    let second = context.get_bean_by_type::<usize>().unwrap();

    assert_eq!((*first, *second), (0, 1));
    assert_eq!(entries(&log), vec!["evict 0"]);
}

// ==================== 并发 ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_first_lookups_construct_once() {
    struct ExpensiveClient;

    const CALLERS: usize = 50;

    let constructions = Arc::new(AtomicUsize::new(0));
    let inits = Arc::new(AtomicUsize::new(0));
    let (c, i) = (Arc::clone(&constructions), Arc::clone(&inits));

    let context = started(vec![BeanDefinition::of("expensiveClient", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(ExpensiveClient)
    })
    .with_init(move |_: &mut ExpensiveClient| {
        i.fetch_add(1, Ordering::SeqCst);
    })]);

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let context = Arc::clone(&context);
            let barrier = Arc::clone(&barrier);
            tokio::task::spawn_blocking(move || {
                barrier.wait();
                context.get_bean_by_type::<ExpensiveClient>()
            })
        })
        .collect();

    let mut instances = Vec::with_capacity(CALLERS);
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|bean| Arc::ptr_eq(bean, &instances[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_waits_for_inflight_construction() {
    struct SlowClient;

    let log = journal();
    let construction_started = Arc::new(Barrier::new(2));
    let (recipe_log, destroy_log) = (Arc::clone(&log), Arc::clone(&log));
    let entered = Arc::clone(&construction_started);

    let context = started(vec![BeanDefinition::of("slowClient", move |_| {
        entered.wait();
        std::thread::sleep(std::time::Duration::from_millis(100));
        recipe_log.lock().push("constructed".to_string());
        Ok(SlowClient)
    })
    .with_destroy(move |_: &SlowClient| destroy_log.lock().push("destroyed".to_string()))]);

    let lookup = {
        let context = Arc::clone(&context);
        tokio::task::spawn_blocking(move || context.get_bean_by_type::<SlowClient>().map(|_| ()))
    };
    let shutdown = {
        let context = Arc::clone(&context);
        tokio::task::spawn_blocking(move || {
            construction_started.wait();
            context.shutdown()
        })
    };

    lookup.await.unwrap().unwrap();
    shutdown.await.unwrap().unwrap();

    assert_eq!(entries(&log), vec!["constructed", "destroyed"]);
    assert_eq!(context.state(), FactoryState::Closed);
    assert!(matches!(
        context.get_bean_by_type::<SlowClient>(),
        Err(ContainerError::ContainerShutDown)
    ));
}
