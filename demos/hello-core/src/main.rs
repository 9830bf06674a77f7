use std::sync::Arc;

use hello_core::discount::{DiscountPolicy, DiscountService};
use hello_core::member::{Grade, Member, MemberService};
use hello_core::network::NetworkClient;
use hello_core::order::OrderService;
use hello_core::web::LogDemoController;
use trellis_core::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 查找配置文件
    let config_paths = ["demos/hello-core/application.toml", "application.toml"];
    let config_file = config_paths
        .iter()
        .copied()
        .find(|path| std::path::Path::new(path).exists())
        .unwrap_or("application.toml");

    let app = hello_core::application(config_file).run()?;

    // 会员与订单
    let member_service = app.get_bean_by_type::<dyn MemberService>()?;
    member_service.join(Member::new(1, "memberA", Grade::Vip));
    member_service.join(Member::new(2, "memberB", Grade::Basic));

    let order_service = app.get_bean_by_type::<dyn OrderService>()?;
    for member_id in [1, 2] {
        let order = order_service.create_order(member_id, "itemA", 20000)?;
        tracing::info!(
            "order = {:?}, calculated price = {}",
            order,
            order.calculate_price()
        );
    }

    // 同类型多个 Bean：primary 决定按类型获取的结果，集合注入拿到全部
    let primary = app.get_bean_by_type::<dyn DiscountPolicy>()?;
    let vip = member_service.find_member(1)?;
    tracing::info!("primary discount for 20000 = {}", primary.discount(&vip, 20000));
    tracing::info!(
        "discount policies = {:?}",
        app.get_bean_names_for_type::<dyn DiscountPolicy>()
    );

    let discount_service = app.get_bean_by_type::<DiscountService>()?;
    for code in discount_service.codes() {
        tracing::info!(
            "{} discount for 10000 = {}",
            code,
            discount_service.discount(&vip, 10000, code)?
        );
    }

    // 并发请求，每个请求拥有自己的 MyLogger
    let context = Arc::clone(app.context());
    let controller = app.get_bean_by_type::<LogDemoController>()?;
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let context = Arc::clone(&context);
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                let request = context.begin_request()?;
                let response = controller
                    .log_demo(&request, &format!("http://localhost:8080/log-demo?client={}", i))
                    .await?;
                request.end()?;
                anyhow::Ok(response)
            })
        })
        .collect();
    for handle in handles {
        tracing::info!("response = {}", handle.await??);
    }

    let network_client = app.get_bean_by_type::<NetworkClient>()?;
    network_client.call("still connected");

    app.shutdown()?;
    tracing::info!("network client events = {:?}", network_client.events());

    Ok(())
}
