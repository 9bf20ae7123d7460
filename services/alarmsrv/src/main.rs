//! Alarm Service (AlarmSrv)

use clap::Parser;
use common::logging::{init_log_root, init_logging, LogConfig};
use common::service_bootstrap::print_startup_banner;
use common::shutdown::wait_for_shutdown;
use common::ServiceInfo;
use errors::ServiceResult;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use alarmsrv::api::create_router;
use alarmsrv::bootstrap::{load_config, open_cache, start_service, Args};
use alarmsrv::bus::BusSubscriber;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let args = Args::parse();

    init_log_root(None);
    let mut log_config = LogConfig::for_service("alarmsrv", args.service.parse_log_level());
    log_config.ansi = !args.service.no_color;
    log_config.console_only = args.service.console_only || args.service.validate;
    init_logging(log_config)?;

    let service_info = ServiceInfo::new(
        "alarmsrv",
        env!("CARGO_PKG_VERSION"),
        "Alarm device orchestration",
        6010,
    );
    print_startup_banner(&service_info);

    let config = load_config(&args)?;
    info!(
        "Configuration loaded from {} (db {}, bus {})",
        args.config_path(),
        config.database.path,
        config.bus.redis_url
    );

    let cache = open_cache(&config).await?;

    if args.service.validate {
        let snapshot = cache.snapshot();
        info!(
            "Configuration valid: {} sensors, {} sensor types",
            snapshot.sensor_count(),
            snapshot.type_count()
        );
        return Ok(());
    }

    let service = start_service(&config, cache);
    let token = CancellationToken::new();

    let bus = BusSubscriber::new(config.bus.clone(), service.clone());
    let bus_task = tokio::spawn(bus.run(token.clone()));

    let addr = format!("{}:{}", config.service.host, config.service.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Admin API listening on {}", addr);

    let app = create_router(service.clone());
    let api_token = token.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_token.cancelled().await })
            .await
    });

    let signal = wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);

    token.cancel();
    match bus_task.await {
        Ok(Err(e)) => error!("Bus subscriber failed: {}", e),
        Err(e) => error!("Bus task join error: {}", e),
        Ok(Ok(())) => {},
    }
    service.shutdown().await;
    match api_task.await {
        Ok(Err(e)) => error!("Admin API error: {}", e),
        Err(e) => error!("Admin API join error: {}", e),
        Ok(Ok(())) => {},
    }

    info!("AlarmSrv stopped");
    Ok(())
}
