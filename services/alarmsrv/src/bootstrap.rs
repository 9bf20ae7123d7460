//! Service startup: CLI, configuration overrides and component wiring

use clap::Parser;
use common::bootstrap_args::ServiceArgs;
use std::sync::Arc;
use tracing::info;

use crate::cache::{DeviceCache, SqliteSensorStore};
use crate::config::{AlarmsrvConfig, DEFAULT_CONFIG_PATH};
use crate::drivers::DriverTable;
use crate::error::{AlarmSrvError, Result};
use crate::service::{AlarmService, AlarmServiceHandle};

#[derive(Debug, Parser)]
#[command(name = "alarmsrv", version, about = "Alarm device orchestration service")]
pub struct Args {
    #[command(flatten)]
    pub service: ServiceArgs,
}

impl Args {
    pub fn config_path(&self) -> &str {
        self.service.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }
}

/// Load configuration and apply CLI overrides
pub fn load_config(args: &Args) -> Result<AlarmsrvConfig> {
    let mut config = AlarmsrvConfig::load(args.config_path())?;
    apply_overrides(&mut config, &args.service)?;
    config.validate()?;
    Ok(config)
}

pub fn apply_overrides(config: &mut AlarmsrvConfig, args: &ServiceArgs) -> Result<()> {
    if let Some(path) = &args.db_path {
        config.database.path = path.clone();
    }
    if let Some(url) = &args.redis_url {
        config.bus.redis_url = url.clone();
    }
    if let Some(bind) = &args.bind_address {
        let (host, port) = bind.rsplit_once(':').ok_or_else(|| {
            AlarmSrvError::Config(format!("bind address '{}' must be host:port", bind))
        })?;
        config.service.host = host.to_string();
        config.service.port = port
            .parse()
            .map_err(|_| AlarmSrvError::Config(format!("invalid port in '{}'", bind)))?;
    }
    Ok(())
}

/// Open the configuration database and load the device cache
pub async fn open_cache(config: &AlarmsrvConfig) -> Result<Arc<DeviceCache>> {
    let pool = common::sqlite::open_pool(&config.database.path)
        .await
        .map_err(|e| AlarmSrvError::Config(format!("{:#}", e)))?;
    let store = SqliteSensorStore::new(pool);
    store.ensure_schema().await?;

    let cache = Arc::new(DeviceCache::new(Arc::new(store)));
    cache.reload().await?;
    Ok(cache)
}

/// Start the dispatch task with the standard drivers
pub fn start_service(config: &AlarmsrvConfig, cache: Arc<DeviceCache>) -> AlarmServiceHandle {
    let drivers = DriverTable::standard(config);
    info!("Alarm drivers registered: {}", drivers.len());
    AlarmService::spawn(&config.dispatch, cache, drivers)
}
