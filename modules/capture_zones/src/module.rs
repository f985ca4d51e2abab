//! Module declaration and lifecycle implementation

use crate::config::Config;
use crate::contract::CaptureZonesApi;
use crate::domain::{Announcer, DataStore, Service, WorldProvider};
use crate::infra::storage::{FileDataStore, InMemoryDataStore};
use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Capture zones module
pub struct CaptureZonesModule {
    config: RwLock<Config>,
    service: RwLock<Option<Arc<Service>>>,
}

impl Default for CaptureZonesModule {
    fn default() -> Self {
        Self {
            config: RwLock::new(Config::default()),
            service: RwLock::new(None),
        }
    }
}

impl CaptureZonesModule {
    /// Build the data store, the domain service and restore persisted state
    pub async fn init(
        &self,
        cfg: Config,
        world: Arc<dyn WorldProvider>,
        announcer: Arc<dyn Announcer>,
    ) -> Result<Arc<dyn CaptureZonesApi>> {
        cfg.validate()?;

        let store: Arc<dyn DataStore> = match &cfg.data_dir {
            Some(dir) => {
                tracing::info!(data_dir = %dir.display(), "using YAML data files");
                Arc::new(FileDataStore::new(dir))
            }
            None => {
                tracing::warn!("no data_dir configured, capture zones state will not survive a restart");
                Arc::new(InMemoryDataStore::new())
            }
        };

        let service = Arc::new(Service::new(store, world, announcer, cfg.plugin_version.clone())?);
        if cfg.load_on_start {
            service.load().await?;
        }

        *self.config.write() = cfg;
        *self.service.write() = Some(service.clone());

        let client: Arc<dyn CaptureZonesApi> = Arc::new(crate::api::native::NativeClient::new(service));
        tracing::info!(api_version = client.api_version(), "Capture zones initialized with native client");
        Ok(client)
    }

    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.read().clone()
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Drive occupancy and KOTH timing until cancelled
    pub async fn serve(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let service = self
            .service()
            .ok_or_else(|| anyhow::anyhow!("Service not initialized"))?;
        let period = self.config.read().tick_interval();

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = tokio::time::Instant::now();

        tracing::info!(tick_ms = period.as_millis() as u64, "capture zones tick loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                at = ticker.tick() => {
                    let dt = at.saturating_duration_since(last).as_secs_f64();
                    last = at;
                    let report = service.tick(Utc::now(), dt).await;
                    for capture in &report.captures {
                        tracing::debug!(zone_id = %capture.zone_id, owner = %capture.owner, payout = capture.payout, "tick capture");
                    }
                    if !report.koth_expired.is_empty() {
                        tracing::info!(zones = ?report.koth_expired, "KOTH session hit its time limit");
                    }
                }
            }
        }
        tracing::info!("capture zones tick loop stopped");
        Ok(())
    }
}
