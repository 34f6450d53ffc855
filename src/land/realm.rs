//! `Realm`: the top-level collection of land
//! types sharing one `WebSocketTransport`, with a lifecycle (`run`,
//! `shutdown`) and a periodic sync-tick driver per land type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::keeper::LandKeeper;
use super::manager::{LandKeeperFactory, LandManager};
use super::router::LandRouter;
use crate::websocket::transport::WebSocketTransport;

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("a land type named {0:?} is already registered")]
    DuplicateLandType(String),
    #[error("land type name must not be empty")]
    EmptyLandType,
}

/// Drives one land type's periodic sync ticks and empty-land sweeps for as
/// long as the realm is running.
struct LandTypeRuntime {
    sync_task: JoinHandle<()>,
    sweep_task: Option<JoinHandle<()>>,
}

/// The process-wide collection of every registered land type, each with its
/// own `LandManager`/`LandRouter` pair but sharing one `WebSocketTransport`.
/// Only one keeper type can be registered per realm instance at the Rust
/// type level; applications with multiple distinct keeper types run one
/// `Realm` per type and fan incoming connections out by land type before
/// the WebSocket upgrade.
pub struct Realm<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> {
    transport: Arc<WebSocketTransport>,
    land_types: std::sync::Mutex<HashMap<String, (Arc<LandManager<K, F>>, Arc<LandRouter<K, F>>)>>,
    runtimes: tokio::sync::Mutex<HashMap<String, LandTypeRuntime>>,
}

impl<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K> + 'static> Realm<K, F> {
    pub fn new(transport: Arc<WebSocketTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            land_types: std::sync::Mutex::new(HashMap::new()),
            runtimes: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn transport(&self) -> &Arc<WebSocketTransport> {
        &self.transport
    }

    /// Registers a land type, rejecting duplicates and empty names.
    pub fn register_land_type(
        &self,
        manager: Arc<LandManager<K, F>>,
        enable_legacy_join: bool,
    ) -> Result<Arc<LandRouter<K, F>>, RealmError> {
        let land_type = manager.land_type().to_string();
        if land_type.is_empty() {
            return Err(RealmError::EmptyLandType);
        }
        let mut land_types = self.land_types.lock().expect("land_types mutex poisoned");
        if land_types.contains_key(&land_type) {
            return Err(RealmError::DuplicateLandType(land_type));
        }
        let router = LandRouter::new(Arc::clone(&manager), Arc::clone(&self.transport), enable_legacy_join);
        land_types.insert(land_type, (manager, Arc::clone(&router)));
        Ok(router)
    }

    pub fn router_for(&self, land_type: &str) -> Option<Arc<LandRouter<K, F>>> {
        self.land_types
            .lock()
            .expect("land_types mutex poisoned")
            .get(land_type)
            .map(|(_, router)| Arc::clone(router))
    }

    pub fn registered_land_types(&self) -> Vec<String> {
        self.land_types.lock().expect("land_types mutex poisoned").keys().cloned().collect()
    }

    /// Starts the periodic sync-tick and empty-land-sweep background tasks
    /// for every registered land type. Idempotent per land
    /// type: calling this twice without an intervening `shutdown` leaves the
    /// earlier tasks running rather than double-spawning.
    pub async fn run(self: &Arc<Self>, sync_interval: Duration, sweep_interval: Option<Duration>) {
        let land_types: Vec<(String, Arc<LandManager<K, F>>)> = self
            .land_types
            .lock()
            .expect("land_types mutex poisoned")
            .iter()
            .map(|(name, (manager, _))| (name.clone(), Arc::clone(manager)))
            .collect();

        let mut runtimes = self.runtimes.lock().await;
        for (land_type, manager) in land_types {
            if runtimes.contains_key(&land_type) {
                continue;
            }
            let sync_manager = Arc::clone(&manager);
            let sync_task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sync_interval);
                loop {
                    ticker.tick().await;
                    for instance_id in sync_manager.list_instance_ids().await {
                        if let Some(adapter) = sync_manager.get_land(&instance_id).await {
                            adapter.sync_now().await;
                        }
                    }
                }
            });

            let sweep_task = sweep_interval.map(|interval| {
                let sweep_manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        ticker.tick().await;
                        let removed = sweep_manager.sweep_empty_lands(interval).await;
                        for instance_id in removed {
                            tracing::info!(land_type = %sweep_manager.land_type(), %instance_id, "swept empty land");
                        }
                    }
                })
            });

            runtimes.insert(land_type, LandTypeRuntime { sync_task, sweep_task });
        }
    }

    /// Aborts every background task started by `run`.
    pub async fn shutdown(&self) {
        let mut runtimes = self.runtimes.lock().await;
        for (_, runtime) in runtimes.drain() {
            runtime.sync_task.abort();
            if let Some(sweep_task) = runtime.sweep_task {
                sweep_task.abort();
            }
        }
    }

    /// True while the realm has at least one land type with a running sync
    /// task.
    pub async fn health_check(&self) -> bool {
        !self.runtimes.lock().await.is_empty()
    }
}
