//! `LandManager` and `LandTypeRegistry`: the container that
//! owns every live instance of one land type and knows how to spin up a
//! fresh `TransportAdapter` + keeper pair for a new instance id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::config::LandRuntimeConfig;
use super::ids::LandId;
use super::keeper::LandKeeper;
use super::transport_adapter::TransportAdapter;
use crate::websocket::transport::WebSocketTransport;

/// Builds a fresh keeper for a newly created land instance.
#[async_trait]
pub trait LandKeeperFactory: Send + Sync {
    type Keeper: LandKeeper + 'static;

    async fn create(&self, land_id: &LandId) -> Arc<Self::Keeper>;
}

struct LandEntry<K: LandKeeper> {
    adapter: Arc<TransportAdapter<K>>,
    created_at: Instant,
}

/// A point-in-time summary of one live land.
#[derive(Debug, Clone)]
pub struct LandStats {
    pub land_id: LandId,
    pub player_count: usize,
    pub age: std::time::Duration,
}

/// Owns every live instance of a single land type, keyed by instance id.
/// `""` is the legacy single-room-per-type instance.
pub struct LandManager<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> {
    land_type: String,
    factory: F,
    transport: Arc<WebSocketTransport>,
    config: LandRuntimeConfig,
    lands: RwLock<HashMap<String, LandEntry<K>>>,
}

impl<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> LandManager<K, F> {
    pub fn new(land_type: impl Into<String>, factory: F, transport: Arc<WebSocketTransport>, config: LandRuntimeConfig) -> Self {
        Self {
            land_type: land_type.into(),
            factory,
            transport,
            config,
            lands: RwLock::new(HashMap::new()),
        }
    }

    pub fn land_type(&self) -> &str {
        &self.land_type
    }

    /// Returns the adapter for `instance_id`, creating it (and its keeper)
    /// if it doesn't exist yet.
    pub async fn get_or_create_land(&self, instance_id: &str) -> Arc<TransportAdapter<K>> {
        if let Some(entry) = self.lands.read().await.get(instance_id) {
            return Arc::clone(&entry.adapter);
        }

        let mut lands = self.lands.write().await;
        if let Some(entry) = lands.get(instance_id) {
            return Arc::clone(&entry.adapter);
        }

        let land_id = LandId::new(self.land_type.clone(), instance_id.to_string());
        let keeper = self.factory.create(&land_id).await;
        let adapter = Arc::new(TransportAdapter::new(
            land_id,
            keeper,
            Arc::clone(&self.transport),
            self.config.clone(),
        ));
        lands.insert(
            instance_id.to_string(),
            LandEntry {
                adapter: Arc::clone(&adapter),
                created_at: Instant::now(),
            },
        );
        adapter
    }

    pub async fn get_land(&self, instance_id: &str) -> Option<Arc<TransportAdapter<K>>> {
        self.lands.read().await.get(instance_id).map(|e| Arc::clone(&e.adapter))
    }

    pub async fn remove_land(&self, instance_id: &str) -> bool {
        self.lands.write().await.remove(instance_id).is_some()
    }

    pub async fn list_instance_ids(&self) -> Vec<String> {
        self.lands.read().await.keys().cloned().collect()
    }

    pub async fn get_land_stats(&self) -> Vec<LandStats> {
        let lands = self.lands.read().await;
        let mut stats = Vec::with_capacity(lands.len());
        for (instance_id, entry) in lands.iter() {
            stats.push(LandStats {
                land_id: LandId::new(self.land_type.clone(), instance_id.clone()),
                player_count: entry.adapter.player_count().await,
                age: entry.created_at.elapsed(),
            });
        }
        stats
    }

    /// Sweeps instances that have had zero players for at least
    /// `empty_timeout`, the configured `emptyLandTimeout` knob. Newly
    /// created lands are never swept within their first tick because
    /// `created_at` is set at construction.
    pub async fn sweep_empty_lands(&self, empty_timeout: std::time::Duration) -> Vec<String> {
        let mut removed = Vec::new();
        let mut lands = self.lands.write().await;
        let mut to_remove = Vec::new();
        for (instance_id, entry) in lands.iter() {
            if entry.adapter.player_count().await == 0 && entry.created_at.elapsed() >= empty_timeout {
                to_remove.push(instance_id.clone());
            }
        }
        for instance_id in to_remove {
            lands.remove(&instance_id);
            removed.push(instance_id);
        }
        removed
    }
}
