//! The land-sync gateway core: opaque identifiers, membership, the wire
//! codec registry's domain types, the diff/sync engine, and the per-room and
//! process-wide orchestrators built on top of `websocket::transport`.

pub mod config;
pub mod demo;
pub mod error;
pub mod ids;
pub mod keeper;
pub mod manager;
pub mod membership;
pub mod pending_events;
pub mod realm;
pub mod router;
pub mod slots;
pub mod sync_engine;
pub mod transport_adapter;

pub use config::LandRuntimeConfig;
pub use demo::{DemoLandKeeper, DemoLandKeeperFactory, DemoLandState};
pub use error::{ErrorCode, LandError};
pub use ids::{ClientId, LandId, MembershipStamp, PlayerId, PlayerSlot, SessionId};
pub use keeper::{ActionError, FieldPolicy, JoinError, JoinOutcome, LandKeeper, LandState, PlayerSession};
pub use manager::{LandKeeperFactory, LandManager, LandStats};
pub use membership::MembershipCoordinator;
pub use pending_events::{EventTarget, PendingEventManager};
pub use realm::{Realm, RealmError};
pub use router::LandRouter;
pub use sync_engine::SyncEngine;
pub use transport_adapter::{JoinRequest, TransportAdapter};
