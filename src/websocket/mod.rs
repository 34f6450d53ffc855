//! WebSocket transport and HTTP surface.
//!
//! - `transport`: the room-agnostic connection registry and fan-out engine
//! - `handler`: the WebSocket upgrade entry point
//! - `routes`: HTTP route wiring and shared `AppState`
//! - `metrics`: `/metrics` and `/metrics/prom` handlers
//! - `prometheus`: Prometheus text-exposition rendering

mod handler;
mod metrics;
mod prometheus;
mod routes;
pub mod transport;

pub use handler::websocket_handler;
pub use metrics::{metrics_handler, prometheus_metrics_handler};
pub use routes::{create_router, AppState};
pub use transport::{SendTarget, TransportDelegate, WebSocketTransport};
