//! HTTP surface and admission control for the edge analytics engine.

pub mod extractors;
pub mod gateway;
pub mod response;
pub mod routes;
pub mod state;

pub use gateway::{Accepted, GatewayConfig, IngestionGateway};
pub use routes::router;
pub use state::AppState;
