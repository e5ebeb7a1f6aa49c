//! HTTP surface of a minichain node.
pub mod api;
pub mod config;
pub mod state;
pub mod transport;

pub use api::router;
pub use config::{Args, NodeConfig};
pub use state::AppState;
pub use transport::HttpTransport;
