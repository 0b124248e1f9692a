pub mod alert;
pub mod annotate;
pub mod api;
pub mod config;
pub mod error;
pub mod plugin;
pub mod processor;
pub mod publisher;
pub mod route;
pub mod source;
pub mod state;
pub mod tracking;

pub use config::LaneServiceConfig;
pub use plugin::registry::PluginRegistry;
pub use processor::FrameProcessor;
pub use state::LaneServiceState;
