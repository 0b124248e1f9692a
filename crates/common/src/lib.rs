pub mod catalog;
pub mod detections;
pub mod geo;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
