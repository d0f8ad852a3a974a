pub mod config;
pub mod envelope;
pub mod telemetry;

pub use config::*;
pub use envelope::*;
pub use telemetry::*;
