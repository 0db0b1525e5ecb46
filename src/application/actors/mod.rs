pub mod telemetry_actor;

pub use telemetry_actor::{TelemetryConfig, TelemetryEvent, TelemetryHandle, TelemetrySink, TelemetryStats};
