//! Keymask application wiring: configuration, audit logging, and the
//! management HTTP surface.

pub mod audit;
pub mod config;
pub mod management;

pub use audit::{AuditEvent, AuditLevel, AuditLog, AuditSink};
pub use config::AppConfig;
pub use management::ManagementServer;
