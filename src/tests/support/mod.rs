// Shared test support code for unit and integration tests.

pub mod common;
pub mod exporter;
pub mod gateway;
pub mod logs;

pub use common::*;
pub use exporter::ExporterServer;
pub use gateway::FlakyGateway;
pub use logs::CapturedLogs;
