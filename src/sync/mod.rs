// Periodic synchronization of counters with the persistence gateway.

pub mod synchronizer;


pub use synchronizer::{FlushReport, LoadReport, Synchronizer};
