//! Integration tests for the exporter.
//!
//! Each case boots its own exporter on an ephemeral port over an
//! in-memory gateway, so cases never share counters.


pub mod support;
