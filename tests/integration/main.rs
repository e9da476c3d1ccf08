//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below exercises a cross-module pipeline against the crate's
//! own host-side fakes. All tests run on the host (x86_64), no ESP32
//! hardware required.

mod console_pipeline_tests;
mod mock_hw;
mod pipeline_tests;
