//! Integration test harness.

mod mock_sources;
mod pipeline;
