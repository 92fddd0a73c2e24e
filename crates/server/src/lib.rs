//! HTTP service layer over the streamfinder resolution engine.

pub mod api;
pub mod metrics;
pub mod state;
