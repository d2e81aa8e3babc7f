// src/backend/mod.rs
mod model;

pub use model::{Backend, BackendMetrics, BackendView};
