pub mod config;
pub mod dataset;
pub mod detection;
pub mod errors;
pub mod metrics;
pub mod model;
