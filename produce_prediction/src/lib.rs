mod classifier;
mod labels;
mod model_service;
mod object_store;
mod ort_service;
mod prediction;
mod preprocessing;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
