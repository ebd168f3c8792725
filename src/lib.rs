pub mod app;
pub mod area;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod orchestrator;
pub mod ortho;
pub mod output;
pub mod pool;
pub mod sidecar;
