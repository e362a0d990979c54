// Library for tests to access modules

pub mod config;
pub mod delta;
pub mod downsample;
pub mod error;
pub mod history_repo;
pub mod ingest;
pub mod maintenance;
pub mod memory_repo;
pub mod models;
pub mod retry;
pub mod rollup;
pub mod routes;
pub mod service;
pub mod store;
