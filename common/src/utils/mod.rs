pub mod config;
pub mod ingest_limits;
