pub mod health;
pub mod indexing;
pub mod proxy;
pub mod query;
pub mod readiness;
