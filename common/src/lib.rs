pub mod backends;
pub mod error;
pub mod proxy;
pub mod utils;
