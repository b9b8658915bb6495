pub mod aggregate;
pub mod config;
pub mod error;
pub mod json;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod remote;
pub mod round_cache;
pub mod store;
pub mod ttl_cache;
pub mod view;

pub use error::{Error, Result};
