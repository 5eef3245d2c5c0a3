// detailed implementation
pub mod algorithms;
pub mod config;
pub mod environments;
pub mod error;
pub mod logger;
pub mod networks;
pub mod replay_buffer;
pub mod utils;

// Traits
pub mod agent;
pub mod environment;
pub mod policy;

pub use error::{Error, Result};
