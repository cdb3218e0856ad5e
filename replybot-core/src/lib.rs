pub mod config;
pub mod error;
pub mod error_utils;
pub mod filter;
pub mod reply;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use filter::*;
pub use reply::*;
pub use types::*;
