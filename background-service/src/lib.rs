pub mod consumer;
pub mod session;


pub use consumer::*;
pub use session::*;
