//! API request handlers

mod health;
mod session;

pub use health::*;
pub use session::*;
