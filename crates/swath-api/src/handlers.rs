//! Request handlers.

pub mod health;
pub mod jobs;
pub mod processes;

pub use health::*;
pub use jobs::*;
pub use processes::*;
