//! Request handlers.

pub mod clip;
pub mod download;
pub mod health;
pub mod jobs;

pub use clip::*;
pub use download::*;
pub use health::*;
pub use jobs::*;
