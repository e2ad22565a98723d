//! Database models split into domain-specific modules.

pub mod application;
pub mod user;
pub mod vendor;

pub use application::*;
pub use user::*;
pub use vendor::*;
