//! Schema module - Configuration, seeding, and typed pass input declarations.

mod config;
mod seed;
mod uniforms;

pub use config::*;
pub use seed::*;
pub use uniforms::*;
