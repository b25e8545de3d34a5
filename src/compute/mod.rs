//! Compute module - surfaces, passes, variables, and the frame scheduler.

mod cpu;
mod device;
mod engine;
mod graph;
mod pass;
mod surface;
mod variable;

pub mod gpu;

pub use cpu::*;
pub use device::*;
pub use engine::*;
pub use graph::*;
pub use pass::*;
pub use surface::*;
pub use variable::*;
