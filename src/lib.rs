//! Ping-pong compute - double-buffered per-cell passes on GPU or CPU.
//!
//! An [`Engine`] holds named variables on a fixed `width x height` grid.
//! Each variable owns two surfaces of four-component f32 cells and a pass
//! that computes one cell of the next state from the current state of the
//! variables it depends on. Every [`Engine::compute`] call runs each pass
//! once and swaps the surfaces, so a pass never reads what it writes.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Grid configuration, initial states, and typed pass inputs
//! - `compute`: Device backends, passes, variables, and the frame scheduler
//!
//! # Example
//!
//! ```rust,no_run
//! use pingpong_compute::{
//!     compute::{ComputePass, CpuDevice, CpuProgram, Engine},
//!     schema::{Pattern, Seed, UniformDecl},
//! };
//!
//! let mut engine = Engine::new(64, 64, CpuDevice::new()).unwrap();
//!
//! // Explicit diffusion: each cell relaxes towards its neighbours.
//! let diffuse = ComputePass::new(
//!     "diffuse",
//!     CpuProgram::new(|cell| {
//!         let Some(h) = cell.input("heat") else { return [0.0; 4] };
//!         let rate = cell.scalar("rate").unwrap_or(0.0);
//!         let c = h.current();
//!         let sum = h.offset(-1, 0)[0] + h.offset(1, 0)[0] + h.offset(0, -1)[0] + h.offset(0, 1)[0];
//!         [c[0] + rate * (sum - 4.0 * c[0]), 0.0, 0.0, 1.0]
//!     }),
//! )
//! .with_uniform(UniformDecl::scalar("rate", 0.2));
//!
//! let seed = Seed {
//!     pattern: Pattern::GaussianBlob {
//!         center: (0.5, 0.5),
//!         radius: 0.1,
//!         amplitude: 1.0,
//!         component: 0,
//!     },
//! };
//! let heat = engine
//!     .add_variable("heat", diffuse, seed.generate(engine.size()))
//!     .unwrap();
//! engine.set_dependencies(heat, &[heat]).unwrap();
//! engine.init().unwrap();
//!
//! for _ in 0..100 {
//!     engine.compute().unwrap();
//! }
//!
//! let cells = engine.read_current(heat).unwrap();
//! println!("Total heat after 100 frames: {}", cells.iter().map(|c| c[0]).sum::<f32>());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::gpu::{GpuDevice, GpuError, WgslProgram};
pub use compute::{
    ComputeDevice, ComputePass, CpuDevice, CpuProgram, Engine, EngineError, SurfaceId,
    VariableHandle,
};
pub use schema::{
    EngineConfig, FrameOrdering, GridSize, InitialState, Pattern, Seed, UniformDecl, UniformValue,
};
