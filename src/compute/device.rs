//! Device seam - what the engine needs from a compute backend.
//!
//! The engine never touches surface memory itself. It asks a [`ComputeDevice`]
//! to allocate surfaces, compile passes against a [`PassLayout`], and run
//! them. [`CpuDevice`](super::CpuDevice) and [`GpuDevice`](super::gpu::GpuDevice)
//! are the two implementations.

use crate::schema::{CellValue, GridSize, InitialState, UniformDecl, UniformValue};

use super::gpu::GpuError;

/// Capabilities probed before any surface is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Whether 4-channel 32-bit float surfaces can be sampled and written.
    pub float_surfaces: bool,
    /// Number of surface inputs a single pass may read.
    pub max_surface_inputs: u32,
    /// Largest surface width or height.
    pub max_dimension: u32,
}

impl DeviceCapabilities {
    /// Capabilities of a device with no restrictions worth reporting.
    pub const FULL: Self = Self {
        float_surfaces: true,
        max_surface_inputs: 16,
        max_dimension: u32::MAX,
    };

    /// Check the capabilities against an engine's grid and its widest pass.
    ///
    /// Returns a human-readable reason on failure.
    pub fn check(&self, size: GridSize, required_inputs: u32) -> Result<(), String> {
        if !self.float_surfaces {
            return Err("no support for 32-bit float surfaces".to_string());
        }
        if self.max_surface_inputs == 0 {
            return Err("no surface inputs available to the compute stage".to_string());
        }
        if size.width > self.max_dimension || size.height > self.max_dimension {
            return Err(format!(
                "a {}x{} grid exceeds the device's {} cell surface limit",
                size.width, size.height, self.max_dimension
            ));
        }
        if required_inputs > self.max_surface_inputs {
            return Err(format!(
                "a pass reads {} surfaces but the device allows {}",
                required_inputs, self.max_surface_inputs
            ));
        }
        Ok(())
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// Named-input table a pass is compiled against.
///
/// Surface inputs are listed in dependency order, uniforms in declaration
/// order. [`PassBindings`] supplies resources in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct PassLayout {
    /// Grid resolution, always visible to the pass.
    pub resolution: GridSize,
    /// Surface input names.
    pub surfaces: Vec<String>,
    /// Uniform declarations.
    pub uniforms: Vec<UniformDecl>,
}

impl PassLayout {
    pub fn new(resolution: GridSize) -> Self {
        Self {
            resolution,
            surfaces: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    pub fn surface_index(&self, name: &str) -> Option<usize> {
        self.surfaces.iter().position(|s| s == name)
    }

    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| u.name == name)
    }
}

/// Resources bound for one pass invocation, aligned with its [`PassLayout`].
pub struct PassBindings<'a, S> {
    pub surfaces: Vec<&'a S>,
    pub uniforms: &'a [UniformValue],
}

/// A backend able to hold surfaces and run per-cell passes over them.
pub trait ComputeDevice {
    /// Device-resident grid of `width x height` cells, four f32 each.
    type Surface;
    /// Caller-authored pass logic, before it is bound to a layout.
    type Program;
    /// Program compiled against a layout, ready to dispatch.
    type Pipeline;

    /// Capabilities used by the engine's init-time probe.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Allocate a zero-initialised surface with nearest sampling and no mips.
    fn allocate(&mut self, size: GridSize) -> Result<Self::Surface, DeviceError>;

    /// Return a surface to the device. Dropping it is enough for both
    /// built-in devices.
    fn release(&mut self, surface: Self::Surface) {
        drop(surface);
    }

    /// Create a surface holding host data.
    fn upload(&mut self, state: &InitialState) -> Result<Self::Surface, DeviceError>;

    /// Run the built-in copy pass: every output cell takes the input cell.
    fn copy_pass(&mut self, input: &Self::Surface, output: &mut Self::Surface);

    /// Bind a program to its named inputs.
    fn compile(
        &mut self,
        label: &str,
        program: &Self::Program,
        layout: &PassLayout,
    ) -> Result<Self::Pipeline, DeviceError>;

    /// Run a compiled pass over every cell of `output`.
    fn dispatch(
        &mut self,
        pipeline: &Self::Pipeline,
        bindings: &PassBindings<'_, Self::Surface>,
        output: &mut Self::Surface,
    );

    /// Submit any recorded work. Called after every frame and after seeding.
    fn flush(&mut self) {}

    /// Read a surface back to the host.
    fn read(&mut self, surface: &Self::Surface) -> Result<Vec<CellValue>, DeviceError>;
}

/// Error type for device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Pass '{label}' failed to compile: {message}")]
    Compile { label: String, message: String },

    #[error("Surface allocation failed: {0}")]
    Allocation(String),

    #[error("Surface data has {found} cells, expected {expected}")]
    SizeMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_check() {
        let grid = GridSize::new(64, 64);
        assert!(DeviceCapabilities::FULL.check(grid, 4).is_ok());

        let no_float = DeviceCapabilities {
            float_surfaces: false,
            ..DeviceCapabilities::FULL
        };
        assert!(no_float.check(grid, 1).unwrap_err().contains("float"));

        let no_inputs = DeviceCapabilities {
            max_surface_inputs: 0,
            ..DeviceCapabilities::FULL
        };
        assert!(no_inputs.check(grid, 0).is_err());

        let narrow = DeviceCapabilities {
            max_surface_inputs: 2,
            ..DeviceCapabilities::FULL
        };
        assert!(narrow.check(grid, 2).is_ok());
        assert!(narrow.check(grid, 3).is_err());
    }

    #[test]
    fn test_capability_check_grid_limit() {
        let small = DeviceCapabilities {
            max_dimension: 8192,
            ..DeviceCapabilities::FULL
        };
        assert!(small.check(GridSize::new(8192, 8192), 1).is_ok());
        assert!(small.check(GridSize::new(20000, 1), 1).unwrap_err().contains("20000x1"));
        assert!(small.check(GridSize::new(1, 8193), 1).is_err());
    }

    #[test]
    fn test_layout_lookup() {
        let mut layout = PassLayout::new(GridSize::new(4, 4));
        layout.surfaces = vec!["a".into(), "b".into()];
        layout.uniforms = vec![UniformDecl::scalar("k", 1.0)];
        assert_eq!(layout.surface_index("b"), Some(1));
        assert_eq!(layout.surface_index("k"), None);
        assert_eq!(layout.uniform_index("k"), Some(0));
    }
}
