//! CPU device - reference backend running passes as Rust closures.
//!
//! Each pass is a function from a [`Cell`] to the cell's new value. Cells are
//! evaluated in parallel over rows, with no ordering between them, the same
//! contract a GPU dispatch gives.

use std::fmt;
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::schema::{CellValue, GridSize, InitialState, UniformValue};

use super::{ComputeDevice, DeviceCapabilities, DeviceError, PassBindings, PassLayout};

/// A grid of cell values in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSurface {
    size: GridSize,
    cells: Vec<CellValue>,
}

impl CpuSurface {
    #[inline]
    pub fn size(&self) -> GridSize {
        self.size
    }

    #[inline]
    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }

    /// Load with clamp-to-edge addressing.
    #[inline]
    pub fn load(&self, x: i64, y: i64) -> CellValue {
        let cx = x.clamp(0, self.size.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.size.height as i64 - 1) as u32;
        self.cells[self.size.idx(cx, cy)]
    }

    /// Nearest-neighbour sample at normalised coordinates.
    #[inline]
    pub fn sample(&self, uv: [f32; 2]) -> CellValue {
        let x = (uv[0] * self.size.width as f32).floor() as i64;
        let y = (uv[1] * self.size.height as f32).floor() as i64;
        self.load(x, y)
    }
}

type CellFn = dyn Fn(&Cell<'_>) -> CellValue + Send + Sync;

/// Pass logic for the CPU device.
#[derive(Clone)]
pub struct CpuProgram(Arc<CellFn>);

impl CpuProgram {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Cell<'_>) -> CellValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for CpuProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CpuProgram(..)")
    }
}

/// A program bound to its named-input table.
#[derive(Debug, Clone)]
pub struct CpuPipeline {
    label: String,
    program: CpuProgram,
    layout: PassLayout,
}

impl CpuPipeline {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn layout(&self) -> &PassLayout {
        &self.layout
    }
}

/// What a CPU pass sees while computing one cell.
pub struct Cell<'a> {
    x: u32,
    y: u32,
    layout: &'a PassLayout,
    surfaces: &'a [&'a CpuSurface],
    uniforms: &'a [UniformValue],
}

impl<'a> Cell<'a> {
    /// Integer cell coordinates.
    #[inline]
    pub fn coord(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Grid resolution in cells.
    #[inline]
    pub fn resolution(&self) -> [f32; 2] {
        self.layout.resolution.resolution()
    }

    /// Normalised coordinates of the cell center.
    #[inline]
    pub fn uv(&self) -> [f32; 2] {
        let [w, h] = self.resolution();
        [(self.x as f32 + 0.5) / w, (self.y as f32 + 0.5) / h]
    }

    /// Named surface input, if the pass was compiled with it.
    pub fn input(&self, name: &str) -> Option<SurfaceInput<'a>> {
        let i = self.layout.surface_index(name)?;
        Some(SurfaceInput {
            surface: *self.surfaces.get(i)?,
            x: self.x,
            y: self.y,
        })
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.uniform(name)? {
            UniformValue::Scalar(v) => Some(v),
            UniformValue::Vec2(_) => None,
        }
    }

    pub fn vec2(&self, name: &str) -> Option<[f32; 2]> {
        match self.uniform(name)? {
            UniformValue::Vec2(v) => Some(v),
            UniformValue::Scalar(_) => None,
        }
    }

    fn uniform(&self, name: &str) -> Option<UniformValue> {
        let i = self.layout.uniform_index(name)?;
        self.uniforms.get(i).copied()
    }
}

/// A surface input as seen from one cell.
#[derive(Clone, Copy)]
pub struct SurfaceInput<'a> {
    surface: &'a CpuSurface,
    x: u32,
    y: u32,
}

impl SurfaceInput<'_> {
    /// Value at the cell being computed.
    #[inline]
    pub fn current(&self) -> CellValue {
        self.surface.load(self.x as i64, self.y as i64)
    }

    /// Value at an offset from the cell being computed, clamped to the edge.
    #[inline]
    pub fn offset(&self, dx: i64, dy: i64) -> CellValue {
        self.surface.load(self.x as i64 + dx, self.y as i64 + dy)
    }

    #[inline]
    pub fn load(&self, x: i64, y: i64) -> CellValue {
        self.surface.load(x, y)
    }

    #[inline]
    pub fn sample(&self, uv: [f32; 2]) -> CellValue {
        self.surface.sample(uv)
    }
}

/// Host-memory compute device.
#[derive(Debug, Clone)]
pub struct CpuDevice {
    capabilities: DeviceCapabilities,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities::FULL,
        }
    }

    /// A device reporting the given capabilities, for exercising the
    /// engine's capability probe.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self { capabilities }
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDevice for CpuDevice {
    type Surface = CpuSurface;
    type Program = CpuProgram;
    type Pipeline = CpuPipeline;

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn allocate(&mut self, size: GridSize) -> Result<CpuSurface, DeviceError> {
        Ok(CpuSurface {
            size,
            cells: vec![[0.0; 4]; size.cells()],
        })
    }

    fn upload(&mut self, state: &InitialState) -> Result<CpuSurface, DeviceError> {
        if !state.is_consistent() {
            return Err(DeviceError::SizeMismatch {
                expected: state.size.cells(),
                found: state.cells.len(),
            });
        }
        Ok(CpuSurface {
            size: state.size,
            cells: state.cells.clone(),
        })
    }

    fn copy_pass(&mut self, input: &CpuSurface, output: &mut CpuSurface) {
        for (out, cell) in output.cells.iter_mut().zip(&input.cells) {
            *out = *cell;
        }
    }

    fn compile(
        &mut self,
        label: &str,
        program: &CpuProgram,
        layout: &PassLayout,
    ) -> Result<CpuPipeline, DeviceError> {
        Ok(CpuPipeline {
            label: label.to_string(),
            program: program.clone(),
            layout: layout.clone(),
        })
    }

    fn dispatch(
        &mut self,
        pipeline: &CpuPipeline,
        bindings: &PassBindings<'_, CpuSurface>,
        output: &mut CpuSurface,
    ) {
        let width = output.size.width as usize;
        let f = &pipeline.program.0;
        let layout = &pipeline.layout;
        let surfaces = bindings.surfaces.as_slice();
        let uniforms = bindings.uniforms;

        let compute_row = |(y, row): (usize, &mut [CellValue])| {
            for (x, out) in row.iter_mut().enumerate() {
                let cell = Cell {
                    x: x as u32,
                    y: y as u32,
                    layout,
                    surfaces,
                    uniforms,
                };
                *out = f(&cell);
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        output
            .cells
            .par_chunks_mut(width)
            .enumerate()
            .for_each(compute_row);

        #[cfg(target_arch = "wasm32")]
        output.cells.chunks_mut(width).enumerate().for_each(compute_row);
    }

    fn read(&mut self, surface: &CpuSurface) -> Result<Vec<CellValue>, DeviceError> {
        Ok(surface.cells.clone())
    }
}
