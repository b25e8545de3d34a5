//! Initial state for engine variables.

use serde::{Deserialize, Serialize};

use super::GridSize;

/// Number of components stored per cell.
pub const CELL_COMPONENTS: usize = 4;

/// One cell value: four floating-point components.
pub type CellValue = [f32; CELL_COMPONENTS];

/// Host-side grid of cell values used to seed a variable's surfaces.
///
/// Data is row-major: index = y * width + x.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialState {
    /// Grid the data was generated for.
    pub size: GridSize,
    /// Cell values, `size.cells()` entries.
    pub cells: Vec<CellValue>,
}

impl InitialState {
    /// A zero-filled state of the given size.
    pub fn zeros(size: GridSize) -> Self {
        Self::filled(size, [0.0; CELL_COMPONENTS])
    }

    /// A state with every cell set to `value`.
    pub fn filled(size: GridSize, value: CellValue) -> Self {
        Self {
            size,
            cells: vec![value; size.cells()],
        }
    }

    /// Build a state by evaluating `f(x, y)` for every cell.
    pub fn from_fn(size: GridSize, mut f: impl FnMut(u32, u32) -> CellValue) -> Self {
        let mut cells = Vec::with_capacity(size.cells());
        for y in 0..size.height {
            for x in 0..size.width {
                cells.push(f(x, y));
            }
        }
        Self { size, cells }
    }

    /// Cell value at (x, y).
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> CellValue {
        self.cells[self.size.idx(x, y)]
    }

    /// Set the cell value at (x, y).
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: CellValue) {
        let i = self.size.idx(x, y);
        self.cells[i] = value;
    }

    /// True when the cell count matches the declared size.
    pub fn is_consistent(&self) -> bool {
        self.cells.len() == self.size.cells()
    }

    /// Sum of one component over the grid.
    pub fn component_sum(&self, component: usize) -> f32 {
        self.cells.iter().map(|c| c[component]).sum()
    }

    /// Flatten to a contiguous f32 slice, 4 floats per cell.
    pub fn as_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.cells)
    }
}

/// Seed description for variable initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    /// Pattern to use for seeding.
    pub pattern: Pattern,
}

/// Predefined patterns for initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// All components zero.
    #[default]
    Zeros,
    /// Every cell holds the same value.
    Constant {
        value: CellValue,
    },
    /// Single Gaussian blob in one component.
    GaussianBlob {
        /// Center position as fraction of grid size (0.0-1.0).
        center: (f32, f32),
        /// Radius as fraction of the smaller grid dimension.
        radius: f32,
        /// Peak amplitude.
        amplitude: f32,
        /// Target component.
        component: usize,
    },
    /// Uniform noise in [0, amplitude).
    Noise {
        amplitude: f32,
        /// Optional component (None = all four).
        component: Option<usize>,
        /// PRNG seed.
        seed: u64,
    },
    /// Custom cell values (sparse representation).
    Custom {
        /// List of (x, y, component, value) entries.
        values: Vec<(u32, u32, usize, f32)>,
    },
}

impl Seed {
    /// Generate the initial state for a grid.
    pub fn generate(&self, size: GridSize) -> InitialState {
        let mut state = InitialState::zeros(size);

        match &self.pattern {
            Pattern::Zeros => {}
            Pattern::Constant { value } => {
                state.cells.fill(*value);
            }
            Pattern::GaussianBlob {
                center,
                radius,
                amplitude,
                component,
            } => {
                let cx = center.0 * size.width as f32;
                let cy = center.1 * size.height as f32;
                let r = radius * size.width.min(size.height) as f32;
                apply_gaussian(&mut state, *component, cx, cy, r, *amplitude);
            }
            Pattern::Noise {
                amplitude,
                component,
                seed,
            } => {
                apply_noise(&mut state, *component, *amplitude, *seed);
            }
            Pattern::Custom { values } => {
                for &(x, y, c, v) in values {
                    if c < CELL_COMPONENTS && x < size.width && y < size.height {
                        let i = size.idx(x, y);
                        state.cells[i][c] = v;
                    }
                }
            }
        }

        state
    }
}

fn apply_gaussian(
    state: &mut InitialState,
    component: usize,
    cx: f32,
    cy: f32,
    radius: f32,
    amplitude: f32,
) {
    if component >= CELL_COMPONENTS || radius <= 0.0 {
        return;
    }
    let width = state.size.width as usize;
    let sigma_sq = (radius / 2.0).powi(2);

    for (i, cell) in state.cells.iter_mut().enumerate() {
        // Sample at the cell center.
        let dx = (i % width) as f32 + 0.5 - cx;
        let dy = (i / width) as f32 + 0.5 - cy;
        let dist_sq = dx * dx + dy * dy;
        cell[component] += amplitude * (-dist_sq / (2.0 * sigma_sq)).exp();
    }
}

fn apply_noise(state: &mut InitialState, component: Option<usize>, amplitude: f32, seed: u64) {
    // Simple LCG PRNG for deterministic noise
    let mut s = seed;
    let mut lcg_next = || -> f32 {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        (s >> 33) as f32 / (1u64 << 31) as f32
    };

    let range = match component {
        Some(c) if c < CELL_COMPONENTS => c..c + 1,
        Some(_) => return,
        None => 0..CELL_COMPONENTS,
    };

    for cell in state.cells.iter_mut() {
        for c in range.clone() {
            cell[c] += amplitude * lcg_next();
        }
    }
}
