//! Configuration types for compute engine instances.

use serde::{Deserialize, Serialize};

/// Grid resolution shared by every surface and pass of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of cells in the grid.
    #[inline]
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Convert (x, y) coordinates to a row-major flat index.
    #[inline]
    pub fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Resolution as floats, the form passes receive it in.
    #[inline]
    pub fn resolution(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// When a variable's freshly written surface becomes visible to the other
/// passes of the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameOrdering {
    /// Every pass in a frame reads the surfaces that were current when the
    /// frame started. All variables flip together after the last pass, so
    /// registration order never changes the result.
    #[default]
    Snapshot,
    /// Each variable flips right after its own pass. Variables registered
    /// later in the frame see this frame's value of earlier ones; earlier ones
    /// see the previous frame of later ones.
    Sequential,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Swap discipline used by the frame scheduler.
    #[serde(default)]
    pub ordering: FrameOrdering,
    /// Reject dependency cycles between distinct variables at init time.
    /// Self-dependencies are always allowed.
    #[serde(default)]
    pub reject_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            ordering: FrameOrdering::default(),
            reject_cycles: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default scheduling for the given grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    #[inline]
    pub fn size(&self) -> GridSize {
        GridSize::new(self.width, self.height)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions must be non-zero (got {width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },
}
