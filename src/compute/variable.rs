//! Variable - a named field with its own pass and surface pair.

use crate::schema::InitialState;

use super::{ComputeDevice, ComputePass, Slot, SurfaceId};

/// Handle to a variable registered on an engine.
///
/// Handles remember which engine issued them, so passing one to a different
/// engine is reported instead of silently addressing another variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableHandle {
    pub(crate) engine: u64,
    pub(crate) index: usize,
}

impl VariableHandle {
    /// Registration index of the variable.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A variable record.
///
/// `surfaces` is filled in by the engine's init step; until then the variable
/// owns no device memory. The host copy of the initial state is dropped once
/// the engine is ready.
pub struct Variable<D: ComputeDevice> {
    pub(crate) name: String,
    pub(crate) pass: ComputePass<D::Program>,
    pub(crate) pipeline: Option<D::Pipeline>,
    pub(crate) initial: Option<InitialState>,
    pub(crate) dependencies: Vec<VariableHandle>,
    pub(crate) surfaces: Option<[SurfaceId; 2]>,
    pub(crate) current: Slot,
}

impl<D: ComputeDevice> Variable<D> {
    pub(crate) fn new(name: String, pass: ComputePass<D::Program>, initial: InitialState) -> Self {
        Self {
            name,
            pass,
            pipeline: None,
            initial: Some(initial),
            dependencies: Vec::new(),
            surfaces: None,
            current: Slot::A,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pass(&self) -> &ComputePass<D::Program> {
        &self.pass
    }

    #[inline]
    pub fn dependencies(&self) -> &[VariableHandle] {
        &self.dependencies
    }

    /// Host-side initial state, until `init()` has seeded the surfaces.
    #[inline]
    pub fn initial_state(&self) -> Option<&InitialState> {
        self.initial.as_ref()
    }

    /// Slot holding the last fully computed state.
    #[inline]
    pub fn current_slot(&self) -> Slot {
        self.current
    }

    /// Surface holding the last fully computed state.
    pub fn current_surface(&self) -> Option<SurfaceId> {
        self.surfaces.map(|s| s[self.current.index()])
    }

    /// Surface the next pass writes into.
    pub fn alternate_surface(&self) -> Option<SurfaceId> {
        self.surfaces.map(|s| s[self.current.other().index()])
    }

    /// Make the write target current.
    #[inline]
    pub(crate) fn flip(&mut self) {
        self.current = self.current.other();
    }
}
