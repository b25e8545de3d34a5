//! Engine - variable registry, init-time wiring, and the frame scheduler.
//!
//! Every variable owns two surfaces. One is current and holds the last
//! completed state; the other is the write target of the variable's next
//! pass. `compute()` runs every pass once and then makes the freshly written
//! surfaces current. When the flip happens relative to the other passes of
//! the frame is fixed by [`FrameOrdering`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::schema::{
    CellValue, ConfigError, EngineConfig, FrameOrdering, GridSize, InitialState, NameError,
    UniformValue, validate_input_name,
};

use super::{
    ComputeDevice, ComputePass, DeviceError, PassBindings, PassError, Slot, SurfaceId,
    SurfacePool, Variable, VariableHandle, find_cycle,
};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// Accepting variables and dependencies.
    Registering,
    /// Initialised; frames may run.
    Ready,
    /// `init()` failed. Nothing is allocated and nothing may run.
    Failed,
}

/// Double-buffered compute engine over a [`ComputeDevice`].
pub struct Engine<D: ComputeDevice> {
    id: u64,
    config: EngineConfig,
    device: D,
    pool: SurfacePool<D::Surface>,
    variables: Vec<Variable<D>>,
    state: EngineState,
    frame: u64,
}

impl<D: ComputeDevice> Engine<D> {
    /// Create an engine for a `width x height` grid with default scheduling.
    pub fn new(width: u32, height: u32, device: D) -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::new(width, height), device)
    }

    pub fn with_config(config: EngineConfig, device: D) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            pool: SurfacePool::new(config.size()),
            config,
            device,
            variables: Vec::new(),
            state: EngineState::Registering,
            frame: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn size(&self) -> GridSize {
        self.config.size()
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Number of completed `compute()` calls since `init()`.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Whether `init()` succeeded.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Surfaces currently owned by the engine.
    pub fn allocated_surfaces(&self) -> usize {
        self.pool.len()
    }

    /// Variables in registration order.
    pub fn variables(&self) -> impl Iterator<Item = (VariableHandle, &Variable<D>)> {
        let engine = self.id;
        self.variables
            .iter()
            .enumerate()
            .map(move |(index, v)| (VariableHandle { engine, index }, v))
    }

    pub fn variable(&self, handle: VariableHandle) -> Option<&Variable<D>> {
        self.resolve(handle).ok().map(|i| &self.variables[i])
    }

    /// Look a variable up by name.
    pub fn find(&self, name: &str) -> Option<VariableHandle> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(|index| VariableHandle {
                engine: self.id,
                index,
            })
    }

    /// Register a variable.
    ///
    /// The name becomes the input name under which dependents read this
    /// variable, so it must be a valid, unique identifier. Surfaces are not
    /// allocated until `init()`.
    pub fn add_variable(
        &mut self,
        name: &str,
        pass: ComputePass<D::Program>,
        initial: InitialState,
    ) -> Result<VariableHandle, EngineError> {
        self.ensure_registering("adding variables")?;
        validate_input_name(name).map_err(EngineError::InvalidName)?;
        if self.variables.iter().any(|v| v.name == name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        pass.validate()?;
        if initial.size != self.size() || !initial.is_consistent() {
            return Err(EngineError::GridMismatch {
                name: name.to_string(),
                expected: self.size(),
                found: initial.size,
            });
        }

        let index = self.variables.len();
        self.variables
            .push(Variable::new(name.to_string(), pass, initial));
        log::debug!("Registered variable '{}' (#{})", name, index);

        Ok(VariableHandle {
            engine: self.id,
            index,
        })
    }

    /// Replace a variable's dependency list.
    ///
    /// Each dependency is bound as a named surface input of the variable's
    /// pass. Repeated entries are bound once. A variable may list itself.
    pub fn set_dependencies(
        &mut self,
        variable: VariableHandle,
        dependencies: &[VariableHandle],
    ) -> Result<(), EngineError> {
        self.ensure_registering("setting dependencies")?;
        let index = self.resolve(variable)?;

        let mut resolved: Vec<VariableHandle> = Vec::with_capacity(dependencies.len());
        for &dep in dependencies {
            let d = self.resolve(dep)?;
            let input = &self.variables[d].name;
            if self.variables[index].pass.declares(input) {
                return Err(EngineError::InputNameConflict {
                    variable: self.variables[index].name.clone(),
                    input: input.clone(),
                });
            }
            if !resolved.contains(&dep) {
                resolved.push(dep);
            }
        }

        self.variables[index].dependencies = resolved;
        Ok(())
    }

    /// Update a uniform of a variable's pass. Takes effect on the next frame.
    pub fn set_uniform(
        &mut self,
        variable: VariableHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), EngineError> {
        let index = self.resolve(variable)?;
        self.variables[index].pass.set_uniform(name, value)?;
        Ok(())
    }

    /// Probe the device, wire dependencies, allocate and seed every surface.
    ///
    /// Either every variable ends up ready or nothing stays allocated and the
    /// engine becomes unusable.
    pub fn init(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Registering => {}
            EngineState::Ready => return Err(EngineError::AlreadyInitialized),
            EngineState::Failed => return Err(EngineError::Unusable),
        }

        match self.try_init() {
            Ok(()) => {
                self.state = EngineState::Ready;
                self.frame = 0;
                // Both surfaces hold the seed now.
                for variable in &mut self.variables {
                    variable.initial = None;
                }
                log::info!(
                    "Engine initialized: {}x{} grid, {} variables, {} surfaces",
                    self.config.width,
                    self.config.height,
                    self.variables.len(),
                    self.pool.len()
                );
                Ok(())
            }
            Err(e) => {
                self.rollback();
                self.state = EngineState::Failed;
                log::warn!("Engine initialization failed: {}", e);
                Err(e)
            }
        }
    }

    fn try_init(&mut self) -> Result<(), EngineError> {
        // The copy pass reads one surface even when no variable has dependencies.
        let required_inputs = self
            .variables
            .iter()
            .map(|v| v.dependencies.len() as u32)
            .max()
            .unwrap_or(0)
            .max(1);
        self.device
            .capabilities()
            .check(self.size(), required_inputs)
            .map_err(EngineError::UnsupportedDevice)?;

        if self.config.reject_cycles {
            let edges: Vec<Vec<usize>> = self
                .variables
                .iter()
                .map(|v| v.dependencies.iter().map(|d| d.index).collect())
                .collect();
            if let Some(cycle) = find_cycle(&edges) {
                return Err(EngineError::DependencyCycle {
                    cycle: cycle
                        .into_iter()
                        .map(|i| self.variables[i].name.clone())
                        .collect(),
                });
            }
        }

        let size = self.size();
        for index in 0..self.variables.len() {
            let inputs: Vec<String> = self.variables[index]
                .dependencies
                .iter()
                .map(|d| self.variables[d.index].name.clone())
                .collect();

            let variable = &mut self.variables[index];
            let layout = variable.pass.layout(size, inputs);
            let pipeline =
                self.device
                    .compile(variable.pass.label(), variable.pass.program(), &layout)?;

            let a = self.pool.allocate(&mut self.device)?;
            let b = match self.pool.allocate(&mut self.device) {
                Ok(b) => b,
                Err(e) => {
                    self.pool.release(&mut self.device, a);
                    return Err(e.into());
                }
            };
            variable.surfaces = Some([a, b]);
            variable.current = Slot::A;

            // Seed both slots so the first frame never reads uninitialised data.
            let initial = variable
                .initial
                .as_ref()
                .ok_or(EngineError::NotInitialized)?;
            let source = self.device.upload(initial)?;
            for id in [a, b] {
                let mut target = self
                    .pool
                    .checkout(id)
                    .ok_or(EngineError::UnknownSurface(id))?;
                self.device.copy_pass(&source, &mut target);
                self.pool.checkin(id, target);
            }
            self.device.flush();
            self.device.release(source);

            variable.pipeline = Some(pipeline);
            log::debug!(
                "Variable '{}' ready: inputs {:?}, surfaces {:?}",
                variable.name,
                layout.surfaces,
                [a, b]
            );
        }

        Ok(())
    }

    fn rollback(&mut self) {
        for variable in &mut self.variables {
            variable.pipeline = None;
            variable.current = Slot::A;
            if let Some(surfaces) = variable.surfaces.take() {
                for id in surfaces {
                    self.pool.release(&mut self.device, id);
                }
            }
        }
    }

    /// Run one frame: every variable's pass, in registration order.
    pub fn compute(&mut self) -> Result<(), EngineError> {
        self.ensure_ready()?;

        let ordering = self.config.ordering;
        for index in 0..self.variables.len() {
            self.run_variable(index)?;
            if ordering == FrameOrdering::Sequential {
                self.variables[index].flip();
            }
        }
        if ordering == FrameOrdering::Snapshot {
            for variable in &mut self.variables {
                variable.flip();
            }
        }

        self.device.flush();
        self.frame += 1;
        Ok(())
    }

    fn run_variable(&mut self, index: usize) -> Result<(), EngineError> {
        let variable = &self.variables[index];
        let (Some(target), Some(pipeline)) = (variable.alternate_surface(), &variable.pipeline)
        else {
            return Err(EngineError::NotInitialized);
        };

        let inputs = variable
            .dependencies
            .iter()
            .map(|d| {
                self.variables[d.index]
                    .current_surface()
                    .ok_or(EngineError::NotInitialized)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut output = self
            .pool
            .checkout(target)
            .ok_or(EngineError::UnknownSurface(target))?;
        let result = dispatch_into(
            &mut self.device,
            &self.pool,
            pipeline,
            &inputs,
            variable.pass.values(),
            &mut output,
        );
        self.pool.checkin(target, output);
        result
    }

    /// Surface holding the variable's last completed state.
    ///
    /// The engine keeps ownership and overwrites it on a later frame.
    pub fn current_surface(&self, variable: VariableHandle) -> Result<SurfaceId, EngineError> {
        self.ensure_ready()?;
        let index = self.resolve(variable)?;
        self.variables[index]
            .current_surface()
            .ok_or(EngineError::NotInitialized)
    }

    /// Surface the variable's next pass writes into.
    pub fn alternate_surface(&self, variable: VariableHandle) -> Result<SurfaceId, EngineError> {
        self.ensure_ready()?;
        let index = self.resolve(variable)?;
        self.variables[index]
            .alternate_surface()
            .ok_or(EngineError::NotInitialized)
    }

    /// Read a surface back to the host.
    pub fn read_surface(&mut self, surface: SurfaceId) -> Result<Vec<CellValue>, EngineError> {
        let data = self
            .pool
            .get(surface)
            .ok_or(EngineError::UnknownSurface(surface))?;
        Ok(self.device.read(data)?)
    }

    /// Read a variable's current state back to the host.
    pub fn read_current(&mut self, variable: VariableHandle) -> Result<Vec<CellValue>, EngineError> {
        let surface = self.current_surface(variable)?;
        self.read_surface(surface)
    }

    /// Overwrite a surface with host data through the copy pass.
    pub fn render_texture(
        &mut self,
        input: &InitialState,
        target: SurfaceId,
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        if input.size != self.size() || !input.is_consistent() {
            return Err(EngineError::GridMismatch {
                name: format!("{:?}", target),
                expected: self.size(),
                found: input.size,
            });
        }

        let source = self.device.upload(input)?;
        let mut output = self
            .pool
            .checkout(target)
            .ok_or(EngineError::UnknownSurface(target))?;
        self.device.copy_pass(&source, &mut output);
        self.pool.checkin(target, output);
        self.device.flush();
        self.device.release(source);
        Ok(())
    }

    /// Run a one-off pass outside the frame schedule.
    ///
    /// `inputs` binds surfaces to input names. The target may not also be an
    /// input. The pass is compiled for this call only.
    pub fn run_pass(
        &mut self,
        pass: &ComputePass<D::Program>,
        inputs: &[(&str, SurfaceId)],
        target: SurfaceId,
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        pass.validate()?;

        let mut names = Vec::with_capacity(inputs.len());
        for &(name, surface) in inputs {
            validate_input_name(name).map_err(EngineError::InvalidName)?;
            if pass.declares(name) || names.contains(&name.to_string()) {
                return Err(EngineError::InputNameConflict {
                    variable: pass.label().to_string(),
                    input: name.to_string(),
                });
            }
            if surface == target {
                return Err(EngineError::Aliasing(target));
            }
            names.push(name.to_string());
        }
        if inputs.len() as u32 > self.device.capabilities().max_surface_inputs {
            return Err(EngineError::UnsupportedDevice(format!(
                "pass '{}' reads {} surfaces",
                pass.label(),
                inputs.len()
            )));
        }

        let layout = pass.layout(self.size(), names);
        let pipeline = self
            .device
            .compile(pass.label(), pass.program(), &layout)?;
        let surfaces: Vec<SurfaceId> = inputs.iter().map(|&(_, id)| id).collect();

        let mut output = self
            .pool
            .checkout(target)
            .ok_or(EngineError::UnknownSurface(target))?;
        let result = dispatch_into(
            &mut self.device,
            &self.pool,
            &pipeline,
            &surfaces,
            pass.values(),
            &mut output,
        );
        self.pool.checkin(target, output);
        self.device.flush();
        result
    }

    fn resolve(&self, handle: VariableHandle) -> Result<usize, EngineError> {
        if handle.engine != self.id || handle.index >= self.variables.len() {
            return Err(EngineError::UnknownVariable(handle));
        }
        Ok(handle.index)
    }

    fn ensure_registering(&self, action: &'static str) -> Result<(), EngineError> {
        match self.state {
            EngineState::Registering => Ok(()),
            EngineState::Ready => Err(EngineError::LateBinding(action)),
            EngineState::Failed => Err(EngineError::Unusable),
        }
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Ready => Ok(()),
            EngineState::Registering => Err(EngineError::NotInitialized),
            EngineState::Failed => Err(EngineError::Unusable),
        }
    }
}

/// Bind input surfaces and run a pipeline into a checked-out output.
///
/// The output is out of the pool while this runs, so an input naming it
/// fails the lookup instead of aliasing.
fn dispatch_into<D: ComputeDevice>(
    device: &mut D,
    pool: &SurfacePool<D::Surface>,
    pipeline: &D::Pipeline,
    inputs: &[SurfaceId],
    uniforms: &[UniformValue],
    output: &mut D::Surface,
) -> Result<(), EngineError> {
    let surfaces = inputs
        .iter()
        .map(|&id| pool.get(id).ok_or(EngineError::Aliasing(id)))
        .collect::<Result<Vec<_>, _>>()?;
    device.dispatch(pipeline, &PassBindings { surfaces, uniforms }, output);
    Ok(())
}

/// Engine errors.
///
/// Setup problems are reported here and never panic, so a caller can fall
/// back to a static state. Frames have no data-level error channel.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("Variable '{0}' is already registered")]
    DuplicateName(String),

    #[error("Invalid variable name: {0}")]
    InvalidName(NameError),

    #[error("Engine is initialized; {0} is no longer allowed")]
    LateBinding(&'static str),

    #[error("Initial state for '{name}' is {found:?}, engine grid is {expected:?}")]
    GridMismatch {
        name: String,
        expected: GridSize,
        found: GridSize,
    },

    #[error("Variable handle {0:?} does not belong to this engine")]
    UnknownVariable(VariableHandle),

    #[error("Input '{input}' of '{variable}' clashes with another input of the same name")]
    InputNameConflict { variable: String, input: String },

    #[error("Dependency cycle between variables: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine is already initialized")]
    AlreadyInitialized,

    #[error("Engine failed to initialize and can no longer be used")]
    Unusable,

    #[error("Surface {0:?} is both read and written by one pass")]
    Aliasing(SurfaceId),

    #[error("Unknown surface {0:?}")]
    UnknownSurface(SurfaceId),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
