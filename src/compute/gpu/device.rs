//! GPU device - WGSL passes over `Rgba32Float` storage textures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::GpuError;
use super::wgsl;
use crate::compute::{ComputeDevice, DeviceCapabilities, DeviceError, PassBindings, PassLayout};
use crate::schema::{CellValue, GridSize, InitialState};

// Embed shader sources at compile time
const COPY_SHADER: &str = include_str!("shaders/copy.wgsl");

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Bytes per cell: four f32 components.
const CELL_BYTES: u32 = 16;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// A surface in device memory.
pub struct GpuSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: GridSize,
}

impl GpuSurface {
    #[inline]
    pub fn size(&self) -> GridSize {
        self.size
    }

    #[inline]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View for binding the surface in a caller's render pipeline.
    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// WGSL source defining `fn compute_cell(cell: vec2<i32>) -> vec4<f32>`.
///
/// The generated preamble provides `params.resolution`, one `params.<name>`
/// field per uniform, and `load_<input>(p)` / `sample_<input>(uv)` for every
/// surface input.
#[derive(Debug, Clone)]
pub struct WgslProgram {
    source: String,
}

impl WgslProgram {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A compiled pass.
pub struct GpuPipeline {
    id: u64,
    label: String,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    resolution: GridSize,
    inputs: usize,
}

impl GpuPipeline {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

struct CopyPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// GPU device using WebGPU compute shaders.
///
/// Passes are recorded into one command encoder and submitted on
/// [`flush`](ComputeDevice::flush), so a frame is a single submission.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,

    // Created on first use: building it on a device without float storage
    // textures would be a validation error.
    copy: Option<CopyPipeline>,

    encoder: Option<wgpu::CommandEncoder>,
    // Pipelines whose parameter buffer is referenced by the pending encoder.
    pending: Vec<u64>,
}

impl GpuDevice {
    /// Create a GPU device on the default high-performance adapter.
    pub async fn new() -> Result<Self, GpuError> {
        // 1. Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // 2. Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        // 3. Request device and queue
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Ping-pong Compute GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        // 4. Probe what the engine's init step checks
        let format_features = adapter.get_texture_format_features(SURFACE_FORMAT);
        let limits = device.limits();
        let capabilities = DeviceCapabilities {
            float_surfaces: format_features.allowed_usages.contains(
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            ) && limits.max_storage_textures_per_shader_stage > 0,
            max_surface_inputs: limits.max_sampled_textures_per_shader_stage,
            max_dimension: limits.max_texture_dimension_2d,
        };

        // Errors outside a scope are logged; the default handler panics.
        device.on_uncaptured_error(Arc::new(|error| {
            log::error!("GPU uncaptured error: {}", error);
        }));
        log::info!(
            "GPU device '{}' ({:?}): {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            capabilities
        );

        Ok(Self {
            device,
            queue,
            capabilities,
            copy: None,
            encoder: None,
            pending: Vec::new(),
        })
    }

    /// Underlying wgpu device, for callers rendering from engine surfaces.
    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Run device calls inside a validation error scope.
    ///
    /// On wasm32 the scope cannot be awaited from a sync call, so errors go
    /// to the uncaptured handler instead.
    fn capture<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, wgpu::Error> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let value = f(&self.device);
            match pollster::block_on(scope.pop()) {
                Some(error) => Err(error),
                None => Ok(value),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            Ok(f(&self.device))
        }
    }

    fn create_texture(&self, label: &str, size: GridSize) -> Result<GpuSurface, DeviceError> {
        self.capture(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent(size),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SURFACE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            GpuSurface {
                texture,
                view,
                size,
            }
        })
        .map_err(|e| DeviceError::Allocation(e.to_string()))
    }

    fn copy_pipeline(&mut self) -> &CopyPipeline {
        let device = &self.device;
        self.copy.get_or_insert_with(|| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Copy Shader"),
                source: wgpu::ShaderSource::Wgsl(COPY_SHADER.into()),
            });
            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Copy Bind Group Layout"),
                entries: &[input_entry(0), output_entry(1)],
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Copy Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                ..Default::default()
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Copy Pipeline"),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });
            CopyPipeline {
                pipeline,
                bind_group_layout,
            }
        })
    }

    fn record(
        &mut self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        size: GridSize,
    ) {
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        });

        let (workgroups_x, workgroups_y) = wgsl::workgroups(size);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
    }

    fn copy_to_staging(&mut self, surface: &GpuSurface) -> (wgpu::Buffer, u32) {
        self.flush();

        let size = surface.size;
        let bytes_per_row = (size.width * CELL_BYTES).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: bytes_per_row as u64 * size.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            surface.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            extent(size),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        (staging, bytes_per_row)
    }

    /// Async readback - properly awaits buffer mapping.
    #[cfg(target_arch = "wasm32")]
    pub async fn read_async(&mut self, surface: &GpuSurface) -> Result<Vec<CellValue>, DeviceError> {
        let (staging, bytes_per_row) = self.copy_to_staging(surface);
        let buffer_slice = staging.slice(..);

        // Create a future that resolves when mapping is complete
        let (sender, receiver) = futures_channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        receiver
            .await
            .map_err(|_| GpuError::MapCallbackDropped)?
            .map_err(GpuError::from)?;

        Ok(unpad_rows(&staging, bytes_per_row, surface.size))
    }
}

impl ComputeDevice for GpuDevice {
    type Surface = GpuSurface;
    type Program = WgslProgram;
    type Pipeline = GpuPipeline;

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn allocate(&mut self, size: GridSize) -> Result<GpuSurface, DeviceError> {
        // WebGPU zero-initialises textures before first use.
        self.create_texture("Surface", size)
    }

    fn upload(&mut self, state: &InitialState) -> Result<GpuSurface, DeviceError> {
        if !state.is_consistent() {
            return Err(DeviceError::SizeMismatch {
                expected: state.size.cells(),
                found: state.cells.len(),
            });
        }
        let surface = self.create_texture("Upload Surface", state.size)?;
        let queue = &self.queue;
        self.capture(|_| {
            queue.write_texture(
                surface.texture.as_image_copy(),
                bytemuck::cast_slice(&state.cells),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(state.size.width * CELL_BYTES),
                    rows_per_image: Some(state.size.height),
                },
                extent(state.size),
            )
        })
        .map_err(|e| DeviceError::Allocation(e.to_string()))?;
        Ok(surface)
    }

    fn copy_pass(&mut self, input: &GpuSurface, output: &mut GpuSurface) {
        let (pipeline, bind_group_layout) = {
            let copy = self.copy_pipeline();
            (copy.pipeline.clone(), copy.bind_group_layout.clone())
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Copy Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
            ],
        });
        self.record("Copy Pass", &pipeline, &bind_group, output.size);
    }

    fn compile(
        &mut self,
        label: &str,
        program: &WgslProgram,
        layout: &PassLayout,
    ) -> Result<GpuPipeline, DeviceError> {
        if !wgsl::defines_cell_function(&program.source) {
            return Err(DeviceError::Compile {
                label: label.to_string(),
                message: format!("program does not define fn {}", wgsl::CELL_FUNCTION),
            });
        }

        let source = wgsl::assemble(layout, &program.source);

        let mut entries = Vec::with_capacity(layout.surfaces.len() + 2);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
        for i in 0..layout.surfaces.len() {
            entries.push(input_entry(i as u32 + 1));
        }
        entries.push(output_entry(wgsl::output_binding(layout)));

        // Shader errors in caller code come back as validation errors.
        let (pipeline, bind_group_layout) = self
            .capture(|device| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(label),
                        entries: &entries,
                    });
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(label),
                        bind_group_layouts: &[&bind_group_layout],
                        ..Default::default()
                    });
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                });
                (pipeline, bind_group_layout)
            })
            .map_err(|e| DeviceError::Compile {
                label: label.to_string(),
                message: e.to_string(),
            })?;

        let params_size = (4 * (layout.uniforms.len() + 1) * std::mem::size_of::<f32>()) as u64;
        let params_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Params"),
            size: params_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!(
            "Compiled pass '{}' with inputs {:?}",
            label,
            layout.surfaces
        );

        Ok(GpuPipeline {
            id: NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.to_string(),
            pipeline,
            bind_group_layout,
            params_buffer,
            resolution: layout.resolution,
            inputs: layout.surfaces.len(),
        })
    }

    fn dispatch(
        &mut self,
        pipeline: &GpuPipeline,
        bindings: &PassBindings<'_, GpuSurface>,
        output: &mut GpuSurface,
    ) {
        // Parameter writes land before the next submission, so a pipeline
        // already recorded in the pending encoder must be submitted first.
        if self.pending.contains(&pipeline.id) {
            self.flush();
        }
        let params = wgsl::params_data(pipeline.resolution, bindings.uniforms);
        self.queue
            .write_buffer(&pipeline.params_buffer, 0, bytemuck::cast_slice(&params));

        let mut entries = Vec::with_capacity(pipeline.inputs + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: pipeline.params_buffer.as_entire_binding(),
        });
        for (i, surface) in bindings.surfaces.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::TextureView(&surface.view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: bindings.surfaces.len() as u32 + 1,
            resource: wgpu::BindingResource::TextureView(&output.view),
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&pipeline.label),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });
        self.record(&pipeline.label, &pipeline.pipeline, &bind_group, output.size);
        self.pending.push(pipeline.id);
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.pending.clear();
    }

    /// Synchronous readback for native targets.
    #[cfg(not(target_arch = "wasm32"))]
    fn read(&mut self, surface: &GpuSurface) -> Result<Vec<CellValue>, DeviceError> {
        let (staging, bytes_per_row) = self.copy_to_staging(surface);
        let buffer_slice = staging.slice(..);

        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::PollType::wait_indefinitely()).ok();
        rx.recv()
            .map_err(|_| GpuError::MapCallbackDropped)?
            .map_err(GpuError::from)?;

        Ok(unpad_rows(&staging, bytes_per_row, surface.size))
    }

    /// On WASM, we cannot block for buffer mapping in a sync function.
    #[cfg(target_arch = "wasm32")]
    fn read(&mut self, _surface: &GpuSurface) -> Result<Vec<CellValue>, DeviceError> {
        Err(GpuError::SyncReadback.into())
    }
}

/// Copy mapped rows into a tightly packed cell vector and unmap.
fn unpad_rows(staging: &wgpu::Buffer, bytes_per_row: u32, size: GridSize) -> Vec<CellValue> {
    let row_bytes = (size.width * CELL_BYTES) as usize;
    let mut cells = Vec::with_capacity(size.cells());
    {
        let data = staging.slice(..).get_mapped_range();
        for row in data.chunks(bytes_per_row as usize).take(size.height as usize) {
            let row: &[f32] = bytemuck::cast_slice(&row[..row_bytes]);
            cells.extend(row.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]));
        }
    }
    staging.unmap();
    cells
}

fn extent(size: GridSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

fn input_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn output_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: SURFACE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputePass, CpuDevice, CpuProgram, Engine, EngineError};
    use crate::schema::{Pattern, Seed, UniformDecl, UniformValue};

    const INCREMENT: &str = "
fn compute_cell(cell: vec2<i32>) -> vec4<f32> {
    return load_h(cell) + vec4<f32>(params.step);
}
";

    const COPY_A: &str = "
fn compute_cell(cell: vec2<i32>) -> vec4<f32> {
    return load_a(cell);
}
";

    fn gpu() -> Option<GpuDevice> {
        match pollster::block_on(GpuDevice::new()) {
            Ok(device) => Some(device),
            Err(GpuError::NoAdapter) => {
                eprintln!("Skipping GPU test: no adapter available");
                None
            }
            Err(e) => panic!("Failed to create GPU device: {:?}", e),
        }
    }

    #[test]
    fn test_gpu_device_creation() {
        let Some(device) = gpu() else { return };
        assert!(device.capabilities().max_surface_inputs > 0);
    }

    #[test]
    fn test_gpu_upload_and_read_back() {
        let Some(mut device) = gpu() else { return };
        let state = InitialState::from_fn(GridSize::new(5, 3), |x, y| {
            [x as f32, y as f32, 0.25, -1.0]
        });
        let surface = device.upload(&state).unwrap();
        assert_eq!(device.read(&surface).unwrap(), state.cells);
    }

    #[test]
    fn test_gpu_missing_cell_function() {
        let Some(mut device) = gpu() else { return };
        let layout = PassLayout::new(GridSize::new(2, 2));
        let result = device.compile("bad", &WgslProgram::new("fn other() {}"), &layout);
        assert!(matches!(result, Err(DeviceError::Compile { .. })));
    }

    #[test]
    fn test_gpu_shader_error_is_returned() {
        let Some(device) = gpu() else { return };
        let mut engine = Engine::new(4, 4, device).unwrap();
        let body = "
fn compute_cell(cell: vec2<i32>) -> vec4<f32> {
    return load_h(cell) + undefined_name;
}
";
        let h = engine
            .add_variable(
                "h",
                ComputePass::new("typo", WgslProgram::new(body)),
                InitialState::zeros(engine.size()),
            )
            .unwrap();
        engine.set_dependencies(h, &[h]).unwrap();

        let result = engine.init();
        assert!(
            matches!(result, Err(EngineError::Device(DeviceError::Compile { ref label, .. })) if label == "typo"),
            "{:?}",
            result
        );
        assert_eq!(engine.allocated_surfaces(), 0);
    }

    #[test]
    fn test_gpu_oversize_grid_is_unsupported() {
        let Some(device) = gpu() else { return };
        let width = device.capabilities().max_dimension.saturating_add(1).max(20000);
        let mut engine = Engine::new(width, 1, device).unwrap();
        let h = engine
            .add_variable(
                "h",
                ComputePass::new("increment", WgslProgram::new(INCREMENT))
                    .with_uniform(UniformDecl::scalar("step", 1.0)),
                InitialState::zeros(engine.size()),
            )
            .unwrap();
        engine.set_dependencies(h, &[h]).unwrap();

        assert!(matches!(engine.init(), Err(EngineError::UnsupportedDevice(_))));
        assert_eq!(engine.allocated_surfaces(), 0);
    }

    #[test]
    fn test_gpu_self_recurrence() {
        let Some(device) = gpu() else { return };
        let mut engine = Engine::new(2, 2, device).unwrap();
        let pass = ComputePass::new("increment", WgslProgram::new(INCREMENT))
            .with_uniform(UniformDecl::scalar("step", 1.0));
        let h = engine
            .add_variable("h", pass, InitialState::zeros(engine.size()))
            .unwrap();
        engine.set_dependencies(h, &[h]).unwrap();
        engine.init().unwrap();

        for _ in 0..5 {
            engine.compute().unwrap();
        }

        let cells = engine.read_current(h).unwrap();
        assert!(cells.iter().all(|c| c[0] == 5.0));
    }

    /// The GPU backend must schedule exactly like the CPU reference.
    #[test]
    fn test_gpu_cpu_equivalence() {
        let Some(device) = gpu() else { return };
        let size = GridSize::new(19, 7);
        let initial = Seed {
            pattern: Pattern::Noise {
                amplitude: 1.0,
                component: None,
                seed: 7,
            },
        }
        .generate(size);

        let mut gpu_engine = Engine::new(size.width, size.height, device).unwrap();
        let a = gpu_engine
            .add_variable(
                "a",
                ComputePass::new("increment", WgslProgram::new(INCREMENT.replace("load_h", "load_a")))
                    .with_uniform(UniformDecl::scalar("step", 0.5)),
                initial.clone(),
            )
            .unwrap();
        let b = gpu_engine
            .add_variable("b", ComputePass::new("copy", WgslProgram::new(COPY_A)), initial.clone())
            .unwrap();
        gpu_engine.set_dependencies(a, &[a]).unwrap();
        gpu_engine.set_dependencies(b, &[a]).unwrap();
        gpu_engine.init().unwrap();

        let mut cpu_engine = Engine::new(size.width, size.height, CpuDevice::new()).unwrap();
        let ca = cpu_engine
            .add_variable(
                "a",
                ComputePass::new(
                    "increment",
                    CpuProgram::new(|cell| {
                        let step = cell.scalar("step").unwrap_or(0.0);
                        cell.input("a").map(|s| s.current()).unwrap_or_default().map(|v| v + step)
                    }),
                )
                .with_uniform(UniformDecl::scalar("step", 0.5)),
                initial.clone(),
            )
            .unwrap();
        let cb = cpu_engine
            .add_variable(
                "b",
                ComputePass::new(
                    "copy",
                    CpuProgram::new(|cell| cell.input("a").map(|s| s.current()).unwrap_or_default()),
                ),
                initial,
            )
            .unwrap();
        cpu_engine.set_dependencies(ca, &[ca]).unwrap();
        cpu_engine.set_dependencies(cb, &[ca]).unwrap();
        cpu_engine.init().unwrap();

        for frame in 0..4 {
            if frame == 2 {
                gpu_engine.set_uniform(a, "step", UniformValue::Scalar(2.0)).unwrap();
                cpu_engine.set_uniform(ca, "step", UniformValue::Scalar(2.0)).unwrap();
            }
            gpu_engine.compute().unwrap();
            cpu_engine.compute().unwrap();

            for (gv, cv) in [(a, ca), (b, cb)] {
                let g = gpu_engine.read_current(gv).unwrap();
                let c = cpu_engine.read_current(cv).unwrap();
                let max_diff = g
                    .iter()
                    .flatten()
                    .zip(c.iter().flatten())
                    .map(|(x, y)| (x - y).abs())
                    .fold(0.0f32, f32::max);
                assert!(max_diff < 1e-5, "Frame {}: GPU/CPU mismatch {}", frame, max_diff);
            }
        }
    }
}
