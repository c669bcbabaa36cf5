//! `wgpu` compute backend.
//!
//! One invocation classifies one candidate. The active batch is uploaded
//! sorted so the shader can binary-search it, and changed cells append their
//! in-range 3x3 neighborhood to a hint buffer through an atomic counter. A
//! counter past the buffer capacity means the hints overflowed; the
//! classifications are still valid.
//!
//! Device buffers are cached across dispatches and grown to the next power of
//! two, so steady-state stepping allocates nothing on the device.

use std::borrow::Cow;
use std::sync::mpsc;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};

use super::buffers::{CellState, Classification, NeighborHints, RawCoord};
use super::timing::StageTimings;
use crate::error::{AccelError, AccelResult};

const WORKGROUP_SIZE: u32 = 64;
/// Smallest cached buffer, in elements.
const MIN_BUFFER_ELEMS: usize = 64;
/// Storage buffers bound by the classify pipeline.
const STORAGE_BINDINGS: u32 = 5;

const CLASSIFY_SHADER: &str = r#"
struct Coord {
    x: i32,
    y: i32,
}

struct CellState {
    x: i32,
    y: i32,
    was_alive: u32,
    will_be_alive: u32,
}

struct Params {
    active_len: u32,
    candidate_len: u32,
    hint_capacity: u32,
    row_stride: u32,
}

@group(0) @binding(0) var<storage, read> active: array<Coord>;
@group(0) @binding(1) var<storage, read> candidates: array<Coord>;
@group(0) @binding(2) var<storage, read_write> states: array<CellState>;
@group(0) @binding(3) var<storage, read_write> hints: array<Coord>;
@group(0) @binding(4) var<storage, read_write> hint_count: atomic<u32>;
@group(0) @binding(5) var<uniform> params: Params;

fn precedes(a: Coord, b: Coord) -> bool {
    return a.x < b.x || (a.x == b.x && a.y < b.y);
}

fn is_active(c: Coord) -> bool {
    var lo: u32 = 0u;
    var hi: u32 = params.active_len;
    while (lo < hi) {
        let mid = lo + (hi - lo) / 2u;
        let probe = active[mid];
        if (probe.x == c.x && probe.y == c.y) {
            return true;
        }
        if (precedes(probe, c)) {
            lo = mid + 1u;
        } else {
            hi = mid;
        }
    }
    return false;
}

const I32_MAX: i32 = 2147483647i;
const I32_MIN: i32 = -2147483647i - 1i;

// False when v + d leaves the i32 range.
fn in_range(v: i32, d: i32) -> bool {
    if (d > 0) {
        return v < I32_MAX;
    }
    if (d < 0) {
        return v > I32_MIN;
    }
    return true;
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let index = gid.x + gid.y * params.row_stride;
    if (index >= params.candidate_len) {
        return;
    }

    let cell = candidates[index];
    var neighbors: u32 = 0u;
    var reachable: u32 = 1u;
    for (var dy: i32 = -1; dy <= 1; dy = dy + 1) {
        for (var dx: i32 = -1; dx <= 1; dx = dx + 1) {
            if ((dx == 0 && dy == 0) || !in_range(cell.x, dx) || !in_range(cell.y, dy)) {
                continue;
            }
            reachable = reachable + 1u;
            if (is_active(Coord(cell.x + dx, cell.y + dy))) {
                neighbors = neighbors + 1u;
            }
        }
    }

    let alive = is_active(cell);
    let will_live = neighbors == 3u || (alive && neighbors == 2u);
    states[index] = CellState(cell.x, cell.y, select(0u, 1u, alive), select(0u, 1u, will_live));

    if (alive != will_live) {
        let base = atomicAdd(&hint_count, reachable);
        if (base + reachable <= params.hint_capacity) {
            var slot: u32 = base;
            for (var dy: i32 = -1; dy <= 1; dy = dy + 1) {
                for (var dx: i32 = -1; dx <= 1; dx = dx + 1) {
                    if (in_range(cell.x, dx) && in_range(cell.y, dy)) {
                        hints[slot] = Coord(cell.x + dx, cell.y + dy);
                        slot = slot + 1u;
                    }
                }
            }
        }
    }
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Params {
    active_len: u32,
    candidate_len: u32,
    hint_capacity: u32,
    row_stride: u32,
}

/// Device buffers sized for one batch shape.
struct BatchBuffers {
    active_capacity: usize,
    candidate_capacity: usize,
    hint_capacity: usize,
    active: wgpu::Buffer,
    candidates: wgpu::Buffer,
    states: wgpu::Buffer,
    hints: wgpu::Buffer,
    hint_count: wgpu::Buffer,
    params: wgpu::Buffer,
    states_staging: wgpu::Buffer,
    hints_staging: wgpu::Buffer,
    count_staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl BatchBuffers {
    fn fits(&self, active: usize, candidates: usize, hints: usize) -> bool {
        active <= self.active_capacity
            && candidates <= self.candidate_capacity
            && hints <= self.hint_capacity
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    limits: wgpu::Limits,
    adapter_name: String,
    buffers: Option<BatchBuffers>,
}

impl GpuBackend {
    /// Probe for an adapter and build the classify pipeline.
    pub fn new() -> AccelResult<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> AccelResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| AccelError::unavailable("no compatible GPU adapter found"))?;

        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(AccelError::unavailable(format!(
                "adapter {} does not support compute shaders",
                info.name
            )));
        }
        let limits = adapter.limits();
        if limits.max_storage_buffers_per_shader_stage < STORAGE_BINDINGS {
            return Err(AccelError::unavailable(format!(
                "adapter {} allows {} storage buffers per stage, {} needed",
                info.name, limits.max_storage_buffers_per_shader_stage, STORAGE_BINDINGS
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sparse-life"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                },
                None,
            )
            .await
            .map_err(|e| AccelError::unavailable(format!("failed to create device: {e}")))?;

        // Errors outside an error scope must not take the process down.
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!("uncaptured GPU error: {err}");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("classify"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(CLASSIFY_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("classify layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("classify pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("classify pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
            compilation_options: Default::default(),
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(AccelError::unavailable(format!(
                "classify pipeline rejected by {}: {err}",
                info.name
            )));
        }

        tracing::info!(
            "GPU adapter: {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            limits,
            adapter_name: info.name,
            buffers: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Drop cached device buffers. They are recreated on the next dispatch.
    pub fn reset_caches(&mut self) {
        self.buffers = None;
    }

    /// Classify `candidates` against the sorted active batch on the device.
    pub fn classify(
        &mut self,
        sorted_active: &[RawCoord],
        candidates: &[RawCoord],
        hint_capacity: usize,
        timings: &mut StageTimings,
    ) -> AccelResult<Classification> {
        if candidates.is_empty() {
            return Ok(Classification::empty());
        }

        let prepare_start = Instant::now();
        let candidate_len = to_u32(candidates.len(), "candidate count")?;
        let active_len = to_u32(sorted_active.len(), "active count")?;
        let shader_hint_capacity = to_u32(hint_capacity, "hint capacity")?;

        let groups = candidate_len.div_ceil(WORKGROUP_SIZE);
        let max_groups = self.limits.max_compute_workgroups_per_dimension.max(1);
        let groups_x = groups.min(max_groups);
        let groups_y = groups.div_ceil(groups_x);
        if groups_y > max_groups {
            return Err(AccelError::dispatch(format!(
                "{candidate_len} candidates exceed the device dispatch limit"
            )));
        }

        // Batch buffers grow in powers of two; the hint buffer is sized to the
        // configured capacity.
        let want_active = grown(sorted_active.len());
        let want_candidates = grown(candidates.len());
        let want_hints = hint_capacity.max(1);
        self.check_binding_size(want_active, std::mem::size_of::<RawCoord>(), "active")?;
        self.check_binding_size(want_candidates, std::mem::size_of::<CellState>(), "states")?;
        self.check_binding_size(want_hints, std::mem::size_of::<RawCoord>(), "hints")?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let reuse = self
            .buffers
            .as_ref()
            .is_some_and(|b| b.fits(sorted_active.len(), candidates.len(), want_hints));
        if !reuse {
            tracing::debug!(
                "allocating GPU buffers: {want_active} active, {want_candidates} candidates, {want_hints} hints"
            );
            self.buffers = Some(self.create_buffers(want_active, want_candidates, want_hints));
        }
        timings.prepare = prepare_start.elapsed();

        let Some(buffers) = self.buffers.as_ref() else {
            return self.fail_scopes("buffer cache missing after allocation");
        };

        let upload_start = Instant::now();
        if !sorted_active.is_empty() {
            self.queue
                .write_buffer(&buffers.active, 0, bytemuck::cast_slice(sorted_active));
        }
        self.queue
            .write_buffer(&buffers.candidates, 0, bytemuck::cast_slice(candidates));
        self.queue.write_buffer(&buffers.hint_count, 0, bytemuck::bytes_of(&0u32));
        let params = Params {
            active_len,
            candidate_len,
            hint_capacity: shader_hint_capacity,
            row_stride: groups_x * WORKGROUP_SIZE,
        };
        self.queue
            .write_buffer(&buffers.params, 0, bytemuck::bytes_of(&params));
        timings.upload = upload_start.elapsed();

        let dispatch_start = Instant::now();
        let states_bytes = (candidates.len() * std::mem::size_of::<CellState>()) as u64;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("classify encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("classify pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.states, 0, &buffers.states_staging, 0, states_bytes);
        encoder.copy_buffer_to_buffer(&buffers.hint_count, 0, &buffers.count_staging, 0, 4);
        self.queue.submit(Some(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            // Buffers may be in an unknown state after a rejected submission.
            self.buffers = None;
            return Err(AccelError::dispatch(format!("device rejected dispatch: {err}")));
        }
        timings.dispatch = dispatch_start.elapsed();

        let download_start = Instant::now();
        let required = read_buffer::<u32>(&self.device, &buffers.count_staging, 1)?
            .first()
            .copied()
            .unwrap_or(0) as usize;
        let states = read_buffer::<CellState>(&self.device, &buffers.states_staging, candidates.len())?;

        let hints = if required > hint_capacity {
            NeighborHints::Overflowed {
                required,
                capacity: hint_capacity,
            }
        } else if required == 0 {
            NeighborHints::Complete(Vec::new())
        } else {
            let hint_bytes = (required * std::mem::size_of::<RawCoord>()) as u64;
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("hint readback encoder"),
                });
            encoder.copy_buffer_to_buffer(&buffers.hints, 0, &buffers.hints_staging, 0, hint_bytes);
            self.queue.submit(Some(encoder.finish()));
            NeighborHints::Complete(read_buffer::<RawCoord>(&self.device, &buffers.hints_staging, required)?)
        };
        timings.download = download_start.elapsed();

        Ok(Classification { states, hints })
    }

    fn check_binding_size(&self, elems: usize, elem_size: usize, what: &str) -> AccelResult<()> {
        let bytes = (elems as u64).saturating_mul(elem_size as u64);
        let limit = (self.limits.max_storage_buffer_binding_size as u64).min(self.limits.max_buffer_size);
        if bytes > limit {
            return Err(AccelError::dispatch(format!(
                "{what} buffer needs {bytes} bytes, device limit is {limit}"
            )));
        }
        Ok(())
    }

    fn fail_scopes(&self, msg: &str) -> AccelResult<Classification> {
        let _ = pollster::block_on(self.device.pop_error_scope());
        let _ = pollster::block_on(self.device.pop_error_scope());
        Err(AccelError::dispatch(msg))
    }

    fn create_buffers(&self, active: usize, candidates: usize, hints: usize) -> BatchBuffers {
        let coord_size = std::mem::size_of::<RawCoord>() as u64;
        let state_size = std::mem::size_of::<CellState>() as u64;
        let storage_in = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let storage_out = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let staging = wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;

        let active_buf = self.buffer("active", active as u64 * coord_size, storage_in);
        let candidates_buf = self.buffer("candidates", candidates as u64 * coord_size, storage_in);
        let states = self.buffer("states", candidates as u64 * state_size, storage_out);
        let hints_buf = self.buffer("hints", hints as u64 * coord_size, storage_out);
        let hint_count = self.buffer("hint count", 4, storage_in | wgpu::BufferUsages::COPY_SRC);
        let params = self.buffer(
            "params",
            std::mem::size_of::<Params>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let states_staging = self.buffer("states staging", candidates as u64 * state_size, staging);
        let hints_staging = self.buffer("hints staging", hints as u64 * coord_size, staging);
        let count_staging = self.buffer("count staging", 4, staging);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("classify bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: active_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: candidates_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: states.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: hints_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: hint_count.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: params.as_entire_binding() },
            ],
        });

        BatchBuffers {
            active_capacity: active,
            candidate_capacity: candidates,
            hint_capacity: hints,
            active: active_buf,
            candidates: candidates_buf,
            states,
            hints: hints_buf,
            hint_count,
            params,
            states_staging,
            hints_staging,
            count_staging,
            bind_group,
        }
    }

    fn buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(4),
            usage,
            mapped_at_creation: false,
        })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[inline]
fn grown(len: usize) -> usize {
    len.max(MIN_BUFFER_ELEMS).next_power_of_two()
}

fn to_u32(n: usize, what: &str) -> AccelResult<u32> {
    u32::try_from(n).map_err(|_| AccelError::dispatch(format!("{what} {n} does not fit the shader's u32 indices")))
}

/// Map the first `count` elements of a staging buffer and copy them out.
fn read_buffer<T: Pod>(device: &wgpu::Device, buffer: &wgpu::Buffer, count: usize) -> AccelResult<Vec<T>> {
    let size = (count * std::mem::size_of::<T>()) as u64;
    let slice = buffer.slice(..size);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| AccelError::dispatch(format!("readback channel closed: {e}")))?
        .map_err(|e| AccelError::dispatch(format!("failed to map readback buffer: {e}")))?;

    let out = {
        let data = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, T>(&data).to_vec()
    };
    buffer.unmap();
    Ok(out)
}
