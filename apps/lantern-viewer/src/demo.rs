//! The demo scene: a spinning textured cube with an orbiting satellite over a
//! ground plane, lit by an animated sun under a gradient sky dome.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::io::Cursor;
use std::path::Path;

use ash::vk;
use glam::{Mat4, Quat, Vec3, Vec4};
use tracing::{error, info, warn};

use lantern_gpu::{
    DescriptorSetLayoutBuilder, DescriptorWrite, GpuContext, GpuError, GraphicsPipeline,
    GraphicsPipelineConfig, PipelineCacheFile, Result, SurfaceContext, Swapchain,
};
use lantern_render::{
    geometry, overlay, pack_overlay, save_rgba, BindingLayouts, ConstBuffer, FrameSequencer,
    GpuMesh, GpuTexture, MeshInstance, NodeId, ObjectConstants, OverlayFrame, SceneGraph,
    ScreenshotConfig, Screenshotter, SkyConstants, TextureData, TickOutcome, TickReport,
    Transform, ViewConstants, DEPTH_FORMAT, FRAME_LATENCY,
};

/// Compiled shader binaries, resolved relative to the working directory.
const SHADER_DIR: &str = "shaders";
/// On-disk pipeline cache.
const PIPELINE_CACHE_PATH: &str = "pipeline_cache.bin";

/// Largest number of scene objects one tick can draw.
const MAX_OBJECTS: usize = 16;
/// Byte stride between per-object constants. 256 satisfies every
/// minUniformBufferOffsetAlignment Vulkan allows.
const OBJECT_STRIDE: u64 = 256;

const TEXTURE_SIZE: u32 = 256;
const CAMERA_ORBIT_SECONDS: f32 = 24.0;
const SUN_CYCLE_SECONDS: f32 = 90.0;
const FRAME_TIME_HISTORY: usize = 96;

const MESH_CUBE: usize = 0;
const MESH_PLANE: usize = 1;

/// Constants rewritten each tick for one frame slot.
struct SlotConstants {
    view: ConstBuffer,
    sky: ConstBuffer,
    objects: ConstBuffer,
}

/// Everything the demo owns: scene, GPU resources, and the sequencer.
pub struct Demo {
    layouts: BindingLayouts,
    sequencer: FrameSequencer,
    slots: Vec<SlotConstants>,
    sampler: vk::Sampler,
    texture: GpuTexture,
    meshes: Vec<GpuMesh>,
    dome: GpuMesh,
    scene: SceneGraph,
    cube_node: NodeId,
    satellite_node: NodeId,
    mesh_pipeline: GraphicsPipeline,
    sky_pipeline: GraphicsPipeline,
    overlay_pipeline: GraphicsPipeline,
    pipeline_cache: PipelineCacheFile,
    screenshotter: Option<Screenshotter>,
    screenshots: ScreenshotConfig,
    max_frames: Option<u64>,
    capture_requested: bool,
    should_exit: bool,
    time: f32,
    fps_smoothed: f32,
    frame_times: VecDeque<f32>,
}

impl Demo {
    /// Build the scene and all GPU resources. Static geometry and the
    /// texture are queued here and ride the first tick's upload batch.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        swapchain: &Swapchain,
        screenshots: ScreenshotConfig,
        max_frames: Option<u64>,
    ) -> Result<Self> {
        let device = gpu.device();

        let layouts = BindingLayouts {
            view: DescriptorSetLayoutBuilder::new()
                .uniform_buffer(
                    0,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                )
                .build(device)?,
            sky: DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT)
                .build(device)?,
            material: DescriptorSetLayoutBuilder::new()
                .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
                .build(device)?,
            object: DescriptorSetLayoutBuilder::new()
                .dynamic_uniform_buffer(
                    0,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                )
                .build(device)?,
        };

        let mut sequencer = FrameSequencer::new(gpu, swapchain, &layouts)?;
        sequencer.clear_color = [0.05, 0.06, 0.09, 1.0];

        let (slots, texture, meshes, dome) = {
            let mut allocator = gpu.allocator().lock();

            let mut slots = Vec::with_capacity(FRAME_LATENCY);
            for i in 0..FRAME_LATENCY {
                slots.push(SlotConstants {
                    view: ConstBuffer::new(
                        &mut allocator,
                        ViewConstants::SIZE as u64,
                        &format!("demo.view[{i}]"),
                    )?,
                    sky: ConstBuffer::new(
                        &mut allocator,
                        SkyConstants::SIZE as u64,
                        &format!("demo.sky[{i}]"),
                    )?,
                    objects: ConstBuffer::new(
                        &mut allocator,
                        MAX_OBJECTS as u64 * OBJECT_STRIDE,
                        &format!("demo.objects[{i}]"),
                    )?,
                });
            }

            let texture = GpuTexture::new(
                device,
                &mut allocator,
                &checker_texture(TEXTURE_SIZE),
                "demo.checker",
            )?;

            let meshes = vec![
                GpuMesh::new(&mut allocator, &geometry::cube(1.6), "demo.cube")?,
                GpuMesh::new(&mut allocator, &geometry::plane(14.0, 4), "demo.plane")?,
            ];
            let dome = GpuMesh::new(&mut allocator, &geometry::sky_dome(400.0, 12, 24), "demo.dome")?;

            (slots, texture, meshes, dome)
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = device.create_sampler(&sampler_info, None)?;

        // Slot descriptors point at fixed buffers, so one write at init is
        // enough. Only buffer contents change per tick.
        for (i, consts) in slots.iter().enumerate() {
            let bindings = sequencer.ring().slot(i).bindings;
            DescriptorWrite::UniformBuffer {
                buffer: consts.view.resident.buffer,
                offset: 0,
                range: ViewConstants::SIZE as u64,
            }
            .apply(device, bindings.view, 0);
            DescriptorWrite::UniformBuffer {
                buffer: consts.sky.resident.buffer,
                offset: 0,
                range: SkyConstants::SIZE as u64,
            }
            .apply(device, bindings.sky, 0);
            DescriptorWrite::DynamicUniformBuffer {
                buffer: consts.objects.resident.buffer,
                offset: 0,
                range: ObjectConstants::SIZE as u64,
            }
            .apply(device, bindings.object, 0);
            DescriptorWrite::CombinedImageSampler {
                view: texture.view,
                sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }
            .apply(device, bindings.material, 0);
        }

        sequencer.uploads().enqueue_texture(&texture)?;
        for mesh in &meshes {
            sequencer.uploads().enqueue_mesh(mesh)?;
        }
        sequencer.uploads().enqueue_mesh(&dome)?;

        let mut scene = SceneGraph::new();
        scene.add_mesh_node(
            None,
            Transform::IDENTITY,
            MESH_PLANE,
            Vec4::new(0.52, 0.56, 0.6, 1.0),
        );
        let cube_node = scene.add_mesh_node(
            None,
            Transform::from_translation(Vec3::new(0.0, 1.2, 0.0)),
            MESH_CUBE,
            Vec4::new(1.0, 0.82, 0.55, 1.0),
        );
        let satellite_node = scene.add_mesh_node(
            Some(cube_node),
            Transform {
                translation: Vec3::new(2.6, 0.5, 0.0),
                scale: Vec3::splat(0.35),
                ..Transform::IDENTITY
            },
            MESH_CUBE,
            Vec4::new(0.55, 0.75, 1.0, 1.0),
        );

        let pipeline_cache = PipelineCacheFile::load(device, PIPELINE_CACHE_PATH)?;

        let shader_dir = Path::new(SHADER_DIR);
        let mesh_config = GraphicsPipelineConfig {
            vertex_shader: load_shader(&shader_dir.join("mesh.vert.spv"))?,
            fragment_shader: load_shader(&shader_dir.join("mesh.frag.spv"))?,
            vertex_bindings: vec![
                vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: 12,
                    input_rate: vk::VertexInputRate::VERTEX,
                },
                vk::VertexInputBindingDescription {
                    binding: 1,
                    stride: 12,
                    input_rate: vk::VertexInputRate::VERTEX,
                },
                vk::VertexInputBindingDescription {
                    binding: 2,
                    stride: 8,
                    input_rate: vk::VertexInputRate::VERTEX,
                },
            ],
            vertex_attributes: vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: 0,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 1,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: 0,
                },
                vk::VertexInputAttributeDescription {
                    location: 2,
                    binding: 2,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: 0,
                },
            ],
            color_formats: vec![swapchain.format],
            depth_format: Some(DEPTH_FORMAT),
            ..Default::default()
        };
        let mesh_pipeline = GraphicsPipeline::new(
            device,
            pipeline_cache.handle(),
            &mesh_config,
            &[layouts.view, layouts.sky, layouts.material, layouts.object],
            &[],
        )?;

        let sky_config = GraphicsPipelineConfig {
            vertex_shader: load_shader(&shader_dir.join("sky.vert.spv"))?,
            fragment_shader: load_shader(&shader_dir.join("sky.frag.spv"))?,
            vertex_bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 12,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vertex_attributes: vec![vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            }],
            depth_write: false,
            cull_mode: vk::CullModeFlags::NONE,
            color_formats: vec![swapchain.format],
            depth_format: Some(DEPTH_FORMAT),
            ..Default::default()
        };
        let sky_pipeline = GraphicsPipeline::new(
            device,
            pipeline_cache.handle(),
            &sky_config,
            &[layouts.view, layouts.sky],
            &[],
        )?;

        let overlay_config = GraphicsPipelineConfig {
            vertex_shader: load_shader(&shader_dir.join("overlay.vert.spv"))?,
            fragment_shader: load_shader(&shader_dir.join("overlay.frag.spv"))?,
            vertex_bindings: vec![overlay::vertex_binding()],
            vertex_attributes: overlay::vertex_attributes().to_vec(),
            depth_test: false,
            depth_write: false,
            alpha_blend: true,
            cull_mode: vk::CullModeFlags::NONE,
            color_formats: vec![swapchain.format],
            depth_format: Some(DEPTH_FORMAT),
            ..Default::default()
        };
        let screen_size_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(8);
        let overlay_pipeline = GraphicsPipeline::new(
            device,
            pipeline_cache.handle(),
            &overlay_config,
            &[],
            &[screen_size_range],
        )?;

        info!(
            "Demo scene ready: {} scene meshes, {}x{} texture with {} mips",
            meshes.len(),
            texture.width,
            texture.height,
            texture.mip_levels
        );

        Ok(Self {
            layouts,
            sequencer,
            slots,
            sampler,
            texture,
            meshes,
            dome,
            scene,
            cube_node,
            satellite_node,
            mesh_pipeline,
            sky_pipeline,
            overlay_pipeline,
            pipeline_cache,
            screenshotter: None,
            screenshots,
            max_frames,
            capture_requested: false,
            should_exit: false,
            time: 0.0,
            fps_smoothed: 0.0,
            frame_times: VecDeque::with_capacity(FRAME_TIME_HISTORY),
        })
    }

    /// Capture a screenshot after the current frame.
    pub fn request_screenshot(&mut self) {
        self.capture_requested = true;
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn frame_count(&self) -> u64 {
        self.sequencer.frame_count()
    }

    /// Animate, run one tick, and handle post-tick captures and exits.
    ///
    /// # Safety
    /// All handles must be valid; must run on the thread driving the
    /// sequencer.
    pub unsafe fn render_frame(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
        swapchain: &Swapchain,
        dt: f32,
    ) -> Result<()> {
        self.time += dt;
        let frame_number = self.sequencer.frame_count();

        self.scene.node_mut(self.cube_node).transform.rotation =
            Quat::from_rotation_y(self.time * 0.8);
        self.scene.node_mut(self.satellite_node).transform.rotation =
            Quat::from_rotation_y(-self.time * 2.3);
        self.scene.update_world_transforms();

        let instances: Vec<MeshInstance> = self.scene.mesh_instances().collect();
        if instances.len() > MAX_OBJECTS {
            warn!(
                "Scene has {} instances, drawing the first {MAX_OBJECTS}",
                instances.len()
            );
        }
        let draw_count = instances.len().min(MAX_OBJECTS);
        let instances = &instances[..draw_count];

        let extent = swapchain.extent;
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let orbit = self.time * TAU / CAMERA_ORBIT_SECONDS;
        let eye = Vec3::new(orbit.cos() * 7.5, 3.4, orbit.sin() * 7.5);
        let view_constants = ViewConstants {
            view: Mat4::look_at_rh(eye, Vec3::new(0.0, 1.0, 0.0), Vec3::Y),
            projection: Mat4::perspective_rh(60f32.to_radians(), aspect, 0.1, 1000.0),
            camera_position: eye.extend(1.0),
        };

        let sun_angle = self.time * TAU / SUN_CYCLE_SECONDS;
        let sky_constants = SkyConstants {
            sun_direction: Vec3::new(sun_angle.cos() * 0.8, 0.9, sun_angle.sin() * 0.8)
                .normalize()
                .extend(0.0),
            zenith_color: Vec4::new(0.16, 0.3, 0.58, 1.0),
            horizon_color: Vec4::new(0.74, 0.68, 0.6, 1.0),
            params: Vec4::new(self.time, 0.0, 0.0, 0.0),
        };

        let overlay_frame = self.build_overlay(dt);
        let packed = pack_overlay(&overlay_frame)?;
        let overlay_mesh = packed.as_ref().map(|geo| &geo.mesh);
        let empty_spans = Vec::new();
        let spans = packed.as_ref().map_or(&empty_spans[..], |geo| &geo.spans[..]);

        let device = gpu.device();
        let slots = &mut self.slots;
        let meshes = &self.meshes;
        let dome = &self.dome;
        let mesh_pipeline = &self.mesh_pipeline;
        let sky_pipeline = &self.sky_pipeline;
        let overlay_pipeline = &self.overlay_pipeline;

        let outcome = self.sequencer.tick(
            gpu,
            surface,
            swapchain,
            overlay_mesh,
            |ctx| {
                let consts = &mut slots[ctx.frame_index];
                consts.view.write(&view_constants)?;
                consts.sky.write(&sky_constants)?;
                for (i, instance) in instances.iter().enumerate() {
                    consts.objects.write_at(
                        i as u64 * OBJECT_STRIDE,
                        &ObjectConstants {
                            model: instance.world,
                            tint: instance.tint,
                        },
                    )?;
                }
                ctx.uploads.enqueue_const_buffer(&mut consts.view)?;
                ctx.uploads.enqueue_const_buffer(&mut consts.sky)?;
                ctx.uploads.enqueue_const_buffer(&mut consts.objects)?;
                Ok(())
            },
            |ctx| {
                // Flipped viewport keeps world geometry in the usual
                // right-handed, Y-up conventions.
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: ctx.extent.height as f32,
                    width: ctx.extent.width as f32,
                    height: -(ctx.extent.height as f32),
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                let scissor = vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: ctx.extent,
                };
                device.cmd_set_viewport(ctx.cmd, 0, &[viewport]);
                device.cmd_set_scissor(ctx.cmd, 0, &[scissor]);

                device.cmd_bind_pipeline(
                    ctx.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    mesh_pipeline.pipeline,
                );
                device.cmd_bind_descriptor_sets(
                    ctx.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    mesh_pipeline.layout,
                    0,
                    &[ctx.bindings.view, ctx.bindings.sky, ctx.bindings.material],
                    &[],
                );
                for (i, instance) in instances.iter().enumerate() {
                    device.cmd_bind_descriptor_sets(
                        ctx.cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        mesh_pipeline.layout,
                        3,
                        &[ctx.bindings.object],
                        &[i as u32 * OBJECT_STRIDE as u32],
                    );
                    let mesh = &meshes[instance.mesh];
                    bind_mesh_streams(device, ctx.cmd, mesh);
                    device.cmd_draw_indexed(ctx.cmd, mesh.index_count(), 1, 0, 0, 0);
                }

                // Sky after opaques so most of its fragments depth-fail
                device.cmd_bind_pipeline(
                    ctx.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    sky_pipeline.pipeline,
                );
                device.cmd_bind_descriptor_sets(
                    ctx.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    sky_pipeline.layout,
                    0,
                    &[ctx.bindings.view, ctx.bindings.sky],
                    &[],
                );
                device.cmd_bind_index_buffer(
                    ctx.cmd,
                    dome.resident.buffer,
                    dome.layout.index_region().offset,
                    dome.index_type(),
                );
                device.cmd_bind_vertex_buffers(
                    ctx.cmd,
                    0,
                    &[dome.resident.buffer],
                    &[dome.layout.stream_region(0).offset],
                );
                device.cmd_draw_indexed(ctx.cmd, dome.index_count(), 1, 0, 0, 0);

                if let Some(mesh) = ctx.overlay_mesh {
                    if !spans.is_empty() {
                        device.cmd_bind_pipeline(
                            ctx.cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            overlay_pipeline.pipeline,
                        );
                        let screen = [ctx.extent.width as f32, ctx.extent.height as f32];
                        device.cmd_push_constants(
                            ctx.cmd,
                            overlay_pipeline.layout,
                            vk::ShaderStageFlags::VERTEX,
                            0,
                            bytemuck::bytes_of(&screen),
                        );
                        device.cmd_bind_index_buffer(
                            ctx.cmd,
                            mesh.resident.buffer,
                            mesh.layout.index_region().offset,
                            mesh.index_type(),
                        );
                        device.cmd_bind_vertex_buffers(
                            ctx.cmd,
                            0,
                            &[mesh.resident.buffer],
                            &[mesh.layout.stream_region(0).offset],
                        );
                        for span in spans {
                            device.cmd_draw_indexed(
                                ctx.cmd,
                                span.index_count,
                                1,
                                span.first_index,
                                0,
                                0,
                            );
                        }
                    }
                }

                Ok(())
            },
        )?;

        match outcome {
            TickOutcome::Completed(report) => {
                self.after_tick(gpu, swapchain, report, frame_number)
            }
            TickOutcome::SkippedOutOfDate => Ok(()),
        }
    }

    unsafe fn after_tick(
        &mut self,
        gpu: &GpuContext,
        swapchain: &Swapchain,
        report: TickReport,
        frame_number: u64,
    ) -> Result<()> {
        if self.screenshots.should_capture(frame_number) || self.capture_requested {
            self.capture_requested = false;
            if let Err(e) = self.capture(gpu, swapchain, &report, frame_number) {
                error!("Screenshot failed: {e}");
            }
        }

        let completed = self.sequencer.frame_count();
        if self.screenshots.exit_after_capture && self.screenshots.all_captured(completed) {
            info!("All screenshots captured, exiting");
            self.should_exit = true;
        }
        if let Some(max) = self.max_frames {
            if completed >= max {
                info!("Rendered {completed} frames, exiting");
                self.should_exit = true;
            }
        }

        Ok(())
    }

    unsafe fn capture(
        &mut self,
        gpu: &GpuContext,
        swapchain: &Swapchain,
        report: &TickReport,
        frame_number: u64,
    ) -> Result<()> {
        let slot = self.sequencer.ring().slot(report.frame_index);
        let cmd = slot.screenshot_cmd;
        let fence = slot.in_flight;
        let image = swapchain.images[report.image_index as usize];

        // Readback image is created on first use and reused after
        let mut shot = match self.screenshotter.take() {
            Some(shot) => shot,
            None => Screenshotter::new(gpu, swapchain.extent.width, swapchain.extent.height)?,
        };

        let mut pixels = Vec::new();
        let captured = shot.capture(gpu, cmd, fence, image, &mut pixels);
        let (width, height) = shot.dimensions();
        self.screenshotter = Some(shot);
        captured?;

        let path = self.screenshots.output_path(frame_number);
        save_rgba(pixels, width, height, &path).map_err(|e| GpuError::Other(e.to_string()))?;

        Ok(())
    }

    /// Rebuild the overlay meter for this tick: an FPS bar and a frame
    /// time history strip, in separate batches.
    fn build_overlay(&mut self, dt: f32) -> OverlayFrame {
        if dt > 0.0 {
            let fps = 1.0 / dt;
            self.fps_smoothed = if self.fps_smoothed > 0.0 {
                self.fps_smoothed + (fps - self.fps_smoothed) * 0.05
            } else {
                fps
            };
        }
        self.frame_times.push_back(dt * 1000.0);
        while self.frame_times.len() > FRAME_TIME_HISTORY {
            self.frame_times.pop_front();
        }

        let mut frame = OverlayFrame::new();
        frame.quad([8.0, 8.0], [220.0, 64.0], [14, 16, 24, 200]);

        frame.begin_batch();
        let fill = (self.fps_smoothed / 240.0).clamp(0.0, 1.0);
        frame.quad(
            [12.0, 12.0],
            [12.0 + fill * 200.0, 20.0],
            [120, 220, 130, 255],
        );
        for (i, &ms) in self.frame_times.iter().enumerate() {
            let h = (ms / 33.3).clamp(0.0, 1.0) * 34.0;
            let x = 12.0 + i as f32 * 2.0;
            let color = if ms > 20.0 {
                [230, 120, 90, 255]
            } else {
                [90, 160, 230, 255]
            };
            frame.quad([x, 60.0 - h], [x + 1.5, 60.0], color);
        }

        frame
    }

    /// Tear everything down. The caller must have waited for the device
    /// to go idle.
    ///
    /// # Safety
    /// No frame may be in flight.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        let device = gpu.device();

        self.pipeline_cache.save(device);
        self.mesh_pipeline.destroy(device);
        self.sky_pipeline.destroy(device);
        self.overlay_pipeline.destroy(device);
        self.pipeline_cache.destroy(device);

        if let Some(shot) = &mut self.screenshotter {
            shot.destroy(gpu);
        }

        self.sequencer.destroy(gpu);

        {
            let mut allocator = gpu.allocator().lock();
            for consts in &mut self.slots {
                if let Err(e) = consts.view.destroy(&mut allocator) {
                    error!("Failed to free view constants: {e}");
                }
                if let Err(e) = consts.sky.destroy(&mut allocator) {
                    error!("Failed to free sky constants: {e}");
                }
                if let Err(e) = consts.objects.destroy(&mut allocator) {
                    error!("Failed to free object constants: {e}");
                }
            }
            for mesh in &mut self.meshes {
                if let Err(e) = mesh.destroy(&mut allocator) {
                    error!("Failed to free mesh: {e}");
                }
            }
            if let Err(e) = self.dome.destroy(&mut allocator) {
                error!("Failed to free sky dome: {e}");
            }
            if let Err(e) = self.texture.destroy(device, &mut allocator) {
                error!("Failed to free texture: {e}");
            }
        }

        device.destroy_sampler(self.sampler, None);
        device.destroy_descriptor_set_layout(self.layouts.view, None);
        device.destroy_descriptor_set_layout(self.layouts.sky, None);
        device.destroy_descriptor_set_layout(self.layouts.material, None);
        device.destroy_descriptor_set_layout(self.layouts.object, None);
    }
}

/// Bind the index region and the three vertex streams of a scene mesh.
unsafe fn bind_mesh_streams(device: &ash::Device, cmd: vk::CommandBuffer, mesh: &GpuMesh) {
    device.cmd_bind_index_buffer(
        cmd,
        mesh.resident.buffer,
        mesh.layout.index_region().offset,
        mesh.index_type(),
    );
    let buffers = [mesh.resident.buffer; 3];
    let offsets = [
        mesh.layout.stream_region(0).offset,
        mesh.layout.stream_region(1).offset,
        mesh.layout.stream_region(2).offset,
    ];
    device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &offsets);
}

fn load_shader(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))
}

/// Procedural checkerboard with grout lines, mipmapped on upload.
fn checker_texture(size: u32) -> TextureData {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let rgb: [u8; 3] = if x % 32 < 2 || y % 32 < 2 {
                [40, 40, 48]
            } else if ((x / 32) + (y / 32)) % 2 == 0 {
                [214, 182, 130]
            } else {
                [96, 110, 130]
            };
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }

    TextureData {
        width: size,
        height: size,
        format: vk::Format::R8G8B8A8_SRGB,
        layer_count: 1,
        pixels,
        regions: Vec::new(),
        gen_mips: true,
    }
}
