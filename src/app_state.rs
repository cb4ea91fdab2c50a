use std::sync::Arc;

use bevy_color::{LinearRgba, Srgba};
use glam::{Vec2, Vec3};
use instant::Instant;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::assets;
use crate::camera::{Camera, SceneUniform};
use crate::models::{BackdropVertex, LineVertex, MeshVertex, VehicleInstance};
use crate::scene::connection;
use crate::scene::layout::DEFAULT_CLUSTERS;
use crate::scene::Scene;

const VEHICLES_WGSL: &str = include_str!("./shaders/vehicles.wgsl");
const LINES_WGSL: &str = include_str!("./shaders/lines.wgsl");
const BACKDROP_WGSL: &str = include_str!("./shaders/backdrop.wgsl");

/// Dragged nodes are snapped onto this plane.
pub const DRAG_PLANE_Z: f32 = 0.0;

// Fixed stage lighting
const AMBIENT_INTENSITY: f32 = 0.4;
const SUN_POSITION: Vec3 = Vec3::new(10.0, 10.0, 5.0);
const SUN_INTENSITY: f32 = 0.8;
const FILL_POSITION: Vec3 = Vec3::new(-8.0, -6.0, 6.0);
const FILL_INTENSITY: f32 = 0.4;
const FILL_RANGE: f32 = 40.0;
const FOG_START: f32 = 28.0;
const FOG_END: f32 = 80.0;

// Backdrop plane placement
const BACKDROP_WIDTH: f32 = 12.0;
const BACKDROP_CENTER: Vec3 = Vec3::new(-8.0, 0.0, -8.0);

pub struct State {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,

    depth_view: wgpu::TextureView,

    pub camera: Camera,
    pub camera_needs_update: bool,
    scene_uniform: SceneUniform,
    scene_uniform_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,

    vehicle_render_pipeline: wgpu::RenderPipeline,
    line_render_pipeline: wgpu::RenderPipeline,
    backdrop_render_pipeline: wgpu::RenderPipeline,

    vehicle_vertex_buffer: wgpu::Buffer,
    vehicle_index_buffer: wgpu::Buffer,
    vehicle_index_count: u32,

    instances: Vec<VehicleInstance>,
    instance_buffer: wgpu::Buffer,

    line_vertices: Vec<LineVertex>,
    line_vertex_buffer: wgpu::Buffer,

    backdrop_vertex_buffer: wgpu::Buffer,
    backdrop_index_buffer: wgpu::Buffer,
    backdrop_bind_group: wgpu::BindGroup,

    pub scene: Scene,

    pub mouse_current_pos_screen: Vec2,

    started: Instant,
    last_update_instant: Instant,
    pub last_frame_instant: Instant,
    pub frame_count_in_second: u32,
    pub current_fps: u32,
}

impl State {
    pub async fn new(window_arc: Arc<Window>) -> anyhow::Result<State> {
        let size = window_arc.inner_size();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window_arc)?;

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or_else(|| {
                log::warn!(
                    "No sRGB surface format found, falling back to {:?}",
                    surface_caps.formats[0]
                );
                surface_caps.formats[0]
            });

        let needs_shader_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_shader_srgb_output_conversion
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = Self::create_depth_view(&device, &config);

        // --- Camera + scene uniform ---
        let camera = Camera::new(size.width, size.height);
        let scene_uniform = build_scene_uniform(&camera, needs_shader_srgb_output_conversion);

        let scene_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::cast_slice(&[scene_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("Scene Bind Group Layout"),
            });

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &scene_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene_uniform_buffer.as_entire_binding(),
            }],
            label: Some("Scene Bind Group"),
        });

        // --- Vehicle mesh: external model if present, part table otherwise ---
        let vehicle_mesh = assets::load_vehicle_obj(assets::VEHICLE_MODEL_PATH)
            .unwrap_or_else(|e| {
                log::warn!("Vehicle model unavailable ({e:#}); using procedural shuttle.");
                assets::fallback_vehicle()
            });
        let pick_radius = vehicle_mesh.bounding_radius();

        let vehicle_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vehicle Vertex Buffer"),
            contents: bytemuck::cast_slice(&vehicle_mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let vehicle_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vehicle Index Buffer"),
            contents: bytemuck::cast_slice(&vehicle_mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let vehicle_index_count = vehicle_mesh.indices.len() as u32;

        // --- Scene data ---
        let scene = Scene::new(DEFAULT_CLUSTERS, pick_radius);

        let instances = build_instances(&scene);
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vehicle Instance Buffer"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let line_vertices = build_line_vertices(&scene, 0.0);
        let line_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Line Vertex Buffer"),
            contents: bytemuck::cast_slice(&line_vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        // --- Backdrop plane + texture ---
        let backdrop_image = assets::load_backdrop_image(assets::BACKDROP_IMAGE_PATH)
            .unwrap_or_else(|e| {
                log::warn!("Backdrop image unavailable ({e:#}); using procedural glow.");
                assets::fallback_backdrop()
            });

        let backdrop_height = BACKDROP_WIDTH / backdrop_image.aspect_ratio();
        let backdrop_vertices = backdrop_quad(BACKDROP_CENTER, BACKDROP_WIDTH, backdrop_height);
        let backdrop_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Backdrop Vertex Buffer"),
            contents: bytemuck::cast_slice(&backdrop_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let backdrop_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Backdrop Index Buffer"),
            contents: bytemuck::cast_slice(BackdropVertex::QUAD_INDICES.as_slice()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let backdrop_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Backdrop Texture"),
            size: wgpu::Extent3d {
                width: backdrop_image.width,
                height: backdrop_image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &backdrop_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &backdrop_image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * backdrop_image.width),
                rows_per_image: Some(backdrop_image.height),
            },
            wgpu::Extent3d {
                width: backdrop_image.width,
                height: backdrop_image.height,
                depth_or_array_layers: 1,
            },
        );
        let backdrop_texture_view =
            backdrop_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let backdrop_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Backdrop Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let backdrop_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
                label: Some("Backdrop Bind Group Layout"),
            });
        let backdrop_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &backdrop_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&backdrop_texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&backdrop_sampler),
                },
            ],
            label: Some("Backdrop Bind Group"),
        });

        // --- Shader modules ---
        let vehicles_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vehicles Shader"),
            source: wgpu::ShaderSource::Wgsl(VEHICLES_WGSL.into()),
        });
        let lines_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(LINES_WGSL.into()),
        });
        let backdrop_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Backdrop Shader"),
            source: wgpu::ShaderSource::Wgsl(BACKDROP_WGSL.into()),
        });

        // --- Pipelines ---
        let scene_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Scene Pipeline Layout"),
                bind_group_layouts: &[&scene_bind_group_layout],
                push_constant_ranges: &[],
            });
        let backdrop_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Backdrop Pipeline Layout"),
                bind_group_layouts: &[&scene_bind_group_layout, &backdrop_bind_group_layout],
                push_constant_ranges: &[],
            });

        let depth_stencil = |depth_write_enabled| {
            Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            })
        };

        let vehicle_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Vehicle Render Pipeline"),
                layout: Some(&scene_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vehicles_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::layout(), VehicleInstance::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &vehicles_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // Glazing is translucent so interiors stay visible
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: depth_stencil(true),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let line_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Line Render Pipeline"),
                layout: Some(&scene_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &lines_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[LineVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &lines_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: depth_stencil(false),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let backdrop_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Backdrop Render Pipeline"),
                layout: Some(&backdrop_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &backdrop_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[BackdropVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &backdrop_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: depth_stencil(false),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let now = Instant::now();
        Ok(Self {
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            depth_view,
            camera,
            camera_needs_update: true,
            scene_uniform,
            scene_uniform_buffer,
            scene_bind_group,
            vehicle_render_pipeline,
            line_render_pipeline,
            backdrop_render_pipeline,
            vehicle_vertex_buffer,
            vehicle_index_buffer,
            vehicle_index_count,
            instances,
            instance_buffer,
            line_vertices,
            line_vertex_buffer,
            backdrop_vertex_buffer,
            backdrop_index_buffer,
            backdrop_bind_group,
            scene,
            mouse_current_pos_screen: Vec2::ZERO,
            started: now,
            last_update_instant: now,
            last_frame_instant: now,
            frame_count_in_second: 0,
            current_fps: 0,
        })
    }

    fn create_depth_view(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
    ) -> wgpu::TextureView {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::info!("Resize {}, {}", width, height);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = Self::create_depth_view(&self.device, &self.config);

            self.camera.update_aspect_ratio(width, height);
            self.camera_needs_update = true;
            self.is_surface_configured = true;
        }
    }

    /// Advances the animation clock and refreshes every per-frame GPU input.
    /// The scene is never at rest, so every call produces new buffer contents.
    pub fn update(&mut self) {
        let now = Instant::now();
        // Clamp so a backgrounded tab doesn't come back with a giant step
        let dt = (now - self.last_update_instant).as_secs_f32().min(0.1);
        self.last_update_instant = now;
        let t = (now - self.started).as_secs_f32();

        self.scene.advance(t, dt);

        if self.camera_needs_update {
            self.scene_uniform.view_proj =
                self.camera.build_view_projection_matrix().to_cols_array_2d();
            self.queue.write_buffer(
                &self.scene_uniform_buffer,
                0,
                bytemuck::cast_slice(&[self.scene_uniform]),
            );
            self.camera_needs_update = false;
        }

        self.instances = build_instances(&self.scene);
        self.line_vertices = build_line_vertices(&self.scene, t);
        self.update_gpu_buffers();
    }

    fn update_gpu_buffers(&mut self) {
        let instance_data = bytemuck::cast_slice(&self.instances);
        let line_data = bytemuck::cast_slice(&self.line_vertices);

        if self.instance_buffer.size() < instance_data.len() as u64 {
            self.instance_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Vehicle Instance Buffer (Resized)"),
                        contents: instance_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else {
            self.queue.write_buffer(&self.instance_buffer, 0, instance_data);
        }

        if self.line_vertex_buffer.size() < line_data.len() as u64 {
            self.line_vertex_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Line Vertex Buffer (Resized)"),
                        contents: line_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else {
            self.queue.write_buffer(&self.line_vertex_buffer, 0, line_data);
        }
    }

    // --- Pointer interaction ---

    /// Tracks the cursor; while a drag is live, re-projects the node onto
    /// the drag plane. Returns true when the scene changed.
    pub fn pointer_moved(&mut self, screen_pos: Vec2) -> bool {
        self.mouse_current_pos_screen = screen_pos;
        if self.scene.dragging().is_none() {
            return false;
        }
        let ray = self.camera.screen_to_ray(screen_pos);
        if let Some(point) = ray.intersect_z_plane(DRAG_PLANE_Z) {
            self.scene.drag_to(point);
        }
        true
    }

    /// Ray-casts the press into the scene; a hit starts a drag.
    pub fn pointer_pressed(&mut self) -> bool {
        let ray = self.camera.screen_to_ray(self.mouse_current_pos_screen);
        match self.scene.pick(&ray) {
            Some(index) => {
                log::debug!("Picked node {index}");
                self.scene.begin_drag(index);
                true
            }
            None => false,
        }
    }

    pub fn pointer_released(&mut self) {
        self.scene.end_drag();
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        // --- FPS Calculation ---
        self.frame_count_in_second += 1;
        let now = Instant::now();
        let elapsed = (now - self.last_frame_instant).as_secs_f32();
        if elapsed >= 1.0 {
            self.current_fps = self.frame_count_in_second;
            self.frame_count_in_second = 0;
            self.last_frame_instant = now;
            log::debug!("FPS: {}", self.current_fps);
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let fog = LinearRgba::from(Srgba::rgb_u8(0xff, 0xf1, 0xec));
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: fog.red as f64,
                            g: fog.green as f64,
                            b: fog.blue as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.scene_bind_group, &[]);

            render_pass.set_pipeline(&self.backdrop_render_pipeline);
            render_pass.set_bind_group(1, &self.backdrop_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.backdrop_vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.backdrop_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..BackdropVertex::QUAD_INDICES.len() as u32, 0, 0..1);

            render_pass.set_pipeline(&self.vehicle_render_pipeline);
            render_pass.set_vertex_buffer(0, self.vehicle_vertex_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            render_pass
                .set_index_buffer(self.vehicle_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(
                0..self.vehicle_index_count,
                0,
                0..self.instances.len() as u32,
            );

            render_pass.set_pipeline(&self.line_render_pipeline);
            render_pass.set_vertex_buffer(0, self.line_vertex_buffer.slice(..));
            render_pass.draw(0..self.line_vertices.len() as u32, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

/// Four corners of the backdrop plane, facing the camera, with the image
/// mapped top-down. Drawn with `BackdropVertex::QUAD_INDICES`.
fn backdrop_quad(center: Vec3, width: f32, height: f32) -> Vec<BackdropVertex> {
    let half_w = width / 2.0;
    let half_h = height / 2.0;
    vec![
        BackdropVertex {
            position: [center.x - half_w, center.y - half_h, center.z],
            uv: [0.0, 1.0],
        },
        BackdropVertex {
            position: [center.x + half_w, center.y - half_h, center.z],
            uv: [1.0, 1.0],
        },
        BackdropVertex {
            position: [center.x + half_w, center.y + half_h, center.z],
            uv: [1.0, 0.0],
        },
        BackdropVertex {
            position: [center.x - half_w, center.y + half_h, center.z],
            uv: [0.0, 0.0],
        },
    ]
}

fn build_scene_uniform(camera: &Camera, needs_srgb_conversion: bool) -> SceneUniform {
    let fill = LinearRgba::from(Srgba::rgb_u8(0xff, 0x6b, 0x35));
    let fog = LinearRgba::from(Srgba::rgb_u8(0xff, 0xf1, 0xec));
    let sun_dir = SUN_POSITION.normalize();

    SceneUniform {
        view_proj: camera.build_view_projection_matrix().to_cols_array_2d(),
        camera_pos: [
            camera.position.x,
            camera.position.y,
            camera.position.z,
            needs_srgb_conversion as u32 as f32,
        ],
        ambient: [AMBIENT_INTENSITY, AMBIENT_INTENSITY, AMBIENT_INTENSITY, 0.0],
        sun_dir: [sun_dir.x, sun_dir.y, sun_dir.z, SUN_INTENSITY],
        fill_pos: [FILL_POSITION.x, FILL_POSITION.y, FILL_POSITION.z, FILL_INTENSITY],
        fill_color: [fill.red, fill.green, fill.blue, FILL_RANGE],
        fog_color: [fog.red, fog.green, fog.blue, 0.0],
        fog_range: [FOG_START, FOG_END, 0.0, 0.0],
    }
}

fn build_instances(scene: &Scene) -> Vec<VehicleInstance> {
    scene
        .nodes
        .iter()
        .map(|node| VehicleInstance {
            model: node.model_matrix().to_cols_array_2d(),
            tint: node.tint,
        })
        .collect()
}

fn build_line_vertices(scene: &Scene, t: f32) -> Vec<LineVertex> {
    let link = LinearRgba::from(Srgba::rgb_u8(0xff, 0x6b, 0x35));
    let mut vertices = Vec::with_capacity(scene.connections.len() * 2);
    for (index, conn) in scene.connections.iter().enumerate() {
        let alpha = connection::pulse_alpha(index, t);
        let color = [link.red, link.green, link.blue, alpha];
        let (from, to) = scene.connection_endpoints(conn);
        vertices.push(LineVertex { position: from.to_array(), color });
        vertices.push(LineVertex { position: to.to_array(), color });
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backdrop_quad_spans_the_requested_extent() {
        let center = BACKDROP_CENTER;
        let vertices = backdrop_quad(center, 12.0, 9.0);
        assert_eq!(vertices.len(), 4);

        for vertex in &vertices {
            assert_eq!(vertex.position[2], center.z);
        }
        let min_x = vertices.iter().map(|v| v.position[0]).fold(f32::MAX, f32::min);
        let max_x = vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        let min_y = vertices.iter().map(|v| v.position[1]).fold(f32::MAX, f32::min);
        let max_y = vertices.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
        assert_eq!(max_x - min_x, 12.0);
        assert_eq!(max_y - min_y, 9.0);
        assert_eq!((min_x + max_x) / 2.0, center.x);
        assert_eq!((min_y + max_y) / 2.0, center.y);
    }

    #[test]
    fn backdrop_quad_covers_the_unit_uv_square() {
        let vertices = backdrop_quad(BACKDROP_CENTER, 4.0, 4.0);
        let mut uvs: Vec<[f32; 2]> = vertices.iter().map(|v| v.uv).collect();
        uvs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(uvs, vec![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
        // The shared index set must address exactly these four corners
        assert!(BackdropVertex::QUAD_INDICES.iter().all(|&i| (i as usize) < vertices.len()));
        // Image v axis points down: the top edge of the plane samples v = 0
        let top = vertices
            .iter()
            .max_by(|a, b| a.position[1].partial_cmp(&b.position[1]).unwrap())
            .unwrap();
        assert_eq!(top.uv[1], 0.0);
    }
}
