//! Scene viewer: loads SPIR-V shaders and baked assets from the command
//! line and renders everything in a grid with a fly camera.
//!
//! Usage: `cinder-viewer <shader-dir> <asset-dir>`
//!
//! The shader directory must contain `mesh.vert.spv` and `mesh.frag.spv`
//! with the interface the mesh renderer expects:
//!   set 0: camera_data (uniform, bound dynamic)
//!   set 1: object_data (storage, bound dynamic)
//!   set 2: scene_data  (uniform, declared in vertex and fragment)
//!   set 3: base_color  (combined image sampler, textured variant only)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3, Vec4};
use winit::event::{DeviceEvent, WindowEvent};
use winit::keyboard::KeyCode;
use winit::window::Window;

use cinder::core::camera::{Camera, CameraController, Projection};
use cinder::core::cli::EngineArgs;
use cinder::core::config::{ConfigFlags, ConfigHandle, ConfigRegistry};
use cinder::core::input::InputManager;
use cinder::core::math::Radians;
use cinder::asset::{load_binary_file, read_texture_info, unpack_texture};
use cinder::renderer::{
    GpuCameraData, GpuMesh, GpuSceneData, Material, MeshRenderer, MeshVertex, RenderObject,
    RenderRegistry,
};
use cinder::rhi::{
    upload_texture, vk, GraphicPipelineInfo, ImmediateCommandEncoder, ReflectionOverride,
    Sampler, SamplerConfig, Shader, ShaderEffect, ShaderStage, Texture, TextureDesc, UploadPool,
    VertexLayout,
};
use cinder::{App, Engine, RenderContext, RenderableApp};

const UPLOAD_STAGING_SIZE: u64 = 64 * 1024 * 1024;

struct ViewerApp {
    shader_dir: PathBuf,
    asset_dir: PathBuf,

    registry: RenderRegistry,
    renderer: Option<MeshRenderer>,
    // Shader modules must stay alive as long as their effects.
    _shaders: Vec<Shader>,
    _sampler: Option<Sampler>,

    objects: Vec<RenderObject>,
    camera: Camera,
    controller: CameraController,
    input: InputManager,

    config: ConfigRegistry,
    move_speed: ConfigHandle<f64>,
    grid_size: ConfigHandle<i32>,

    time: f32,
}

impl App for ViewerApp {
    fn new(args: &EngineArgs) -> Result<Self> {
        if args.args.len() != 2 {
            log::error!("cinder-viewer must be called with the shader directory path and the asset directory path");
            std::process::exit(1);
        }

        let mut config = ConfigRegistry::new();
        let move_speed = config.register_float(
            "camera.move_speed",
            "fly camera speed in units per second",
            40.0,
            ConfigFlags::EDIT_FLOAT_DRAG,
        );
        let grid_size = config.register_int(
            "scene.grid_size",
            "side length of the spawned object grid",
            12,
            ConfigFlags::ADVANCED,
        );

        let mut camera = Camera::new(
            Projection::Perspective {
                fov_y: Radians::new(std::f32::consts::FRAC_PI_3),
                z_near: 0.1,
            },
            1700.0 / 900.0,
        );
        camera.set_location(Vec3::new(0.0, -30.0, 12.0));

        Ok(Self {
            shader_dir: PathBuf::from(&args.args[0]),
            asset_dir: PathBuf::from(&args.args[1]),
            registry: RenderRegistry::new(),
            renderer: None,
            _shaders: Vec::new(),
            _sampler: None,
            objects: Vec::new(),
            camera,
            controller: CameraController::new(0.4),
            input: InputManager::new(),
            config,
            move_speed,
            grid_size,
            time: 0.0,
        })
    }

    fn on_window_event(&mut self, event: &WindowEvent, window: &Window) {
        self.input.on_window_event(event);
        self.controller.on_window_event(event, window);
    }

    fn on_device_event(&mut self, event: &DeviceEvent) {
        self.controller.on_device_event(event);
    }

    #[profiling::function]
    fn tick(&mut self, delta_time: f32) {
        self.time += delta_time;

        self.controller.set_move_speed(self.config.get_float(self.move_speed) as f32);

        let forward = self.input.key_axis(KeyCode::KeyS, KeyCode::KeyW);
        let right = self.input.key_axis(KeyCode::KeyA, KeyCode::KeyD);
        let up = self.input.key_axis(KeyCode::KeyQ, KeyCode::KeyE);

        self.controller
            .update_cameras(delta_time, forward, right, up, std::iter::once(&mut self.camera));
        self.input.tick();
    }
}

impl RenderableApp for ViewerApp {
    fn prepare(&mut self, engine: &mut Engine) -> Result<()> {
        let mut renderer = MeshRenderer::new(&engine.render_device)?;

        let effect = {
            let device = &engine.render_device;

            // Shaders are required; everything else degrades gracefully.
            let vertex = Shader::from_file(
                "mesh.vert",
                device,
                &self.shader_dir.join("mesh.vert.spv"),
                "main",
                ShaderStage::Vertex,
            )?;
            let fragment = Shader::from_file(
                "mesh.frag",
                device,
                &self.shader_dir.join("mesh.frag.spv"),
                "main",
                ShaderStage::Fragment,
            )?;

            let overrides: Vec<ReflectionOverride> = MeshRenderer::reflection_overrides();
            let (layout_cache, _) = renderer.descriptor_resources();
            let effect = Arc::new(ShaderEffect::new(device, layout_cache, &[&vertex, &fragment], &overrides)?);
            self._shaders.push(vertex);
            self._shaders.push(fragment);
            effect
        };

        let sampler = Sampler::new("sampler.default", &engine.render_device, &SamplerConfig::linear())?;

        {
            let device = &engine.render_device;
            let immediate = ImmediateCommandEncoder::new(device, device.graphics_queue())?;
            let mut upload = UploadPool::new(device, UPLOAD_STAGING_SIZE)?;

            self.load_assets(device, &immediate, &mut upload)?;

            // Fallback geometry so an empty asset directory still renders.
            if self.registry.mesh_count() == 0 {
                let cube = GpuMesh::from_vertices(
                    device,
                    &immediate,
                    &mut upload,
                    "builtin.cube",
                    &cube_vertices(),
                    &cube_indices(),
                )?;
                self.registry.add_mesh("builtin.cube", cube);
            }
        }

        self.create_materials(engine, &mut renderer, effect, &sampler)?;
        self.spawn_grid();

        self._sampler = Some(sampler);
        self.renderer = Some(renderer);

        log::info!(
            "viewer ready: {} meshes, {} materials, {} objects",
            self.registry.mesh_count(),
            self.registry.material_count(),
            self.objects.len()
        );
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.camera.set_aspect_ratio(width as f32 / height as f32);
        }
    }

    #[profiling::function]
    fn render(&mut self, context: &mut RenderContext) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        let camera_data = GpuCameraData {
            view: self.camera.view(),
            proj: self.camera.projection(),
            viewproj: self.camera.view_projection(),
        };

        let framed = self.time / 2.0;
        let scene_params = GpuSceneData {
            ambient_color: Vec4::new(framed.sin() * 0.1 + 0.15, 0.12, framed.cos() * 0.1 + 0.15, 1.0),
            sunlight_direction: Vec4::new(-0.3, 0.4, -1.0, 0.0).normalize(),
            sunlight_color: Vec4::new(1.0, 0.96, 0.88, 1.0),
        };

        renderer
            .draw(
                context.encoder(),
                &self.registry,
                &self.objects,
                &camera_data,
                &scene_params,
                context.frame_index(),
            )
            .expect("mesh draw recording failed");
    }
}

impl ViewerApp {
    /// Load every `.mesh` and `.tx` in the asset directory. Individual
    /// failures are logged and skipped.
    fn load_assets(
        &mut self,
        device: &cinder::rhi::RenderDevice,
        immediate: &ImmediateCommandEncoder,
        upload: &mut UploadPool,
    ) -> Result<()> {
        let entries = match std::fs::read_dir(&self.asset_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("cannot read asset directory {:?}: {}", self.asset_dir, e);
                return Ok(());
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };

            match extension {
                "mesh" => {
                    match GpuMesh::from_asset(device, immediate, upload, &path) {
                        Ok(mesh) => {
                            let name = asset_name(&path);
                            self.registry.add_mesh(&name, mesh);
                        }
                        Err(e) => log::error!("skipping mesh {:?}: {:#}", path, e),
                    }
                }
                "tx" => {
                    match load_gpu_texture(device, immediate, &path) {
                        Ok(texture) => {
                            let name = asset_name(&path);
                            self.registry.add_texture(&name, texture);
                        }
                        Err(e) => log::error!("skipping texture {:?}: {:#}", path, e),
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn create_materials(
        &mut self,
        engine: &mut Engine,
        renderer: &mut MeshRenderer,
        effect: Arc<ShaderEffect>,
        sampler: &Sampler,
    ) -> Result<()> {
        let (binding, attributes) = MeshVertex::vertex_layout();
        let stages = effect.stage_create_infos();
        let pipeline_info = GraphicPipelineInfo {
            stages: &stages,
            vertex_binding: Some(binding),
            vertex_attributes: &attributes,
            color_format: engine.swapchain().format(),
            ..Default::default()
        };

        let device = &engine.render_device;
        let pipeline_cache = &mut engine.pipeline_cache;

        // One textured material per loaded texture, plus an untextured
        // default. All of them share the effect, so the binder keeps its
        // cached sets when the draw stream switches between them.
        let first_texture = self.registry.first_texture();
        if let Some(texture_handle) = first_texture {
            let (layout_cache, allocator) = renderer.descriptor_resources();
            let material = Material::textured(
                device,
                pipeline_cache,
                layout_cache,
                allocator,
                effect.clone(),
                &pipeline_info,
                self.registry.texture(texture_handle),
                sampler,
            )?;
            self.registry.add_material("textured", material);
        }

        let material = Material::new(device, pipeline_cache, effect.clone(), &pipeline_info)?;
        self.registry.add_material("default", material);

        Ok(())
    }

    fn spawn_grid(&mut self) {
        let grid = self.config.get_int(self.grid_size).max(1);
        let mesh_count = self.registry.mesh_count() as u32;
        let material_count = self.registry.material_count() as u32;

        for x in 0..grid {
            for y in 0..grid {
                let index = (x * grid + y) as u32;
                let mesh = cinder::renderer::MeshHandle(index % mesh_count);
                let material = cinder::renderer::MaterialHandle(index % material_count);

                let translation = Vec3::new(
                    (x - grid / 2) as f32 * 4.0,
                    (y - grid / 2) as f32 * 4.0,
                    0.0,
                );
                self.objects.push(RenderObject {
                    mesh,
                    material,
                    transform: Mat4::from_translation(translation),
                });
            }
        }
    }
}

fn asset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load a baked `.tx` texture and upload it to a sampled image.
fn load_gpu_texture(
    device: &cinder::rhi::RenderDevice,
    immediate: &ImmediateCommandEncoder,
    path: &Path,
) -> Result<Texture> {
    let file = load_binary_file(path).with_context(|| format!("loading texture asset {:?}", path))?;
    let info = read_texture_info(&file).with_context(|| format!("parsing texture metadata of {:?}", path))?;

    if info.format != cinder::asset::TextureFormat::Rgba8 {
        return Err(anyhow!("texture {:?} has unsupported format {:?}", path, info.format));
    }

    let pixels = unpack_texture(&info, &file.blob)
        .with_context(|| format!("unpacking texture payload of {:?}", path))?;

    let desc = TextureDesc::new_2d(&asset_name(path), info.width, info.height, vk::Format::R8G8B8A8_SRGB)
        .with_transfer_dst_usage();
    let texture = Texture::new(device, &desc)?;
    upload_texture(device, immediate, &texture, &pixels)?;

    log::info!("loaded texture {:?}: {}x{}", path, info.width, info.height);
    Ok(texture)
}

fn cube_vertices() -> Vec<MeshVertex> {
    let normals: [[f32; 3]; 6] = [
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
    ];

    let mut vertices = Vec::with_capacity(24);
    for normal in normals {
        // Build the face's corners in the plane perpendicular to the normal.
        let n = Vec3::from_array(normal);
        let tangent = if n.z.abs() > 0.9 { Vec3::X } else { Vec3::Z.cross(n).normalize() };
        let bitangent = n.cross(tangent);

        for (u, v) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = n + tangent * u + bitangent * v;
            vertices.push(MeshVertex {
                position: position.to_array(),
                normal,
                color: [0.8, 0.8, 0.8],
                uv: [(u + 1.0) / 2.0, (v + 1.0) / 2.0],
            });
        }
    }
    vertices
}

fn cube_indices() -> Vec<u32> {
    let mut indices = Vec::with_capacity(36);
    for face in 0..6u32 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}

fn main() -> Result<()> {
    cinder::launch::<ViewerApp>()
}
