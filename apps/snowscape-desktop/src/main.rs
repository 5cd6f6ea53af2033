use anyhow::{Context, Result};
use clap::Parser;
use egui::Context as EguiContext;
use snowscape_assets::{AssetCache, FileSource};
use snowscape_render::{DebugTextRenderer, Frame, FrameCounter, Renderer, build_draw_list};
use snowscape_render_wgpu::{FlyCamera, GpuResources, WgpuBackend, WgpuRenderer};
use snowscape_scene::{PopulateReport, Scene, SceneConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{
    DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "snowscape-desktop", about = "Snowscape scene viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene config (JSON); the built-in rock field is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory asset paths are resolved against
    #[arg(long, default_value = ".")]
    asset_root: PathBuf,
}

/// Everything that lives independently of the window and device.
struct AppState {
    scene: Scene,
    cache: AssetCache,
    config: SceneConfig,
    populated: Option<PopulateReport>,
    camera: FlyCamera,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    last_frame: Instant,
    started: Instant,
    frame_counter: FrameCounter,
    ms_per_frame: Option<f64>,
    show_overlay: bool,
}

impl AppState {
    fn new(config: SceneConfig) -> Self {
        Self {
            scene: Scene::new(),
            cache: AssetCache::new(),
            config,
            populated: None,
            camera: FlyCamera::default(),
            keys_held: HashSet::new(),
            mouse_captured: false,
            last_frame: Instant::now(),
            started: Instant::now(),
            frame_counter: FrameCounter::new(0.0),
            ms_per_frame: None,
            show_overlay: true,
        }
    }

    fn held(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|k| self.keys_held.contains(k))
    }

    /// Camera motion (frame-time scaled), then one fixed scene step.
    fn update(&mut self, dt: f32) {
        let speed_mult = if self.held(&[KeyCode::ShiftLeft]) { 3.0 } else { 1.0 };

        let mut forward = 0.0;
        let mut strafe = 0.0;
        if self.held(&[KeyCode::KeyW, KeyCode::ArrowUp]) {
            forward += 1.0;
        }
        if self.held(&[KeyCode::KeyS, KeyCode::ArrowDown]) {
            forward -= 1.0;
        }
        if self.held(&[KeyCode::KeyD, KeyCode::ArrowRight]) {
            strafe += 1.0;
        }
        if self.held(&[KeyCode::KeyA, KeyCode::ArrowLeft]) {
            strafe -= 1.0;
        }
        if forward != 0.0 || strafe != 0.0 {
            self.camera.translate(forward, strafe, dt * speed_mult);
        }

        self.scene.advance_all();

        let now = self.started.elapsed().as_secs_f64();
        if let Some(ms) = self.frame_counter.frame(now) {
            tracing::debug!(ms_per_frame = ms, "frame time");
            self.ms_per_frame = Some(ms);
        }
    }

    /// Returns `true` when the app should exit.
    fn handle_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
            return false;
        }

        match key {
            KeyCode::Escape => return true,
            KeyCode::F1 => self.show_overlay = !self.show_overlay,
            KeyCode::F2 => {
                let view = self.camera.render_view(self.config.light_position);
                let dump = DebugTextRenderer::new().render(
                    Frame {
                        scene: &self.scene,
                        cache: &self.cache,
                    },
                    &view,
                );
                tracing::info!("scene dump\n{dump}");
            }
            _ => {}
        }
        false
    }

    fn draw_ui(&self, ctx: &EguiContext) {
        if !self.show_overlay {
            return;
        }
        let stats = self.cache.stats();

        egui::Window::new("Snowscape")
            .default_width(260.0)
            .show(ctx, |ui| {
                match self.ms_per_frame {
                    Some(ms) => ui.label(format!("{ms:.3} ms/frame")),
                    None => ui.label("measuring..."),
                };
                ui.label(format!("Tick: {}", self.scene.tick()));
                ui.label(format!("Objects: {}", self.scene.len()));
                ui.label(format!(
                    "Camera: ({:.1}, {:.1}, {:.1})  FoV {:.0}",
                    self.camera.position.x,
                    self.camera.position.y,
                    self.camera.position.z,
                    self.camera.fov_degrees
                ));
                ui.separator();

                ui.heading("Asset cache");
                ui.label(format!(
                    "Meshes: {}  Textures: {}  Normal maps: {}",
                    stats.meshes, stats.textures, stats.normal_maps
                ));
                ui.label(format!(
                    "Loads: {} mesh / {} texture  Hits: {}",
                    stats.mesh_loads, stats.texture_loads, stats.hits
                ));
                ui.label(format!(
                    "GPU buffers: {}  GPU textures: {}",
                    stats.gpu_buffers, stats.gpu_textures
                ));

                if let Some(report) = &self.populated {
                    if !report.skipped.is_empty() {
                        ui.separator();
                        ui.heading("Skipped groups");
                        for (mesh, error) in &report.skipped {
                            ui.label(format!("{mesh}: {error}"));
                        }
                    }
                }

                ui.separator();
                ui.small("F1: Overlay | F2: Dump | RMB: Look | WASD: Move | Esc: Quit");
            });
    }
}

/// Window, device and everything created against them.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    resources: GpuResources,
    renderer: WgpuRenderer,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

struct GpuApp {
    state: AppState,
    source: FileSource,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
}

impl GpuApp {
    fn new(config: SceneConfig, asset_root: PathBuf) -> Self {
        Self {
            state: AppState::new(config),
            source: FileSource::new(asset_root),
            gpu: None,
            egui_ctx: EguiContext::default(),
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("Snowscape")
            .with_inner_size(PhysicalSize::new(1024u32, 768));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("snowscape_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.state.camera.aspect = config.width as f32 / config.height as f32;

        let renderer =
            WgpuRenderer::new(&device, &queue, surface_format, config.width, config.height);

        let mut resources = GpuResources::new();
        let report = {
            let mut backend = WgpuBackend::new(&device, &queue, &mut resources);
            self.state.scene.populate(
                &self.state.config,
                &mut self.state.cache,
                &mut backend,
                &mut self.source,
            )?
        };
        self.state.populated = Some(report);

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            objects = self.state.scene.len(),
            "GPU initialized"
        );

        Ok(Gpu {
            window,
            surface,
            device,
            queue,
            config,
            resources,
            renderer,
            egui_winit,
            egui_renderer,
        })
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        self.state.update(dt);

        let Self {
            state,
            gpu,
            egui_ctx,
            ..
        } = self;
        let Some(gpu) = gpu.as_mut() else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let items = build_draw_list(&state.scene, &state.cache);
        gpu.renderer.render(
            &gpu.device,
            &gpu.queue,
            &view,
            &state.camera,
            state.config.light_position,
            &items,
            &state.cache,
            &gpu.resources,
        );

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let full_output = egui_ctx.run(raw_input, |ctx| {
            state.draw_ui(ctx);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        gpu.egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
    }

    /// Drop every object, then free every cached asset on the device that
    /// created it.
    fn shutdown(&mut self) {
        let scene = std::mem::take(&mut self.state.scene);
        let cache = std::mem::take(&mut self.state.cache);
        let Some(gpu) = self.gpu.as_mut() else {
            // nothing was ever uploaded
            return;
        };
        gpu.renderer.clear_bindings();
        let mut backend = WgpuBackend::new(&gpu.device, &gpu.queue, &mut gpu.resources);
        let report = snowscape_scene::shutdown(scene, cache, &mut backend);
        tracing::info!(
            meshes = report.meshes,
            textures = report.textures,
            buffers_freed = report.buffers_freed,
            textures_freed = report.textures_freed,
            live_buffers = gpu.resources.live_buffers(),
            live_textures = gpu.resources.live_textures(),
            "assets released"
        );
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("startup failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(&gpu.device, &gpu.config);
                    self.state.camera.aspect = gpu.config.width as f32 / gpu.config.height as f32;
                    gpu.renderer
                        .resize(&gpu.device, gpu.config.width, gpu.config.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                if self.state.handle_key(key, key_state == ElementState::Pressed) {
                    event_loop.exit();
                }
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.mouse_captured = btn_state == ElementState::Pressed;
                if let Some(gpu) = &self.gpu {
                    gpu.window.set_cursor_visible(!self.state.mouse_captured);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.state.camera.zoom(lines);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.mouse_captured {
                self.state.camera.rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    tracing::info!(
        objects = config.object_count(),
        asset_root = %cli.asset_root.display(),
        "snowscape-desktop starting"
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(config, cli.asset_root);
    event_loop.run_app(&mut app)?;

    Ok(())
}
