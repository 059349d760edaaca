use anyhow::{Context, Result};
use clap::Parser;
use modelview_assets::{DiskImageLoader, import_model};
use modelview_common::ImportedScene;
use modelview_input::{HELP, InputState, Key, SceneCommand, parse_command};
use modelview_render::{ShaderSet, Viewer, ViewerConfig};
use modelview_render_wgpu::{WgpuDevice, builtin_shader_set};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

#[derive(Parser)]
#[command(name = "modelview-desktop", about = "Interactive 3D model viewer")]
struct Cli {
    /// Model to load (.obj, .gltf, .glb)
    model: Option<PathBuf>,

    /// JSON file overriding render and camera settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with <name>.vert.wgsl / <name>.frag.wgsl shader sources
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn map_key(code: KeyCode) -> Option<Key> {
    let key = match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::Escape => Key::Escape,
        KeyCode::Digit0 | KeyCode::Numpad0 => Key::Digit(0),
        KeyCode::Digit1 | KeyCode::Numpad1 => Key::Digit(1),
        KeyCode::Digit2 | KeyCode::Numpad2 => Key::Digit(2),
        KeyCode::Digit3 | KeyCode::Numpad3 => Key::Digit(3),
        KeyCode::Digit4 | KeyCode::Numpad4 => Key::Digit(4),
        _ => return None,
    };
    Some(key)
}

/// Reads console lines on a helper thread. Lines are parsed on the frame
/// thread so scene parameters only ever change between frames.
fn spawn_console() -> Receiver<String> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
        tracing::debug!("console input closed");
    });
    rx
}

/// Everything the viewer needs that is known before the window exists.
struct Startup {
    config: ViewerConfig,
    shaders: ShaderSet,
    scene: Option<ImportedScene>,
}

struct ViewerApp {
    startup: Startup,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer<WgpuDevice>>,
    input: InputState,
    console: Receiver<String>,
    console_open: bool,
    /// Unbounded cursor position built from raw mouse motion while captured.
    cursor: (f64, f64),
    captured: bool,
    fatal: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(startup: Startup, console: Receiver<String>) -> Self {
        Self {
            startup,
            window: None,
            viewer: None,
            input: InputState::default(),
            console,
            console_open: true,
            cursor: (0.0, 0.0),
            captured: false,
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let render = &self.startup.config.render;
        let attrs = Window::default_attributes()
            .with_title("Model Viewer")
            .with_inner_size(PhysicalSize::new(render.width, render.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let size = window.inner_size();
        let gpu = pollster::block_on(WgpuDevice::new(window.clone(), size.width, size.height))
            .context("initialize GPU")?;
        tracing::info!(format = ?gpu.surface_format(), "surface configured");

        let viewer = Viewer::new(
            gpu,
            &self.startup.config,
            &self.startup.shaders,
            self.startup.scene.take(),
            &DiskImageLoader,
        );
        self.window = Some(window);
        self.viewer = Some(viewer);
        self.set_captured(true);
        Ok(())
    }

    fn set_captured(&mut self, captured: bool) {
        let Some(window) = &self.window else { return };
        let result = if captured {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "cursor grab not available");
        }
        window.set_cursor_visible(!captured);
        self.captured = captured;
    }

    fn drain_console(&mut self) {
        while self.console_open {
            match self.console.try_recv() {
                Ok(line) => self.run_command(&line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.console_open = false,
            }
        }
    }

    fn run_command(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_command(line) {
            Ok(SceneCommand::Help) => println!("{HELP}"),
            Ok(SceneCommand::Clear) => print!("\x1b[2J\x1b[1;1H"),
            Ok(command) => {
                self.input.apply_command(&command);
                println!("{}", command.describe());
            }
            Err(err) => {
                tracing::warn!(%line, error = %err, "console command rejected");
                println!("{err}");
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_console();
        if self.input.quit_requested() {
            event_loop.exit();
            return;
        }
        let frame = self.input.end_frame();
        if let Some(viewer) = &mut self.viewer {
            match viewer.frame(&frame.actions, &frame.params) {
                Ok(stats) => tracing::trace!(
                    draws = stats.draw_calls,
                    effect = %stats.effect,
                    "frame presented"
                ),
                Err(err) => tracing::error!(error = %err, "frame failed"),
            }
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fatal = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.gpu_mut().resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::Focused(focused) => {
                if !focused {
                    self.input.release_all();
                }
                self.set_captured(focused);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                let Some(key) = map_key(code) else { return };
                match state {
                    ElementState::Pressed => self.input.key_down(key),
                    ElementState::Released => self.input.key_up(key),
                }
                if self.input.quit_requested() {
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.captured {
                self.cursor.0 += delta.0;
                self.cursor.1 += delta.1;
                self.input.cursor_moved(self.cursor.0, self.cursor.1);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = self.viewer.take() {
            viewer.shutdown();
        }
    }
}

fn load_startup(cli: &Cli) -> Result<Startup> {
    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let shaders = match &cli.shader_dir {
        Some(dir) => ShaderSet::from_dir(dir),
        None => builtin_shader_set(),
    };
    // A model that fails to import leaves the grid and light on screen.
    let scene = cli.model.as_ref().and_then(|path| match import_model(path) {
        Ok(scene) => Some(scene),
        Err(err) => {
            tracing::error!(error = %err, "model not loaded");
            None
        }
    });
    Ok(Startup {
        config,
        shaders,
        scene,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("modelview-desktop starting");
    let startup = load_startup(&cli)?;
    println!("Type `help` for the list of console commands.");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(startup, spawn_console());
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
