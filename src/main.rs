use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{
    ElementState, KeyEvent, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use prism_engine::app::{load_config, load_object, print_summary, render_headless};
use prism_engine::input::apply;
use prism_engine::{
    init_engine, Engine, EngineConfig, EngineError, InputState, KeyCode, MouseButton,
    RenderObject, ViewAction, WgpuBackend,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = load_config(options.config.as_deref())?;
    let mut objects = Vec::with_capacity(options.models.len());
    for model in &options.models {
        let object = load_object(&model.path, model.materials.as_deref())?;
        println!(
            "Loaded {} ({} vertices, {} triangles)",
            model.path.display(),
            object.geometry.vertex_count(),
            object.geometry.triangle_count()
        );
        objects.push(object);
    }

    if options.summary_only {
        return run_headless(objects, &config);
    }

    let fallback = objects.clone();
    match run_interactive(objects, config.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(fallback, &config)
            } else {
                Err(err)
            }
        }
    }
}

fn run_headless(objects: Vec<RenderObject>, config: &EngineConfig) -> Result<()> {
    let engine = render_headless(objects, config)?;
    print_summary(&engine)
}

fn run_interactive(objects: Vec<RenderObject>, config: EngineConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer::new(objects, config);
    event_loop
        .run_app(&mut viewer)
        .context("event loop terminated abnormally")?;

    match viewer.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Viewer {
    config: EngineConfig,
    pending: Vec<RenderObject>,
    window: Option<Arc<Window>>,
    engine: Option<Engine<WgpuBackend>>,
    input: InputState,
    failure: Option<anyhow::Error>,
}

impl Viewer {
    fn new(objects: Vec<RenderObject>, config: EngineConfig) -> Self {
        Self {
            config,
            pending: objects,
            window: None,
            engine: None,
            input: InputState::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        event_loop.exit();
    }

    fn dispatch(&mut self, event_loop: &ActiveEventLoop, action: ViewAction) {
        if action == ViewAction::Exit {
            event_loop.exit();
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Err(err) = apply(engine, action) {
            warn!("ignoring {action:?}: {err}");
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.renderer_mut().backend_mut().resize(width, height);
        if let Err(err) = engine.set_aspect_ratio(width as f32 / height as f32) {
            warn!("keeping previous projection: {err}");
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match engine.render() {
            Ok(()) => {}
            // the engine already skipped the frame
            Err(EngineError::Math(_)) => {}
            Err(err) => {
                error!("rendering failed: {err}");
                self.fail(event_loop, err.into());
            }
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Prism Engine")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, WindowInitError::from_error("window", err).into());
                return;
            }
        };

        let mut engine = match block_on(init_engine(Arc::clone(&window), &self.config)) {
            Ok(engine) => engine,
            Err(err) => {
                self.fail(event_loop, err.into());
                return;
            }
        };
        for object in std::mem::take(&mut self.pending) {
            match engine.add(object) {
                Ok(handle) => info!("render object {handle} uploaded"),
                Err(err) => {
                    self.fail(event_loop, anyhow!(err).context("failed to upload model"));
                    return;
                }
            }
        }

        info!("viewer ready");
        self.engine = Some(engine);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::MouseInput { state, button, .. } => {
                let button = map_mouse_button(button);
                match state {
                    ElementState::Pressed => self.input.mouse_down(button),
                    ElementState::Released => self.input.mouse_up(button),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(action) = self.input.cursor_moved(position) {
                    self.dispatch(event_loop, action);
                }
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(offset) => (offset.y / 40.0) as f32,
                };
                if let Some(action) = self.input.wheel(lines) {
                    self.dispatch(event_loop, action);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                let action = map_key(&logical_key).and_then(|key| self.input.key_pressed(key));
                if let Some(action) = action {
                    self.dispatch(event_loop, action);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Other(3),
        WinitMouseButton::Forward => MouseButton::Other(4),
        WinitMouseButton::Other(value) => MouseButton::Other(value),
    }
}

fn map_key(key: &Key) -> Option<KeyCode> {
    Some(match key {
        Key::Named(NamedKey::ArrowLeft) => KeyCode::Left,
        Key::Named(NamedKey::ArrowRight) => KeyCode::Right,
        Key::Named(NamedKey::ArrowUp) => KeyCode::Up,
        Key::Named(NamedKey::ArrowDown) => KeyCode::Down,
        Key::Named(NamedKey::Escape) => KeyCode::Escape,
        Key::Character(text) => KeyCode::Character(text.chars().next()?),
        _ => return None,
    })
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str = "Usage: prism-engine <model.obj> [--mtl <file>] [<model.obj> [--mtl <file>]]... \
[--config <file>] [--summary-only]";

/// A model path and the material file given right after it.
#[derive(Debug, PartialEq)]
struct ModelArg {
    path: PathBuf,
    materials: Option<PathBuf>,
}

#[derive(Debug)]
struct CliOptions {
    models: Vec<ModelArg>,
    config: Option<PathBuf>,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut models: Vec<ModelArg> = Vec::new();
        let mut config = None;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--mtl" => {
                    let value = args.next().ok_or_else(|| anyhow!("--mtl needs a file"))?;
                    let model = models
                        .last_mut()
                        .ok_or_else(|| anyhow!("--mtl must follow the model it belongs to"))?;
                    if model.materials.replace(PathBuf::from(value)).is_some() {
                        return Err(anyhow!(
                            "{} already has a material file",
                            model.path.display()
                        ));
                    }
                }
                "--config" => {
                    let value = args.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                    config = Some(PathBuf::from(value));
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --mtl, --config or --summary-only"
                    ));
                }
                other => models.push(ModelArg {
                    path: PathBuf::from(other),
                    materials: None,
                }),
            }
        }
        if models.is_empty() {
            return Err(anyhow!(USAGE));
        }
        Ok(Self {
            models,
            config,
            summary_only,
        })
    }
}
