use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info};
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

use lumina::input::InputState;
use lumina::render_system::context::RenderContext;
use lumina::render_system::renderer::Renderer;
use lumina::scene::SceneCatalog;
use lumina::timing::FrameTimer;

#[derive(Parser)]
#[command(about = "Interactive hardware ray-traced scene viewer")]
struct Cli {
    /// Scene assets root containing *.json manifests.
    #[arg(default_value = "assets/scenes")]
    assets: PathBuf,

    /// Initial scene name; defaults to the first catalog entry.
    #[arg(short, long)]
    scene: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // a missing assets root is the one fatal-at-startup condition
    let catalog = match SceneCatalog::discover(&cli.assets) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let initial_scene = match &cli.scene {
        Some(name) => match catalog.index_of(name) {
            Some(id) => id,
            None => {
                error!("scene {name:?} is not in the catalog");
                std::process::exit(1);
            }
        },
        None => 0,
    };

    let event_loop = EventLoop::new().expect("failed to create event loop");
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("lumina")
            .with_inner_size(PhysicalSize::new(1280, 720))
            .build(&event_loop)
            .expect("failed to create window"),
    );

    let ctx = RenderContext::new(&event_loop, window.clone());
    ctx.log_gpu_info();

    let mut renderer = match Renderer::new(ctx, window, catalog, initial_scene) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let mut input = InputState::default();
    let mut timer = FrameTimer::new();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, .. } => {
                    match &event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(_) => renderer.mark_swapchain_dirty(),
                        _ => {}
                    }
                    input.on_window_event(&event);
                }
                Event::DeviceEvent { event, .. } => input.on_device_event(&event),
                Event::AboutToWait => {
                    let dt = timer.tick();
                    if let Err(e) = renderer.update_settings(&mut input, dt) {
                        error!("{e}");
                        elwt.exit();
                        return;
                    }

                    let draw_start = Instant::now();
                    renderer.render_frame();
                    if let Some(average) = timer.record(draw_start.elapsed()) {
                        info!(
                            "scene {} avg{{100}} = {average:.2} ms",
                            renderer.scene_name()
                        );
                    }
                }
                Event::LoopExiting => renderer.wait_idle(),
                _ => {}
            }
        })
        .expect("event loop failed");
}
