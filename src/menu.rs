//! Keyboard-driven settings panel. Produces the settings snapshot the frame
//! loop diffs each frame, and reports whether it currently captures keyboard
//! input (camera movement is suppressed while it does).

use log::info;
use winit::keyboard::KeyCode;

use crate::input::InputState;
use crate::scene::{RendererOptions, SceneCatalog};
use crate::settings::Settings;

pub struct Menu {
    settings: Settings,
    wants_keyboard: bool,
}

impl Menu {
    pub fn new(settings: Settings) -> Menu {
        Menu {
            settings,
            wants_keyboard: false,
        }
    }

    /// Adopt the freshly loaded scene's renderer defaults, as the panel
    /// would show them.
    pub fn adopt_scene_defaults(&mut self, options: &RendererOptions) {
        self.settings.max_depth = options.max_depth;
        self.settings.use_env_map = options.use_env_map;
        self.settings.hdr_multiplier = options.hdr_multiplier;
        self.settings.resolution = options.resolution;
    }

    /// Apply this frame's key taps to the panel state. Digit keys select a
    /// scene; the remaining bindings edit one parameter each.
    pub fn handle_input(&mut self, input: &mut InputState, catalog: &SceneCatalog) {
        // While Ctrl is held the keyboard belongs to chords (Ctrl+S saves),
        // not to the camera.
        self.wants_keyboard = input.keys.ctrl;

        let s = &mut self.settings;
        let mut changed = false;
        for key in input.take_tapped() {
            changed = true;
            match key {
                KeyCode::Digit1
                | KeyCode::Digit2
                | KeyCode::Digit3
                | KeyCode::Digit4
                | KeyCode::Digit5
                | KeyCode::Digit6
                | KeyCode::Digit7
                | KeyCode::Digit8
                | KeyCode::Digit9 => {
                    let id = digit_index(key);
                    if id < catalog.len() {
                        s.scene_id = id;
                    }
                }
                KeyCode::KeyR => s.use_rasterizer = !s.use_rasterizer,
                KeyCode::KeyI => s.integrator = s.integrator.cycle(),
                KeyCode::KeyG => s.use_gamma_correction = !s.use_gamma_correction,
                KeyCode::KeyH => s.use_env_map = !s.use_env_map,
                KeyCode::KeyC => s.use_compute = !s.use_compute,
                KeyCode::KeyF => s.post_filter = s.post_filter.cycle(),
                KeyCode::KeyB => s.double_sided_light = !s.double_sided_light,
                KeyCode::ArrowUp => s.samples_per_pixel = (s.samples_per_pixel + 1).min(64),
                KeyCode::ArrowDown => s.samples_per_pixel = s.samples_per_pixel.max(2) - 1,
                KeyCode::ArrowRight => s.max_depth = (s.max_depth + 1).min(16),
                KeyCode::ArrowLeft => s.max_depth = s.max_depth.max(2) - 1,
                KeyCode::KeyO => s.aperture = (s.aperture - 0.01).max(0.0),
                KeyCode::KeyP => s.aperture += 0.01,
                KeyCode::KeyK => s.focal_distance = (s.focal_distance - 0.25).max(0.25),
                KeyCode::KeyL => s.focal_distance += 0.25,
                KeyCode::KeyN => s.hdr_multiplier = (s.hdr_multiplier - 0.1).max(0.0),
                KeyCode::KeyM => s.hdr_multiplier += 0.1,
                KeyCode::Comma => s.ao_ray_length = (s.ao_ray_length - 0.5).max(0.5),
                KeyCode::Period => s.ao_ray_length += 0.5,
                _ => changed = false,
            }
        }

        if changed {
            info!(
                "settings: scene={} integrator={:?} spp={} depth={} raster={} compute={:?}",
                catalog.name(s.scene_id.min(catalog.len() - 1)),
                s.integrator,
                s.samples_per_pixel,
                s.max_depth,
                s.use_rasterizer,
                s.use_compute.then_some(s.post_filter),
            );
        }
    }

    /// The snapshot for this frame. The save-image flag is only raised by
    /// `request_save`; taking a snapshot does not clear panel state.
    pub fn settings(&self) -> Settings {
        self.settings.clone()
    }

    pub fn request_save(&mut self) {
        self.settings.save_image = true;
    }

    pub fn clear_save_request(&mut self) {
        self.settings.save_image = false;
    }

    pub fn wants_capture_keyboard(&self) -> bool {
        self.wants_keyboard
    }
}

fn digit_index(key: KeyCode) -> usize {
    match key {
        KeyCode::Digit1 => 0,
        KeyCode::Digit2 => 1,
        KeyCode::Digit3 => 2,
        KeyCode::Digit4 => 3,
        KeyCode::Digit5 => 4,
        KeyCode::Digit6 => 5,
        KeyCode::Digit7 => 6,
        KeyCode::Digit8 => 7,
        KeyCode::Digit9 => 8,
        _ => unreachable!("digit_index called with a non-digit key"),
    }
}
