//! Per-frame render settings and the diff logic that decides what must be
//! rebuilt when they change.

/// Integrator variant, selecting which trace shader module is compiled into
/// the ray-tracing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrator {
    PathTracer,
    AmbientOcclusion,
}

impl Integrator {
    pub fn cycle(self) -> Self {
        match self {
            Integrator::PathTracer => Integrator::AmbientOcclusion,
            Integrator::AmbientOcclusion => Integrator::PathTracer,
        }
    }
}

/// Post-process compute filter selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostFilter {
    Sharpen,
    EdgeDetect,
    Blur,
}

impl PostFilter {
    pub fn cycle(self) -> Self {
        match self {
            PostFilter::Sharpen => PostFilter::EdgeDetect,
            PostFilter::EdgeDetect => PostFilter::Blur,
            PostFilter::Blur => PostFilter::Sharpen,
        }
    }

    pub fn shader_id(self) -> u32 {
        match self {
            PostFilter::Sharpen => 0,
            PostFilter::EdgeDetect => 1,
            PostFilter::Blur => 2,
        }
    }
}

/// Snapshot of every user-controllable render parameter for one frame.
///
/// A snapshot is produced once per frame by the menu, diffed against the
/// previously committed snapshot to decide rebuild side effects, then
/// committed as the baseline for the next frame. It is never mutated in
/// place after commit (the save-image flag is cleared by committing a copy).
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub scene_id: usize,
    pub integrator: Integrator,
    pub samples_per_pixel: u32,
    pub max_depth: u32,
    pub aperture: f32,
    pub focal_distance: f32,
    pub use_env_map: bool,
    pub hdr_multiplier: f32,
    pub ao_ray_length: f32,
    pub double_sided_light: bool,
    pub use_gamma_correction: bool,
    pub use_rasterizer: bool,
    pub use_compute: bool,
    pub post_filter: PostFilter,
    pub save_image: bool,
    pub image_name: String,
    pub resolution: [u32; 2],
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            scene_id: 0,
            integrator: Integrator::PathTracer,
            samples_per_pixel: 1,
            max_depth: 4,
            aperture: 0.0,
            focal_distance: 1.0,
            use_env_map: false,
            hdr_multiplier: 1.0,
            ao_ray_length: 2.0,
            double_sided_light: false,
            use_gamma_correction: true,
            use_rasterizer: false,
            use_compute: false,
            post_filter: PostFilter::Sharpen,
            save_image: false,
            image_name: "image.ppm".to_owned(),
            resolution: [800, 600],
        }
    }
}

impl Settings {
    /// Fields that feed shader preprocessing: changing any of them requires
    /// relinking the trace pipeline (and, implied, an accumulation reset).
    pub fn requires_shader_recompilation(&self, other: &Settings) -> bool {
        self.integrator != other.integrator
            || self.use_gamma_correction != other.use_gamma_correction
            || self.use_env_map != other.use_env_map
    }

    /// Fields that change the rendering equation without changing shader
    /// structure: the accumulated estimate becomes stale but pipelines stay.
    pub fn requires_accumulation_reset(&self, other: &Settings) -> bool {
        self.requires_shader_recompilation(other)
            || self.samples_per_pixel != other.samples_per_pixel
            || self.max_depth != other.max_depth
            || self.aperture != other.aperture
            || self.focal_distance != other.focal_distance
            || self.hdr_multiplier != other.hdr_multiplier
            || self.ao_ray_length != other.ao_ray_length
            || self.double_sided_light != other.double_sided_light
    }
}

/// The single action the frame loop takes for a given settings diff.
///
/// Exactly one variant applies per frame, in this priority order; the
/// higher-priority actions subsume the side effects of the lower ones
/// (a scene reload recompiles pipelines and resets accumulation, a
/// recompilation resets accumulation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildAction {
    ReloadScene,
    RecompilePipelines,
    ResetAccumulation,
    Keep,
}

impl RebuildAction {
    pub fn classify(committed: &Settings, candidate: &Settings) -> RebuildAction {
        if committed.scene_id != candidate.scene_id {
            RebuildAction::ReloadScene
        } else if committed.requires_shader_recompilation(candidate) {
            RebuildAction::RecompilePipelines
        } else if committed.requires_accumulation_reset(candidate) {
            RebuildAction::ResetAccumulation
        } else {
            RebuildAction::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_settings_keep_everything() {
        let s = Settings::default();
        assert_eq!(RebuildAction::classify(&s, &s.clone()), RebuildAction::Keep);
    }

    #[test]
    fn scene_change_takes_priority_over_everything() {
        let committed = Settings::default();
        let mut candidate = committed.clone();
        candidate.scene_id = 7;
        candidate.integrator = Integrator::AmbientOcclusion;
        candidate.samples_per_pixel = 16;
        assert_eq!(
            RebuildAction::classify(&committed, &candidate),
            RebuildAction::ReloadScene
        );
    }

    #[test]
    fn integrator_gamma_and_env_map_require_recompilation() {
        let committed = Settings::default();
        let edits: &[fn(&mut Settings)] = &[
            |s| s.integrator = s.integrator.cycle(),
            |s| s.use_gamma_correction = !s.use_gamma_correction,
            |s| s.use_env_map = !s.use_env_map,
        ];
        for edit in edits {
            let mut candidate = committed.clone();
            edit(&mut candidate);
            assert_eq!(
                RebuildAction::classify(&committed, &candidate),
                RebuildAction::RecompilePipelines
            );
        }
    }

    #[test]
    fn equation_parameters_only_reset_accumulation() {
        let committed = Settings::default();
        let edits: &[fn(&mut Settings)] = &[
            |s| s.samples_per_pixel += 1,
            |s| s.max_depth += 1,
            |s| s.aperture = 0.1,
            |s| s.focal_distance = 3.0,
            |s| s.hdr_multiplier = 0.5,
            |s| s.ao_ray_length = 5.0,
            |s| s.double_sided_light = true,
        ];
        for edit in edits {
            let mut candidate = committed.clone();
            edit(&mut candidate);
            assert_eq!(
                RebuildAction::classify(&committed, &candidate),
                RebuildAction::ResetAccumulation,
            );
            assert!(!committed.requires_shader_recompilation(&candidate));
        }
    }

    #[test]
    fn presentation_toggles_trigger_nothing() {
        let committed = Settings::default();
        let edits: &[fn(&mut Settings)] = &[
            |s| s.use_rasterizer = true,
            |s| s.use_compute = true,
            |s| s.post_filter = s.post_filter.cycle(),
            |s| s.save_image = true,
            |s| s.image_name = "other.ppm".to_owned(),
        ];
        for edit in edits {
            let mut candidate = committed.clone();
            edit(&mut candidate);
            assert_eq!(
                RebuildAction::classify(&committed, &candidate),
                RebuildAction::Keep
            );
        }
    }
}
