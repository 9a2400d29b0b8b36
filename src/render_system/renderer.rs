//! The per-frame driver.
//!
//! Owns every rebuildable GPU object and decides, from the settings diff,
//! what must be torn down and recreated this frame: a scene change rebuilds
//! the world (swapchain-dependent set, geometry, acceleration structures,
//! pipelines), a shader-affecting change relinks the trace pipeline, a
//! rendering-equation change only invalidates the accumulation. Exactly one
//! of those actions runs per frame, and every destruction is preceded by a
//! device idle wait so no in-flight command buffer can reference freed
//! resources.

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};
use rand::RngCore;
use vulkano::{
    command_buffer::{
        AutoCommandBufferBuilder, CommandBufferUsage, CopyBufferToImageInfo, CopyImageInfo,
        CopyImageToBufferInfo, PrimaryAutoCommandBuffer, RenderingAttachmentInfo, RenderingInfo,
    },
    descriptor_set::WriteDescriptorSet,
    pipeline::{ComputePipeline, Pipeline, PipelineBindPoint},
    render_pass::{AttachmentLoadOp, AttachmentStoreOp},
    swapchain::{self, SwapchainPresentInfo},
    sync::{self, GpuFuture},
    Validated, VulkanError,
};
use winit::{dpi::PhysicalSize, window::Window};

use super::{
    acceleration::{self, SceneAccelerations},
    accumulation::Accumulation,
    capture,
    context::RenderContext,
    pipeline::{self, ShaderDefines},
    scene_gpu::{self, SceneGeometry},
    shader::{path_trace, raster},
    swapchain::{surface_extent, SurfaceResources},
    vertex::GlobalUniforms,
};
use crate::{
    camera::Camera,
    error::Result,
    input::InputState,
    menu::Menu,
    scene::{Scene, SceneCatalog},
    settings::{RebuildAction, Settings},
};

/// Which path draws this frame. Decided once per frame from the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderMode {
    Rasterize,
    RayTrace,
}

pub struct Renderer {
    ctx: RenderContext,
    window: Arc<Window>,
    catalog: SceneCatalog,
    menu: Menu,
    /// Snapshot committed at the end of the previous frame's diff.
    settings: Settings,
    scene: Scene,
    camera: Camera,
    geometry: SceneGeometry,
    accelerations: SceneAccelerations,
    trace_pipeline: Arc<ComputePipeline>,
    resources: Option<SurfaceResources>,
    accumulation: Accumulation,
    previous_frame_end: Option<Box<dyn GpuFuture>>,
    swapchain_dirty: bool,
    rng: rand::rngs::ThreadRng,
}

impl Renderer {
    pub fn new(
        ctx: RenderContext,
        window: Arc<Window>,
        catalog: SceneCatalog,
        initial_scene: usize,
    ) -> Result<Renderer> {
        let scene = Scene::load(catalog.manifest_path(initial_scene))?;

        let mut settings = Settings {
            scene_id: initial_scene,
            ..Settings::default()
        };
        adopt_scene_defaults(&mut settings, &scene);
        let mut menu = Menu::new(settings.clone());
        menu.adopt_scene_defaults(&scene.options);

        resize_window(&window, scene.options.resolution);

        let camera = camera_for(&scene);
        let geometry = scene_gpu::upload_scene(&ctx, &scene);
        let accelerations = acceleration::build_scene_accelerations(&ctx, &geometry, &scene);
        let trace_pipeline = pipeline::trace_pipeline(
            ctx.device.clone(),
            settings.integrator,
            defines_for(&settings, &scene),
        );
        let resources = Some(SurfaceResources::create(&ctx));
        let previous_frame_end = Some(sync::now(ctx.device.clone()).boxed());

        info!(
            "loaded scene {:?}: {} meshes, {} instances, {} lights",
            scene.name,
            scene.meshes.len(),
            scene.instances.len(),
            scene.lights.len()
        );

        Ok(Renderer {
            ctx,
            window,
            catalog,
            menu,
            settings,
            scene,
            camera,
            geometry,
            accelerations,
            trace_pipeline,
            resources,
            accumulation: Accumulation::new(),
            previous_frame_end,
            swapchain_dirty: false,
            rng: rand::thread_rng(),
        })
    }

    pub fn scene_name(&self) -> &str {
        &self.scene.name
    }

    pub fn mark_swapchain_dirty(&mut self) {
        self.swapchain_dirty = true;
    }

    pub fn wait_idle(&self) {
        self.ctx.wait_idle();
    }

    /// Diff the menu's snapshot against the committed one and run the single
    /// highest-priority rebuild action it implies, then commit.
    pub fn update_settings(&mut self, input: &mut InputState, dt: f32) -> Result<()> {
        self.menu.handle_input(input, &self.catalog);
        // the save hotkey is folded into the snapshot before the diff
        if input.take_save_request() {
            self.menu.request_save();
        }
        // camera input is gated on the menu not owning the keyboard
        if !self.menu.wants_capture_keyboard() {
            self.camera.integrate_input(input, dt);
        }

        let candidate = self.menu.settings();
        match RebuildAction::classify(&self.settings, &candidate) {
            RebuildAction::ReloadScene => return self.reload_scene(candidate),
            RebuildAction::RecompilePipelines => self.recompile_pipelines(&candidate),
            RebuildAction::ResetAccumulation => self.accumulation.reset(),
            RebuildAction::Keep => {}
        }
        self.settings = candidate;
        Ok(())
    }

    /// Relink the trace pipeline for new preprocessor flags. Does not touch
    /// the swapchain-dependent set or the acceleration structures.
    fn recompile_pipelines(&mut self, candidate: &Settings) {
        self.ctx.wait_idle();
        self.trace_pipeline = pipeline::trace_pipeline(
            self.ctx.device.clone(),
            candidate.integrator,
            defines_for(candidate, &self.scene),
        );
        self.accumulation.reset();
        info!("relinked trace pipeline: {:?}", candidate.integrator);
    }

    /// Full teardown/rebuild for a scene switch. Validation runs before the
    /// first destructive step; an invalid candidate abandons the switch with
    /// every resource untouched (committing the candidate id keeps the diff
    /// from re-firing until the selection changes again).
    fn reload_scene(&mut self, candidate: Settings) -> Result<()> {
        if !self.catalog.is_valid(candidate.scene_id) {
            debug!(
                "scene switch abandoned: no backing data for id {}",
                candidate.scene_id
            );
            self.settings = candidate;
            return Ok(());
        }

        self.ctx.wait_idle();
        self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());
        self.resources = None;

        let scene = Scene::load(self.catalog.manifest_path(candidate.scene_id))?;
        resize_window(&self.window, scene.options.resolution);

        let mut committed = candidate;
        adopt_scene_defaults(&mut committed, &scene);
        self.menu.adopt_scene_defaults(&scene.options);

        self.trace_pipeline = pipeline::trace_pipeline(
            self.ctx.device.clone(),
            committed.integrator,
            defines_for(&committed, &scene),
        );
        self.camera = camera_for(&scene);
        self.geometry = scene_gpu::upload_scene(&self.ctx, &scene);
        self.accelerations =
            acceleration::build_scene_accelerations(&self.ctx, &self.geometry, &scene);
        self.scene = scene;
        self.resources = Some(SurfaceResources::create(&self.ctx));
        self.accumulation.reset();
        self.settings = committed;

        info!("switched to scene {:?}", self.scene.name);
        Ok(())
    }

    pub fn render_frame(&mut self) {
        self.previous_frame_end
            .as_mut()
            .unwrap()
            .cleanup_finished();

        // swapchain-dependent resources follow the surface; the destroy half
        // of the pair requires the device to be idle first
        if self.swapchain_dirty {
            self.ctx.wait_idle();
            self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());
            self.resources = None;
            self.resources = Some(SurfaceResources::create(&self.ctx));
            self.accumulation.reset();
            self.swapchain_dirty = false;
            debug!("rebuilt swapchain-dependent resources");
        }

        // minimized windows report a zero extent; skip the frame entirely
        let win_extent = surface_extent(&self.ctx);
        if win_extent[0] == 0 || win_extent[1] == 0 {
            return;
        }

        if self.camera.on_before_render() {
            self.accumulation.reset();
        }

        let resources = self.resources.as_ref().expect("surface resources missing");

        let (image_index, suboptimal, acquire_future) =
            match swapchain::acquire_next_image(resources.swapchain.clone(), None)
                .map_err(Validated::unwrap)
            {
                Ok(r) => r,
                Err(VulkanError::OutOfDate) => {
                    debug!("swapchain out of date (at acquire)");
                    self.swapchain_dirty = true;
                    return;
                }
                Err(e) => panic!("failed to acquire next image: {e:?}"),
            };
        if suboptimal {
            self.swapchain_dirty = true;
        }

        let extent = resources.extent;
        let uniforms = global_uniforms(
            &self.scene,
            &self.camera,
            &self.settings,
            &self.accumulation,
            extent,
        );
        *resources.uniform_buffers[image_index as usize]
            .write()
            .expect("uniform buffer still in flight") = uniforms;

        let mut builder = AutoCommandBufferBuilder::primary(
            &self.ctx.command_buffer_allocator,
            self.ctx.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .expect("failed to begin frame command buffer");

        let mode = if self.settings.use_rasterizer {
            RenderMode::Rasterize
        } else {
            RenderMode::RayTrace
        };
        match mode {
            RenderMode::Rasterize => record_raster_path(
                &mut builder,
                resources,
                &self.geometry,
                &self.scene,
                image_index as usize,
            ),
            RenderMode::RayTrace => record_trace_path(
                &mut builder,
                resources,
                &self.geometry,
                &self.accelerations,
                &self.trace_pipeline,
                image_index as usize,
                self.rng.next_u32(),
            ),
        }

        // composite into the presentation image and keep a copy for the
        // post-process input
        builder
            .copy_image(CopyImageInfo::images(
                resources.render_target.clone(),
                resources.images[image_index as usize].clone(),
            ))
            .unwrap()
            .copy_image_to_buffer(CopyImageToBufferInfo::image_buffer(
                resources.render_target.clone(),
                resources.history.clone(),
            ))
            .unwrap();

        // the post-process pass filters the previous frame's resolved output
        // (a deliberate one-frame lag); its submission is waited on the
        // compute queue before the copy below is recorded
        if self.settings.use_compute {
            let command = resources
                .computer
                .build_command(&self.ctx, self.settings.post_filter);
            self.previous_frame_end
                .take()
                .unwrap()
                .then_execute(self.ctx.compute_queue.clone(), command)
                .expect("failed to submit postprocess")
                .then_signal_fence_and_flush()
                .expect("failed to flush postprocess")
                .wait(None)
                .expect("postprocess did not complete");
            self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());

            builder
                .copy_buffer_to_image(CopyBufferToImageInfo::buffer_image(
                    resources.computer.output(),
                    resources.images[image_index as usize].clone(),
                ))
                .unwrap();
        }

        // capture before this frame is submitted: the presentation image for
        // this index still holds the last frame it displayed
        if self.settings.save_image {
            let before = self.previous_frame_end.take().unwrap();
            let captured = capture::capture_frame(
                &self.ctx,
                resources.images[image_index as usize].clone(),
                before,
                Path::new(&self.settings.image_name),
            );
            self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());
            if let Err(e) = captured {
                error!("image capture failed: {e}");
            }
            self.settings.save_image = false;
            self.menu.clear_save_request();
        }

        let command_buffer = builder.build().expect("failed to build frame command buffer");
        let future = self
            .previous_frame_end
            .take()
            .unwrap()
            .join(acquire_future)
            .then_execute(self.ctx.queue.clone(), command_buffer)
            .unwrap()
            .then_swapchain_present(
                self.ctx.queue.clone(),
                SwapchainPresentInfo::swapchain_image_index(
                    resources.swapchain.clone(),
                    image_index,
                ),
            )
            .then_signal_fence_and_flush();

        match future.map_err(Validated::unwrap) {
            Ok(future) => {
                self.previous_frame_end = Some(future.boxed());
            }
            Err(VulkanError::OutOfDate) => {
                debug!("swapchain out of date (at flush)");
                self.swapchain_dirty = true;
                self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());
            }
            Err(e) => {
                error!("failed to flush frame: {e}");
                self.previous_frame_end = Some(sync::now(self.ctx.device.clone()).boxed());
            }
        }

        self.accumulation.advance();
    }
}

fn record_trace_path(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    resources: &SurfaceResources,
    geometry: &SceneGeometry,
    accelerations: &SceneAccelerations,
    trace_pipeline: &Arc<ComputePipeline>,
    image_index: usize,
    seed: u32,
) {
    let extent = resources.extent;
    let resolve = resources.resolve_targets[image_index].clone();

    builder
        .bind_pipeline_compute(trace_pipeline.clone())
        .unwrap()
        .push_descriptor_set(
            PipelineBindPoint::Compute,
            trace_pipeline.layout().clone(),
            0,
            vec![
                WriteDescriptorSet::acceleration_structure(0, accelerations.top_level.clone()),
                WriteDescriptorSet::buffer(1, geometry.vertices.clone()),
                WriteDescriptorSet::buffer(2, geometry.indices.clone()),
                WriteDescriptorSet::buffer(3, geometry.instances.clone()),
                WriteDescriptorSet::buffer(4, geometry.lights.clone()),
                WriteDescriptorSet::buffer(5, resources.uniform_buffers[image_index].clone()),
                WriteDescriptorSet::image_view(6, resources.accumulation_view.clone()),
                WriteDescriptorSet::buffer(7, resolve.clone()),
                WriteDescriptorSet::image_view_sampler(
                    8,
                    geometry.environment.clone(),
                    geometry.environment_sampler.clone(),
                ),
            ]
            .into(),
        )
        .unwrap()
        .push_constants(
            trace_pipeline.layout().clone(),
            0,
            path_trace::PushConstants {
                invocation_seed: seed,
                xsize: extent[0],
                ysize: extent[1],
            },
        )
        .unwrap()
        .dispatch([extent[0].div_ceil(32), extent[1].div_ceil(32), 1])
        .unwrap()
        .copy_buffer_to_image(CopyBufferToImageInfo::buffer_image(
            resolve,
            resources.render_target.clone(),
        ))
        .unwrap();
}

fn record_raster_path(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    resources: &SurfaceResources,
    geometry: &SceneGeometry,
    scene: &Scene,
    image_index: usize,
) {
    let layout = resources.raster_pipeline.layout().clone();

    builder
        .begin_rendering(RenderingInfo {
            color_attachments: vec![Some(RenderingAttachmentInfo {
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::Store,
                clear_value: Some([0.02, 0.02, 0.05, 1.0].into()),
                ..RenderingAttachmentInfo::image_view(resources.render_target_view.clone())
            })],
            depth_attachment: Some(RenderingAttachmentInfo {
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::DontCare,
                clear_value: Some(1.0f32.into()),
                ..RenderingAttachmentInfo::image_view(resources.depth_view.clone())
            }),
            ..Default::default()
        })
        .unwrap()
        .bind_pipeline_graphics(resources.raster_pipeline.clone())
        .unwrap()
        .push_descriptor_set(
            PipelineBindPoint::Graphics,
            layout.clone(),
            0,
            vec![WriteDescriptorSet::buffer(
                0,
                resources.uniform_buffers[image_index].clone(),
            )]
            .into(),
        )
        .unwrap()
        .bind_vertex_buffers(0, geometry.vertices.clone())
        .unwrap()
        .bind_index_buffer(geometry.indices.clone())
        .unwrap();

    for instance in &scene.instances {
        let range = geometry.mesh_ranges[instance.mesh];
        builder
            .push_constants(
                layout.clone(),
                0,
                raster::vs::Push {
                    model: instance.transform,
                    albedo: instance.albedo.into(),
                    emission: instance.emission.into(),
                },
            )
            .unwrap()
            .draw_indexed(range.index_count, 1, range.first_index, range.vertex_offset as i32, 0)
            .unwrap();
    }

    builder.end_rendering().unwrap();
}

fn global_uniforms(
    scene: &Scene,
    camera: &Camera,
    settings: &Settings,
    accumulation: &Accumulation,
    extent: [u32; 2],
) -> GlobalUniforms {
    let aspect = extent[0] as f32 / extent[1] as f32;
    let view = camera.view();
    let projection = camera.projection(aspect);
    let use_hdr = scene.use_hdr() && settings.use_env_map;

    GlobalUniforms {
        view: view.into(),
        projection: projection.into(),
        view_inv: view.try_inverse().unwrap_or_else(nalgebra::Matrix4::identity).into(),
        proj_inv: projection
            .try_inverse()
            .unwrap_or_else(nalgebra::Matrix4::identity)
            .into(),
        camera_pos: camera.position().coords.into(),
        lights: scene.light_count(),
        ssp: settings.samples_per_pixel,
        max_depth: settings.max_depth,
        aperture: settings.aperture,
        focal_distance: settings.focal_distance,
        hdr_multiplier: if use_hdr { settings.hdr_multiplier } else { 0.0 },
        hdr_resolution: if use_hdr { scene.hdr_resolution() } else { 0.0 },
        frame: accumulation.frame(),
        ao_ray_length: settings.ao_ray_length,
        double_sided: settings.double_sided_light as u32,
        _pad: 0,
    }
}

fn defines_for(settings: &Settings, scene: &Scene) -> ShaderDefines {
    ShaderDefines {
        use_hdr: scene.use_hdr() && settings.use_env_map,
        use_gamma_correction: settings.use_gamma_correction,
    }
}

fn adopt_scene_defaults(settings: &mut Settings, scene: &Scene) {
    settings.max_depth = scene.options.max_depth;
    settings.use_env_map = scene.options.use_env_map;
    settings.hdr_multiplier = scene.options.hdr_multiplier;
    settings.resolution = scene.options.resolution;
}

fn camera_for(scene: &Scene) -> Camera {
    Camera::new(scene.camera.eye, scene.camera.look_at, scene.camera.fov)
}

fn resize_window(window: &Window, resolution: [u32; 2]) {
    let _ = window.request_inner_size(PhysicalSize::new(resolution[0], resolution[1]));
}
