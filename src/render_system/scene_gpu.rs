//! GPU residency for a loaded scene: concatenated vertex/index buffers with
//! per-mesh ranges, per-instance shading data, lights and the environment
//! map. Rebuilt as a unit whenever the scene is replaced.

use std::sync::Arc;

use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{
        AutoCommandBufferBuilder, CommandBufferUsage, CopyBufferToImageInfo,
        PrimaryCommandBufferAbstract,
    },
    format::Format,
    image::{
        sampler::{Sampler, SamplerCreateInfo},
        view::ImageView,
        Image, ImageCreateInfo, ImageType, ImageUsage,
    },
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
    sync::GpuFuture,
};

use super::context::RenderContext;
use super::vertex::{InstanceData, LightData, MeshVertex};
use crate::scene::Scene;

/// Where one mesh lives inside the shared vertex/index buffers.
#[derive(Clone, Copy, Debug)]
pub struct MeshRange {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
}

pub struct SceneGeometry {
    pub vertices: Subbuffer<[MeshVertex]>,
    pub indices: Subbuffer<[u32]>,
    pub instances: Subbuffer<[InstanceData]>,
    pub lights: Subbuffer<[LightData]>,
    pub mesh_ranges: Vec<MeshRange>,
    pub environment: Arc<ImageView>,
    pub environment_sampler: Arc<Sampler>,
}

pub fn upload_scene(ctx: &RenderContext, scene: &Scene) -> SceneGeometry {
    let mut mesh_ranges = Vec::with_capacity(scene.meshes.len());
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for mesh in &scene.meshes {
        mesh_ranges.push(MeshRange {
            first_index: indices.len() as u32,
            index_count: mesh.indices.len() as u32,
            vertex_offset: vertices.len() as u32,
            vertex_count: mesh.vertices.len() as u32,
        });
        vertices.extend_from_slice(&mesh.vertices);
        indices.extend_from_slice(&mesh.indices);
    }

    let geometry_usage = BufferUsage::STORAGE_BUFFER
        | BufferUsage::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY
        | BufferUsage::SHADER_DEVICE_ADDRESS;

    let vertex_buffer = device_local_buffer(
        ctx,
        geometry_usage | BufferUsage::VERTEX_BUFFER,
        vertices,
    );
    let index_buffer = device_local_buffer(
        ctx,
        geometry_usage | BufferUsage::INDEX_BUFFER,
        indices,
    );

    let instance_data = scene
        .instances
        .iter()
        .map(|instance| {
            let range = mesh_ranges[instance.mesh];
            InstanceData {
                transform: instance.transform.into(),
                albedo: instance.albedo,
                first_index: range.first_index,
                emission: instance.emission,
                vertex_offset: range.vertex_offset,
            }
        })
        .collect::<Vec<_>>();
    let instance_buffer = device_local_buffer(ctx, BufferUsage::STORAGE_BUFFER, instance_data);

    // the binding must not be empty even for scenes without analytic lights;
    // the shader only reads `lights` entries
    let mut light_data = scene
        .lights
        .iter()
        .map(|light| LightData {
            position: light.position,
            radius: light.radius,
            emission: light.emission,
            _pad: 0.0,
        })
        .collect::<Vec<_>>();
    if light_data.is_empty() {
        light_data.push(LightData {
            position: [0.0; 3],
            radius: 0.0,
            emission: [0.0; 3],
            _pad: 0.0,
        });
    }
    let light_buffer = device_local_buffer(ctx, BufferUsage::STORAGE_BUFFER, light_data);

    let environment = upload_environment(ctx, scene);
    let environment_sampler = Sampler::new(
        ctx.device.clone(),
        SamplerCreateInfo::simple_repeat_linear(),
    )
    .expect("failed to create environment sampler");

    SceneGeometry {
        vertices: vertex_buffer,
        indices: index_buffer,
        instances: instance_buffer,
        lights: light_buffer,
        mesh_ranges,
        environment,
        environment_sampler,
    }
}

fn device_local_buffer<T: vulkano::buffer::BufferContents>(
    ctx: &RenderContext,
    usage: BufferUsage,
    data: Vec<T>,
) -> Subbuffer<[T]> {
    Buffer::from_iter(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
            ..Default::default()
        },
        data,
    )
    .expect("failed to allocate scene buffer")
}

/// Upload the scene's HDR environment, or a 1x1 black fallback so the
/// sampler binding always has an image behind it.
fn upload_environment(ctx: &RenderContext, scene: &Scene) -> Arc<ImageView> {
    let (extent, pixels): ([u32; 3], Vec<f32>) = match &scene.environment {
        Some(env) => ([env.width, env.height, 1], env.pixels.clone()),
        None => ([1, 1, 1], vec![0.0, 0.0, 0.0, 1.0]),
    };

    let upload_buffer = Buffer::from_iter(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage: BufferUsage::TRANSFER_SRC,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_HOST
                | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
            ..Default::default()
        },
        pixels,
    )
    .expect("failed to allocate environment staging buffer");

    let image = Image::new(
        ctx.memory_allocator.clone(),
        ImageCreateInfo {
            image_type: ImageType::Dim2d,
            format: Format::R32G32B32A32_SFLOAT,
            extent,
            usage: ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED,
            ..Default::default()
        },
        AllocationCreateInfo::default(),
    )
    .expect("failed to create environment image");

    let mut builder = AutoCommandBufferBuilder::primary(
        &ctx.command_buffer_allocator,
        ctx.queue.queue_family_index(),
        CommandBufferUsage::OneTimeSubmit,
    )
    .expect("failed to begin environment upload");
    builder
        .copy_buffer_to_image(CopyBufferToImageInfo::buffer_image(
            upload_buffer,
            image.clone(),
        ))
        .expect("failed to record environment upload");

    let future = builder
        .build()
        .expect("failed to build environment upload")
        .execute(ctx.queue.clone())
        .expect("failed to submit environment upload");
    future
        .then_signal_fence_and_flush()
        .expect("failed to flush environment upload")
        .wait(None)
        .expect("environment upload did not complete");

    ImageView::new_default(image).expect("failed to create environment view")
}
