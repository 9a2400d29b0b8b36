//! Two-level acceleration structure builder.
//!
//! One bottom-level structure per mesh, built from slices of the shared
//! vertex/index buffers, plus a top-level structure over the scene's
//! instances. All structures live in one backing buffer sized to the sum of
//! the device-reported sizes, each offset rounded up to the required
//! alignment; scratch space is suballocated the same way. There is no
//! update-in-place path: a changed scene rebuilds both levels.

use std::sync::Arc;

use smallvec::smallvec;
use vulkano::{
    acceleration_structure::{
        AccelerationStructure, AccelerationStructureBuildGeometryInfo,
        AccelerationStructureBuildRangeInfo, AccelerationStructureBuildType,
        AccelerationStructureCreateInfo, AccelerationStructureGeometries,
        AccelerationStructureGeometryInstancesData, AccelerationStructureGeometryInstancesDataType,
        AccelerationStructureGeometryTrianglesData, AccelerationStructureInstance,
        AccelerationStructureType, BuildAccelerationStructureFlags, BuildAccelerationStructureMode,
        GeometryFlags,
    },
    buffer::{Buffer, BufferCreateInfo, BufferUsage, IndexBuffer, Subbuffer},
    command_buffer::{
        AutoCommandBufferBuilder, CommandBufferUsage, PrimaryAutoCommandBuffer,
        PrimaryCommandBufferAbstract,
    },
    format::Format,
    memory::{
        allocator::{AllocationCreateInfo, DeviceLayout, MemoryTypeFilter},
        DeviceAlignment,
    },
    DeviceSize, NonZeroDeviceSize, Packed24_8,
};

use super::context::RenderContext;
use super::scene_gpu::SceneGeometry;
use super::vertex::MeshVertex;
use crate::scene::Scene;

/// Required offset alignment for acceleration structures inside a backing
/// buffer, fixed by the Vulkan specification.
const STRUCTURE_ALIGNMENT: DeviceSize = 256;

/// Both levels for the loaded scene. Owned exclusively by the renderer and
/// replaced as a unit on scene change; the bottom-level set is never rebuilt
/// on its own.
pub struct SceneAccelerations {
    pub bottom_level: Vec<Arc<AccelerationStructure>>,
    pub top_level: Arc<AccelerationStructure>,
}

/// Device-reported sizes for one structure.
#[derive(Clone, Copy, Debug)]
pub struct BuildSizes {
    pub structure: DeviceSize,
    pub scratch: DeviceSize,
}

/// Offsets of every structure inside the shared backing/scratch buffers.
#[derive(Debug)]
pub struct SharedLayout {
    pub structure_offsets: Vec<DeviceSize>,
    pub scratch_offsets: Vec<DeviceSize>,
    pub structure_total: DeviceSize,
    pub scratch_total: DeviceSize,
}

fn round_up(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    value.div_ceil(alignment) * alignment
}

/// Accumulate per-structure sizes into one shared allocation, rounding every
/// offset up to the required alignment.
pub fn plan_shared_layout(
    sizes: &[BuildSizes],
    structure_alignment: DeviceSize,
    scratch_alignment: DeviceSize,
) -> SharedLayout {
    let mut structure_offsets = Vec::with_capacity(sizes.len());
    let mut scratch_offsets = Vec::with_capacity(sizes.len());
    let mut structure_total = 0;
    let mut scratch_total = 0;
    for size in sizes {
        structure_offsets.push(structure_total);
        scratch_offsets.push(scratch_total);
        structure_total = round_up(structure_total + size.structure, structure_alignment);
        scratch_total = round_up(scratch_total + size.scratch, scratch_alignment);
    }
    SharedLayout {
        structure_offsets,
        scratch_offsets,
        structure_total,
        scratch_total,
    }
}

pub fn build_scene_accelerations(
    ctx: &RenderContext,
    geometry: &SceneGeometry,
    scene: &Scene,
) -> SceneAccelerations {
    let scratch_alignment = DeviceSize::from(
        ctx.device
            .physical_device()
            .properties()
            .min_acceleration_structure_scratch_offset_alignment
            .expect("device reports no scratch offset alignment"),
    );

    // one triangles geometry per mesh, over slices of the shared buffers
    let triangle_geometries = geometry
        .mesh_ranges
        .iter()
        .map(|range| {
            let vertex_slice = geometry.vertices.clone().slice(
                DeviceSize::from(range.vertex_offset)
                    ..DeviceSize::from(range.vertex_offset + range.vertex_count),
            );
            let index_slice = geometry.indices.clone().slice(
                DeviceSize::from(range.first_index)
                    ..DeviceSize::from(range.first_index + range.index_count),
            );
            AccelerationStructureGeometryTrianglesData {
                flags: GeometryFlags::OPAQUE,
                vertex_data: Some(vertex_slice.into_bytes()),
                vertex_stride: std::mem::size_of::<MeshVertex>() as u32,
                max_vertex: range.vertex_count,
                index_data: Some(IndexBuffer::U32(index_slice)),
                transform_data: None,
                ..AccelerationStructureGeometryTrianglesData::new(Format::R32G32B32_SFLOAT)
            }
        })
        .collect::<Vec<_>>();

    let blas_primitive_counts = geometry
        .mesh_ranges
        .iter()
        .map(|range| range.index_count / 3)
        .collect::<Vec<_>>();

    // device-reported sizes for every structure, the top level last; the
    // size query ignores the instance addresses, which do not exist yet
    let mut sizes = triangle_geometries
        .iter()
        .zip(&blas_primitive_counts)
        .map(|(triangles, &primitive_count)| {
            query_build_sizes(
                ctx,
                &blas_build_info(triangles.clone()),
                primitive_count,
            )
        })
        .collect::<Vec<_>>();

    let instance_count = scene.instances.len() as u32;
    let placeholder_instances = instance_buffer(
        ctx,
        (0..scene.instances.len())
            .map(|_| unresolved_instance())
            .collect(),
    );
    sizes.push(query_build_sizes(
        ctx,
        &tlas_build_info(placeholder_instances),
        instance_count,
    ));

    let layout = plan_shared_layout(&sizes, STRUCTURE_ALIGNMENT, scratch_alignment);

    let backing = aligned_byte_buffer(
        ctx,
        BufferUsage::ACCELERATION_STRUCTURE_STORAGE | BufferUsage::SHADER_DEVICE_ADDRESS,
        layout.structure_total,
        STRUCTURE_ALIGNMENT,
    );
    let scratch = aligned_byte_buffer(
        ctx,
        BufferUsage::STORAGE_BUFFER | BufferUsage::SHADER_DEVICE_ADDRESS,
        layout.scratch_total,
        scratch_alignment,
    );

    // bottom level: create every structure in its backing slice, then record
    // all builds into one submission and wait for its fence; the structures
    // are not read before that wait completes
    let mut builder = AutoCommandBufferBuilder::primary(
        &ctx.command_buffer_allocator,
        ctx.queue.queue_family_index(),
        CommandBufferUsage::OneTimeSubmit,
    )
    .expect("failed to begin acceleration build");

    let mut bottom_level = Vec::with_capacity(triangle_geometries.len());
    for (mesh_index, triangles) in triangle_geometries.into_iter().enumerate() {
        let blas = create_structure(
            ctx,
            AccelerationStructureType::BottomLevel,
            backing
                .clone()
                .slice(layout.structure_offsets[mesh_index]..)
                .slice(..sizes[mesh_index].structure),
        );

        let mut build_info = blas_build_info(triangles);
        build_info.dst_acceleration_structure = Some(blas.clone());
        build_info.scratch_data = Some(
            scratch
                .clone()
                .slice(layout.scratch_offsets[mesh_index]..),
        );

        unsafe {
            builder
                .build_acceleration_structure(
                    build_info,
                    smallvec![build_range(blas_primitive_counts[mesh_index])],
                )
                .expect("failed to record bottom-level build");
        }
        bottom_level.push(blas);
    }
    submit_and_wait(ctx, builder);

    // top level: the instance buffer can now reference the built structures
    let instances = instance_buffer(
        ctx,
        scene
            .instances
            .iter()
            .enumerate()
            .map(|(index, instance)| resolved_instance(instance, index as u32, &bottom_level))
            .collect(),
    );

    let tlas_index = sizes.len() - 1;
    let top_level = create_structure(
        ctx,
        AccelerationStructureType::TopLevel,
        backing
            .clone()
            .slice(layout.structure_offsets[tlas_index]..)
            .slice(..sizes[tlas_index].structure),
    );

    let mut build_info = tlas_build_info(instances);
    build_info.dst_acceleration_structure = Some(top_level.clone());
    build_info.scratch_data = Some(
        scratch
            .clone()
            .slice(layout.scratch_offsets[tlas_index]..),
    );

    let mut builder = AutoCommandBufferBuilder::primary(
        &ctx.command_buffer_allocator,
        ctx.queue.queue_family_index(),
        CommandBufferUsage::OneTimeSubmit,
    )
    .expect("failed to begin top-level build");
    unsafe {
        builder
            .build_acceleration_structure(build_info, smallvec![build_range(instance_count)])
            .expect("failed to record top-level build");
    }
    submit_and_wait(ctx, builder);

    SceneAccelerations {
        bottom_level,
        top_level,
    }
}

fn blas_build_info(
    triangles: AccelerationStructureGeometryTrianglesData,
) -> AccelerationStructureBuildGeometryInfo {
    let mut build_info = AccelerationStructureBuildGeometryInfo::new(
        AccelerationStructureGeometries::Triangles(vec![triangles]),
    );
    build_info.flags = BuildAccelerationStructureFlags::PREFER_FAST_TRACE;
    build_info.mode = BuildAccelerationStructureMode::Build;
    build_info
}

fn tlas_build_info(
    instances: Subbuffer<[AccelerationStructureInstance]>,
) -> AccelerationStructureBuildGeometryInfo {
    let mut build_info = AccelerationStructureBuildGeometryInfo::new(
        AccelerationStructureGeometries::Instances(AccelerationStructureGeometryInstancesData::new(
            AccelerationStructureGeometryInstancesDataType::Values(Some(instances)),
        )),
    );
    build_info.flags = BuildAccelerationStructureFlags::PREFER_FAST_TRACE;
    build_info.mode = BuildAccelerationStructureMode::Build;
    build_info
}

fn query_build_sizes(
    ctx: &RenderContext,
    build_info: &AccelerationStructureBuildGeometryInfo,
    primitive_count: u32,
) -> BuildSizes {
    let sizes = ctx
        .device
        .acceleration_structure_build_sizes(
            AccelerationStructureBuildType::Device,
            build_info,
            &[primitive_count],
        )
        .expect("failed to query acceleration structure build sizes");
    BuildSizes {
        structure: sizes.acceleration_structure_size,
        scratch: sizes.build_scratch_size,
    }
}

fn create_structure(
    ctx: &RenderContext,
    ty: AccelerationStructureType,
    buffer: Subbuffer<[u8]>,
) -> Arc<AccelerationStructure> {
    let mut create_info = AccelerationStructureCreateInfo::new(buffer);
    create_info.ty = ty;
    unsafe { AccelerationStructure::new(ctx.device.clone(), create_info) }
        .expect("failed to create acceleration structure")
}

fn aligned_byte_buffer(
    ctx: &RenderContext,
    usage: BufferUsage,
    size: DeviceSize,
    alignment: DeviceSize,
) -> Subbuffer<[u8]> {
    let layout = DeviceLayout::new(
        NonZeroDeviceSize::new(size).expect("empty acceleration structure allocation"),
        DeviceAlignment::new(alignment).expect("invalid alignment"),
    )
    .expect("invalid acceleration structure layout");
    let buffer = Buffer::new(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
            ..Default::default()
        },
        layout,
    )
    .expect("failed to allocate acceleration structure buffer");
    Subbuffer::new(buffer)
}

fn instance_buffer(
    ctx: &RenderContext,
    instances: Vec<AccelerationStructureInstance>,
) -> Subbuffer<[AccelerationStructureInstance]> {
    Buffer::from_iter(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage: BufferUsage::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY
                | BufferUsage::SHADER_DEVICE_ADDRESS,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
            ..Default::default()
        },
        instances,
    )
    .expect("failed to allocate instance buffer")
}

fn unresolved_instance() -> AccelerationStructureInstance {
    AccelerationStructureInstance {
        transform: identity_transform(),
        instance_custom_index_and_mask: Packed24_8::new(0, 0xff),
        instance_shader_binding_table_record_offset_and_flags: Packed24_8::new(0, 0),
        acceleration_structure_reference: 0,
    }
}

fn resolved_instance(
    instance: &crate::scene::SceneInstance,
    index: u32,
    bottom_level: &[Arc<AccelerationStructure>],
) -> AccelerationStructureInstance {
    let m = instance.transform;
    AccelerationStructureInstance {
        transform: [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(0, 3)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)], m[(1, 3)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)], m[(2, 3)]],
        ],
        instance_custom_index_and_mask: Packed24_8::new(index, 0xff),
        instance_shader_binding_table_record_offset_and_flags: Packed24_8::new(0, 0),
        acceleration_structure_reference: bottom_level[instance.mesh].device_address().get(),
    }
}

fn build_range(primitive_count: u32) -> AccelerationStructureBuildRangeInfo {
    AccelerationStructureBuildRangeInfo {
        primitive_count,
        primitive_offset: 0,
        first_vertex: 0,
        transform_offset: 0,
    }
}

fn submit_and_wait(ctx: &RenderContext, builder: AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>) {
    let command_buffer = builder.build().expect("failed to build acceleration build");
    command_buffer
        .execute(ctx.queue.clone())
        .expect("failed to submit acceleration build")
        .then_signal_fence_and_flush()
        .expect("failed to flush acceleration build")
        .wait(None)
        .expect("acceleration build did not complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_aligned_and_totals_cover_every_structure() {
        let sizes = [
            BuildSizes {
                structure: 1000,
                scratch: 300,
            },
            BuildSizes {
                structure: 513,
                scratch: 129,
            },
            BuildSizes {
                structure: 256,
                scratch: 128,
            },
        ];
        let layout = plan_shared_layout(&sizes, 256, 128);

        for (offset, size) in layout.structure_offsets.iter().zip(&sizes) {
            assert_eq!(offset % 256, 0);
            assert!(offset + size.structure <= layout.structure_total);
        }
        for (offset, size) in layout.scratch_offsets.iter().zip(&sizes) {
            assert_eq!(offset % 128, 0);
            assert!(offset + size.scratch <= layout.scratch_total);
        }
    }

    #[test]
    fn structures_never_overlap() {
        let sizes = [
            BuildSizes {
                structure: 100,
                scratch: 64,
            },
            BuildSizes {
                structure: 300,
                scratch: 200,
            },
            BuildSizes {
                structure: 77,
                scratch: 1,
            },
        ];
        let layout = plan_shared_layout(&sizes, 256, 128);
        for i in 1..sizes.len() {
            assert!(
                layout.structure_offsets[i - 1] + sizes[i - 1].structure
                    <= layout.structure_offsets[i]
            );
            assert!(layout.scratch_offsets[i - 1] + sizes[i - 1].scratch <= layout.scratch_offsets[i]);
        }
    }

    #[test]
    fn total_is_the_aligned_sum_of_all_levels() {
        // two bottom-level structures plus one top level
        let sizes = [
            BuildSizes {
                structure: 256,
                scratch: 128,
            },
            BuildSizes {
                structure: 256,
                scratch: 128,
            },
            BuildSizes {
                structure: 512,
                scratch: 256,
            },
        ];
        let layout = plan_shared_layout(&sizes, 256, 128);
        assert_eq!(layout.structure_total, 256 + 256 + 512);
        assert_eq!(layout.scratch_total, 128 + 128 + 256);
        assert_eq!(layout.structure_offsets, vec![0, 256, 512]);
    }
}
