//! GPU-visible data layouts. Every struct here is mirrored by a `scalar`
//! block in the shaders; field order must match.

use vulkano::buffer::BufferContents;
use vulkano::pipeline::graphics::vertex_input::Vertex;

#[derive(BufferContents, Vertex, Clone, Copy, Debug)]
#[repr(C)]
pub struct MeshVertex {
    #[format(R32G32B32_SFLOAT)]
    pub position: [f32; 3],
    #[format(R32G32B32_SFLOAT)]
    pub normal: [f32; 3],
}

#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
pub struct InstanceData {
    /// Object-to-world transform, column major.
    pub transform: [[f32; 4]; 4],
    pub albedo: [f32; 3],
    /// Offset of this instance's mesh in the shared index buffer.
    pub first_index: u32,
    pub emission: [f32; 3],
    /// Offset added to every fetched index to reach the mesh's vertices in
    /// the shared vertex buffer.
    pub vertex_offset: u32,
}

#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
pub struct LightData {
    pub position: [f32; 3],
    pub radius: f32,
    pub emission: [f32; 3],
    pub _pad: f32,
}

/// Per-frame uniform block consumed by both render paths.
#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
pub struct GlobalUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_inv: [[f32; 4]; 4],
    pub proj_inv: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub lights: u32,
    pub ssp: u32,
    pub max_depth: u32,
    pub aperture: f32,
    pub focal_distance: f32,
    pub hdr_multiplier: f32,
    pub hdr_resolution: f32,
    pub frame: u32,
    pub ao_ray_length: f32,
    pub double_sided: u32,
    pub _pad: u32,
}
