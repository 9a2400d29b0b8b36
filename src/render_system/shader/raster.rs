pub mod vs {
    vulkano_shaders::shader! {
        ty: "vertex",
        linalg_type: "nalgebra",
        vulkan_version: "1.2",
        spirv_version: "1.5",
        src: r"
#version 460
#extension GL_EXT_scalar_block_layout : require

layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;

layout(location = 0) out vec3 v_normal;
layout(location = 1) out vec3 v_world;

layout(set = 0, binding = 0, scalar) uniform Globals {
    mat4 view;
    mat4 projection;
    mat4 view_inv;
    mat4 proj_inv;
    vec3 camera_pos;
    uint lights;
    uint ssp;
    uint max_depth;
    float aperture;
    float focal_distance;
    float hdr_multiplier;
    float hdr_resolution;
    uint frame;
    float ao_ray_length;
    uint double_sided;
    uint pad;
};

layout(push_constant, scalar) uniform Push {
    mat4 model;
    vec3 albedo;
    vec3 emission;
} pc;

void main() {
    vec4 world = pc.model * vec4(position, 1.0);
    v_world = world.xyz;
    v_normal = mat3(pc.model) * normal;
    gl_Position = projection * view * world;
}
",
    }
}

pub mod fs {
    vulkano_shaders::shader! {
        ty: "fragment",
        linalg_type: "nalgebra",
        vulkan_version: "1.2",
        spirv_version: "1.5",
        src: r"
#version 460
#extension GL_EXT_scalar_block_layout : require

layout(location = 0) in vec3 v_normal;
layout(location = 1) in vec3 v_world;

layout(location = 0) out vec4 f_color;

layout(push_constant, scalar) uniform Push {
    mat4 model;
    vec3 albedo;
    vec3 emission;
} pc;

void main() {
    vec3 n = normalize(v_normal);
    vec3 key_light = normalize(vec3(0.4, 0.8, 0.3));
    float diffuse = max(dot(n, key_light), 0.0) * 0.85 + 0.15;
    f_color = vec4(pc.albedo * diffuse + pc.emission, 1.0);
}
",
    }
}
