vulkano_shaders::shader! {
    ty: "compute",
    linalg_type: "nalgebra",
    vulkan_version: "1.2",
    spirv_version: "1.5",
    src: r"
#version 460
#extension GL_EXT_scalar_block_layout : require
#extension GL_EXT_shader_explicit_arithmetic_types_int8 : require

layout(local_size_x = 32, local_size_y = 32, local_size_z = 1) in;

layout(set = 0, binding = 0, scalar) readonly buffer InputImage {
    u8vec4 input_pixels[];
};

layout(set = 0, binding = 1, scalar) writeonly buffer OutputImage {
    u8vec4 output_pixels[];
};

layout(push_constant, scalar) uniform PushConstants {
    uint filter_id;
    uint xsize;
    uint ysize;
};

const uint FILTER_SHARPEN = 0u;
const uint FILTER_EDGE_DETECT = 1u;
const uint FILTER_BLUR = 2u;

// pixels are stored in presentation (BGRA) byte order
vec3 fetch(ivec2 p) {
    p = clamp(p, ivec2(0), ivec2(int(xsize) - 1, int(ysize) - 1));
    return vec3(input_pixels[uint(p.y) * xsize + uint(p.x)].zyx) / 255.0;
}

void main() {
    if (gl_GlobalInvocationID.x >= xsize || gl_GlobalInvocationID.y >= ysize) {
        return;
    }
    ivec2 p = ivec2(gl_GlobalInvocationID.xy);

    vec3 color;
    if (filter_id == FILTER_SHARPEN) {
        color = 5.0 * fetch(p)
            - fetch(p + ivec2(1, 0)) - fetch(p + ivec2(-1, 0))
            - fetch(p + ivec2(0, 1)) - fetch(p + ivec2(0, -1));
    } else if (filter_id == FILTER_EDGE_DETECT) {
        vec3 gx = fetch(p + ivec2(1, -1)) + 2.0 * fetch(p + ivec2(1, 0)) + fetch(p + ivec2(1, 1))
            - fetch(p + ivec2(-1, -1)) - 2.0 * fetch(p + ivec2(-1, 0)) - fetch(p + ivec2(-1, 1));
        vec3 gy = fetch(p + ivec2(-1, 1)) + 2.0 * fetch(p + ivec2(0, 1)) + fetch(p + ivec2(1, 1))
            - fetch(p + ivec2(-1, -1)) - 2.0 * fetch(p + ivec2(0, -1)) - fetch(p + ivec2(1, -1));
        color = sqrt(gx * gx + gy * gy);
    } else {
        color = vec3(0.0);
        for (int dy = -1; dy <= 1; dy++) {
            for (int dx = -1; dx <= 1; dx++) {
                color += fetch(p + ivec2(dx, dy));
            }
        }
        color /= 9.0;
    }

    uint pixel_index = gl_GlobalInvocationID.y * xsize + gl_GlobalInvocationID.x;
    output_pixels[pixel_index] = u8vec4(clamp(color, 0.0, 1.0).zyx * 255.0, 255);
}
",
}
