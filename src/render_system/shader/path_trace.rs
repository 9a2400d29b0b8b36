vulkano_shaders::shader! {
    ty: "compute",
    linalg_type: "nalgebra",
    vulkan_version: "1.2",
    spirv_version: "1.5",
    src: r"
#version 460
#extension GL_EXT_ray_query : require
#extension GL_EXT_scalar_block_layout : require
#extension GL_EXT_shader_explicit_arithmetic_types_int8 : require

layout(local_size_x = 32, local_size_y = 32, local_size_z = 1) in;

layout(constant_id = 0) const uint USE_HDR = 0;
layout(constant_id = 1) const uint USE_GAMMA = 0;

struct Vertex {
    vec3 position;
    vec3 normal;
};

struct Instance {
    mat4 transform;
    vec3 albedo;
    uint first_index;
    vec3 emission;
    uint vertex_offset;
};

struct Light {
    vec3 position;
    float radius;
    vec3 emission;
    float pad;
};

layout(set = 0, binding = 0) uniform accelerationStructureEXT scene_tlas;

layout(set = 0, binding = 1, scalar) readonly buffer Vertices {
    Vertex vertices[];
};

layout(set = 0, binding = 2, scalar) readonly buffer Indices {
    uint indices[];
};

layout(set = 0, binding = 3, scalar) readonly buffer Instances {
    Instance instances[];
};

layout(set = 0, binding = 4, scalar) readonly buffer Lights {
    Light lights_data[];
};

layout(set = 0, binding = 5, scalar) uniform Globals {
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

layout(set = 0, binding = 6, rgba32f) uniform image2D accumulation;

layout(set = 0, binding = 7, scalar) writeonly buffer Output {
    u8vec4 output_pixels[];
};

layout(set = 0, binding = 8) uniform sampler2D environment;

layout(push_constant, scalar) uniform PushConstants {
    uint invocation_seed;
    uint xsize;
    uint ysize;
};

const float PI = 3.14159265358979;
const float T_MIN = 1e-3;
const float T_MAX = 1e4;

// pcg32
uint next_state(inout uint state) {
    state = state * 747796405u + 2891336453u;
    uint word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

float rand_float(inout uint state) {
    return float(next_state(state)) * (1.0 / 4294967296.0);
}

vec2 sample_disk(inout uint state) {
    float r = sqrt(rand_float(state));
    float phi = 2.0 * PI * rand_float(state);
    return r * vec2(cos(phi), sin(phi));
}

vec3 sample_cosine_hemisphere(vec3 n, inout uint state) {
    float u1 = rand_float(state);
    float u2 = rand_float(state);
    float r = sqrt(u1);
    float phi = 2.0 * PI * u2;
    vec3 t = normalize(abs(n.y) < 0.99 ? cross(n, vec3(0.0, 1.0, 0.0)) : cross(n, vec3(1.0, 0.0, 0.0)));
    vec3 b = cross(n, t);
    vec3 local = vec3(r * cos(phi), r * sin(phi), sqrt(max(0.0, 1.0 - u1)));
    return normalize(local.x * t + local.y * b + local.z * n);
}

vec3 environment_radiance(vec3 d) {
    if (USE_HDR != 0u) {
        vec2 uv = vec2(
            atan(d.z, d.x) * (0.5 / PI) + 0.5,
            acos(clamp(d.y, -1.0, 1.0)) * (1.0 / PI));
        return texture(environment, uv).rgb * hdr_multiplier;
    }
    return vec3(0.03);
}

struct Hit {
    bool valid;
    float t;
    vec3 position;
    vec3 normal;
    bool front_face;
    vec3 albedo;
    vec3 emission;
};

Hit trace_ray(vec3 origin, vec3 direction) {
    Hit hit;
    hit.valid = false;

    rayQueryEXT ray;
    rayQueryInitializeEXT(ray, scene_tlas, gl_RayFlagsOpaqueEXT, 0xFF, origin, T_MIN, direction, T_MAX);
    while (rayQueryProceedEXT(ray)) {
    }
    if (rayQueryGetIntersectionTypeEXT(ray, true) != gl_RayQueryCommittedIntersectionTriangleEXT) {
        return hit;
    }

    uint instance_index = uint(rayQueryGetIntersectionInstanceCustomIndexEXT(ray, true));
    uint primitive = uint(rayQueryGetIntersectionPrimitiveIndexEXT(ray, true));
    vec2 bary = rayQueryGetIntersectionBarycentricsEXT(ray, true);
    Instance inst = instances[instance_index];

    uint i0 = indices[inst.first_index + 3u * primitive + 0u] + inst.vertex_offset;
    uint i1 = indices[inst.first_index + 3u * primitive + 1u] + inst.vertex_offset;
    uint i2 = indices[inst.first_index + 3u * primitive + 2u] + inst.vertex_offset;

    float w0 = 1.0 - bary.x - bary.y;
    vec3 local_normal = normalize(
        w0 * vertices[i0].normal + bary.x * vertices[i1].normal + bary.y * vertices[i2].normal);
    vec3 normal = normalize(mat3(inst.transform) * local_normal);

    hit.valid = true;
    hit.t = rayQueryGetIntersectionTEXT(ray, true);
    hit.position = origin + direction * hit.t;
    hit.front_face = dot(normal, direction) < 0.0;
    hit.normal = hit.front_face ? normal : -normal;
    hit.albedo = inst.albedo;
    hit.emission = inst.emission;
    return hit;
}

bool occluded(vec3 origin, vec3 direction, float t_max) {
    rayQueryEXT ray;
    rayQueryInitializeEXT(
        ray, scene_tlas,
        gl_RayFlagsOpaqueEXT | gl_RayFlagsTerminateOnFirstHitEXT,
        0xFF, origin, T_MIN, direction, t_max);
    while (rayQueryProceedEXT(ray)) {
    }
    return rayQueryGetIntersectionTypeEXT(ray, true) != gl_RayQueryCommittedIntersectionNoneEXT;
}

// next event estimation against one uniformly chosen analytic light
vec3 direct_light(Hit hit, inout uint state) {
    if (lights == 0u) {
        return vec3(0.0);
    }
    uint pick = next_state(state) % lights;
    Light light = lights_data[pick];

    vec3 jitter = vec3(
        rand_float(state) * 2.0 - 1.0,
        rand_float(state) * 2.0 - 1.0,
        rand_float(state) * 2.0 - 1.0);
    vec3 target = light.position + normalize(jitter) * light.radius;
    vec3 to_light = target - hit.position;
    float dist = length(to_light);
    vec3 dir = to_light / dist;

    float cos_surface = dot(hit.normal, dir);
    if (cos_surface <= 0.0 || occluded(hit.position + hit.normal * T_MIN, dir, dist - 2.0 * T_MIN)) {
        return vec3(0.0);
    }

    float attenuation = 1.0 / max(dist * dist, 1e-4);
    return hit.albedo * light.emission * cos_surface * attenuation * float(lights);
}

void camera_ray(vec2 pixel, inout uint state, out vec3 origin, out vec3 direction) {
    vec2 jitter = vec2(rand_float(state), rand_float(state));
    vec2 ndc = (pixel + jitter) / vec2(float(xsize), float(ysize)) * 2.0 - 1.0;

    vec4 view_target = proj_inv * vec4(ndc, 1.0, 1.0);
    direction = normalize((view_inv * vec4(normalize(view_target.xyz / view_target.w), 0.0)).xyz);
    origin = camera_pos;

    if (aperture > 0.0) {
        vec3 focus = origin + direction * focal_distance;
        vec3 right = normalize((view_inv * vec4(1.0, 0.0, 0.0, 0.0)).xyz);
        vec3 up = normalize((view_inv * vec4(0.0, 1.0, 0.0, 0.0)).xyz);
        vec2 lens = sample_disk(state) * aperture;
        origin += right * lens.x + up * lens.y;
        direction = normalize(focus - origin);
    }
}

vec3 trace_path(vec2 pixel, inout uint state) {
    vec3 origin;
    vec3 direction;
    camera_ray(pixel, state, origin, direction);

    vec3 radiance = vec3(0.0);
    vec3 throughput = vec3(1.0);

    for (uint depth = 0u; depth < max_depth; depth++) {
        Hit hit = trace_ray(origin, direction);
        if (!hit.valid) {
            radiance += throughput * environment_radiance(direction);
            break;
        }

        // emissive surfaces only contribute on camera hits (later bounces are
        // covered by next event estimation); back faces need the
        // double-sided flag
        if (depth == 0u && (hit.front_face || double_sided != 0u)) {
            radiance += throughput * hit.emission;
        }

        radiance += throughput * direct_light(hit, state);

        throughput *= hit.albedo;
        if (max(throughput.r, max(throughput.g, throughput.b)) < 1e-3) {
            break;
        }

        origin = hit.position + hit.normal * T_MIN;
        direction = sample_cosine_hemisphere(hit.normal, state);
    }
    return radiance;
}

void main() {
    if (gl_GlobalInvocationID.x >= xsize || gl_GlobalInvocationID.y >= ysize) {
        return;
    }
    uint state = invocation_seed
        ^ (gl_GlobalInvocationID.y * xsize + gl_GlobalInvocationID.x) * 9781u;

    vec3 total = vec3(0.0);
    for (uint sample_index = 0u; sample_index < ssp; sample_index++) {
        total += trace_path(vec2(gl_GlobalInvocationID.xy), state);
    }
    vec3 radiance = total / float(ssp);

    ivec2 pixel = ivec2(gl_GlobalInvocationID.xy);
    vec3 accumulated = radiance;
    if (frame > 0u) {
        vec3 previous = imageLoad(accumulation, pixel).rgb;
        accumulated = mix(previous, radiance, 1.0 / float(frame + 1u));
    }
    imageStore(accumulation, pixel, vec4(accumulated, 1.0));

    vec3 color = accumulated / (accumulated + vec3(1.0));
    if (USE_GAMMA != 0u) {
        color = pow(color, vec3(1.0 / 2.2));
    }

    // the presentation image is BGRA
    uint pixel_index = gl_GlobalInvocationID.y * xsize + gl_GlobalInvocationID.x;
    output_pixels[pixel_index] = u8vec4(clamp(color.zyx, 0.0, 1.0) * 255.0, 255);
}
",
}
