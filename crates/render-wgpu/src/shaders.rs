/// WGSL for all three object pipelines.
///
/// Vertex attribute locations are fixed across pipelines: 0 position,
/// 1 uv, 2 normal, 3 tangent, 4 bitangent, 5..=8 model matrix columns
/// (per instance).
pub const OBJECT_SHADER: &str = r#"
struct FrameUniforms {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    // xyz position, w power
    light: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> frame: FrameUniforms;

@group(1) @binding(0)
var diffuse_texture: texture_2d<f32>;
@group(1) @binding(1)
var material_sampler: sampler;
@group(1) @binding(2)
var normal_texture: texture_2d<f32>;

struct InstanceInput {
    @location(5) model_0: vec4<f32>,
    @location(6) model_1: vec4<f32>,
    @location(7) model_2: vec4<f32>,
    @location(8) model_3: vec4<f32>,
};

fn model_matrix(instance: InstanceInput) -> mat4x4<f32> {
    return mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
}

fn shade(albedo: vec3<f32>, normal: vec3<f32>, world_position: vec3<f32>) -> vec3<f32> {
    let to_light = frame.light.xyz - world_position;
    let distance_sq = max(dot(to_light, to_light), 1e-4);
    let l = normalize(to_light);
    let n = normalize(normal);
    let e = normalize(frame.camera_position.xyz - world_position);
    let r = reflect(-l, n);

    let cos_theta = clamp(dot(n, l), 0.0, 1.0);
    let cos_alpha = clamp(dot(e, r), 0.0, 1.0);
    let power = frame.light.w / distance_sq;

    let ambient = albedo * 0.1;
    let diffuse = albedo * cos_theta * power;
    let specular = vec3<f32>(0.3) * pow(cos_alpha, 5.0) * power;
    return ambient + diffuse + specular;
}

struct UnlitOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_unlit(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    instance: InstanceInput,
) -> UnlitOutput {
    var out: UnlitOutput;
    out.clip_position = frame.view_proj * model_matrix(instance) * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_unlit(in: UnlitOutput) -> @location(0) vec4<f32> {
    return textureSample(diffuse_texture, material_sampler, in.uv);
}

struct LitOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) world_position: vec3<f32>,
    @location(2) world_normal: vec3<f32>,
};

@vertex
fn vs_lit(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
    instance: InstanceInput,
) -> LitOutput {
    let model = model_matrix(instance);
    let world = model * vec4<f32>(position, 1.0);
    var out: LitOutput;
    out.clip_position = frame.view_proj * world;
    out.uv = uv;
    out.world_position = world.xyz;
    out.world_normal = (model * vec4<f32>(normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_lit(in: LitOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(diffuse_texture, material_sampler, in.uv);
    return vec4<f32>(shade(albedo.rgb, in.world_normal, in.world_position), albedo.a);
}

struct NormalMappedOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) world_position: vec3<f32>,
    @location(2) world_normal: vec3<f32>,
    @location(3) world_tangent: vec3<f32>,
    @location(4) world_bitangent: vec3<f32>,
};

@vertex
fn vs_normal_mapped(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
    instance: InstanceInput,
) -> NormalMappedOutput {
    let model = model_matrix(instance);
    let world = model * vec4<f32>(position, 1.0);
    var out: NormalMappedOutput;
    out.clip_position = frame.view_proj * world;
    out.uv = uv;
    out.world_position = world.xyz;
    out.world_normal = (model * vec4<f32>(normal, 0.0)).xyz;
    out.world_tangent = (model * vec4<f32>(tangent, 0.0)).xyz;
    out.world_bitangent = (model * vec4<f32>(bitangent, 0.0)).xyz;
    return out;
}

@fragment
fn fs_normal_mapped(in: NormalMappedOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(diffuse_texture, material_sampler, in.uv);
    let sampled = textureSample(normal_texture, material_sampler, in.uv).rgb * 2.0 - 1.0;
    let tbn = mat3x3<f32>(
        normalize(in.world_tangent),
        normalize(in.world_bitangent),
        normalize(in.world_normal),
    );
    let normal = tbn * sampled;
    return vec4<f32>(shade(albedo.rgb, normal, in.world_position), albedo.a);
}
"#;
