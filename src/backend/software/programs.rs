//! CPU versions of the builtin programs
//!
//! Instead of transforming vertices, each primitive is intersected per pixel
//! along the view ray, which yields the same interpolated inputs the vertex
//! stage would have produced for these closed shapes.
//!
//! The shading math follows the LearnOpenGL PBR and IBL tutorials:
//! - https://learnopengl.com/PBR/IBL/Diffuse-irradiance
//! - https://learnopengl.com/PBR/IBL/Specular-IBL

use std::collections::HashMap;
use std::f32::consts::PI;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::image::SoftTexture;
use super::SoftwareConfig;
use crate::backend::traits::TextureHandle;
use crate::backend::types::{Primitive, ProgramKind, UniformValue};

const LIGHT_POSITIONS: [&str; 4] = [
    "lights[0].position",
    "lights[1].position",
    "lights[2].position",
    "lights[3].position",
];
const LIGHT_COLORS: [&str; 4] = [
    "lights[0].color",
    "lights[1].color",
    "lights[2].color",
    "lights[3].color",
];

/// Highest prefilter mip sampled by the shading pass
const MAX_REFLECTION_LOD: f32 = 4.0;

/// Uniform values set on a program, keyed by declared name
#[derive(Debug, Default, Clone)]
pub(crate) struct UniformStore {
    values: HashMap<&'static str, UniformValue>,
}

impl UniformStore {
    pub fn set(&mut self, name: &'static str, value: UniformValue) {
        self.values.insert(name, value);
    }

    pub fn mat4(&self, name: &str) -> Mat4 {
        match self.values.get(name) {
            Some(UniformValue::Mat4(m)) => *m,
            _ => Mat4::IDENTITY,
        }
    }

    pub fn vec3(&self, name: &str) -> Vec3 {
        match self.values.get(name) {
            Some(UniformValue::Vec3(v)) => *v,
            _ => Vec3::ZERO,
        }
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.values.get(name) {
            Some(UniformValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i32 {
        match self.values.get(name) {
            Some(UniformValue::Int(v)) => *v,
            _ => 0,
        }
    }
}

/// Interpolated inputs for one pixel
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    /// Object-space position
    pub local_pos: Vec3,
    pub world_pos: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub uv: Vec2,
    /// Window depth in `[0, 1]`
    pub depth: f32,
}

/// Resolve the fragment covering `ndc` for a primitive, if any.
pub(crate) fn rasterize(
    kind: ProgramKind,
    primitive: Primitive,
    ndc: Vec2,
    uniforms: &UniformStore,
) -> Option<Fragment> {
    // Outside the PBR pass a quad covers the whole viewport
    if primitive == Primitive::Quad && kind != ProgramKind::Pbr {
        return Some(Fragment {
            local_pos: ndc.extend(0.0),
            world_pos: ndc.extend(0.0),
            normal: Vec3::Z,
            tangent: Vec3::X,
            uv: ndc * 0.5 + 0.5,
            depth: 0.5,
        });
    }

    let projection = uniforms.mat4("projection");
    let mut view = uniforms.mat4("view");
    if kind == ProgramKind::Background {
        view = Mat4::from_mat3(Mat3::from_mat4(view));
    }
    let model = if kind == ProgramKind::Pbr {
        uniforms.mat4("model")
    } else {
        Mat4::IDENTITY
    };

    let clip_from_local = projection * view * model;
    let local_from_clip = clip_from_local.inverse();
    let near = local_from_clip.project_point3(ndc.extend(-1.0));
    let far = local_from_clip.project_point3(ndc.extend(1.0));
    if !near.is_finite() || !far.is_finite() {
        return None;
    }
    let dir = far - near;

    let t = match primitive {
        Primitive::Cube => intersect_cube(near, dir)?,
        Primitive::Sphere => intersect_sphere(near, dir)?,
        Primitive::Quad => intersect_quad(near, dir)?,
    };
    let local_pos = near + dir * t;

    let depth = if kind == ProgramKind::Background {
        1.0
    } else {
        let clip = clip_from_local * local_pos.extend(1.0);
        (clip.z / clip.w) * 0.5 + 0.5
    };

    let normal_matrix = Mat3::from_mat4(model).inverse().transpose();
    let (normal, tangent, uv) = match primitive {
        Primitive::Sphere => {
            let p = local_pos.normalize_or_zero();
            let phi = p.z.atan2(p.x);
            let u = (phi / (2.0 * PI)).rem_euclid(1.0);
            let v = p.y.clamp(-1.0, 1.0).acos() / PI;
            let tangent = Vec3::new(-phi.sin(), 0.0, phi.cos());
            (p, tangent, Vec2::new(u, v))
        }
        Primitive::Quad => (Vec3::Z, Vec3::X, local_pos.truncate() * 0.5 + 0.5),
        Primitive::Cube => (local_pos.normalize_or_zero(), Vec3::X, Vec2::ZERO),
    };

    Some(Fragment {
        local_pos,
        world_pos: model.transform_point3(local_pos),
        normal: (normal_matrix * normal).normalize_or_zero(),
        tangent: model.transform_vector3(tangent).normalize_or_zero(),
        uv,
        depth,
    })
}

/// Nearest ray parameter in `[0, 1]` hitting the `[-1, 1]` cube
fn intersect_cube(origin: Vec3, dir: Vec3) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-12 {
            if !(-1.0..=1.0).contains(&o) {
                return None;
            }
            continue;
        }
        let t1 = (-1.0 - o) / d;
        let t2 = (1.0 - o) / d;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
    }
    if t_min > t_max {
        return None;
    }
    first_in_range(t_min, t_max)
}

/// Nearest ray parameter in `[0, 1]` hitting the unit sphere
fn intersect_sphere(origin: Vec3, dir: Vec3) -> Option<f32> {
    let a = dir.dot(dir);
    let b = 2.0 * origin.dot(dir);
    let c = origin.dot(origin) - 1.0;
    let disc = b * b - 4.0 * a * c;
    if a <= 0.0 || disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    first_in_range((-b - root) / (2.0 * a), (-b + root) / (2.0 * a))
}

/// Ray parameter in `[0, 1]` hitting the `z = 0` square spanning `[-1, 1]`
fn intersect_quad(origin: Vec3, dir: Vec3) -> Option<f32> {
    if dir.z.abs() < 1e-12 {
        return None;
    }
    let t = -origin.z / dir.z;
    let hit = origin + dir * t;
    ((0.0..=1.0).contains(&t) && hit.x.abs() <= 1.0 && hit.y.abs() <= 1.0).then_some(t)
}

fn first_in_range(t0: f32, t1: f32) -> Option<f32> {
    [t0, t1].into_iter().find(|t| (0.0..=1.0).contains(t))
}

/// Texture units and uniforms visible to a program during one draw
pub(crate) struct ShadingContext<'a> {
    pub config: &'a SoftwareConfig,
    pub uniforms: &'a UniformStore,
    pub textures: &'a HashMap<u64, SoftTexture>,
    pub units: &'a HashMap<u32, TextureHandle>,
}

impl ShadingContext<'_> {
    fn texture(&self, sampler: &str) -> Option<&SoftTexture> {
        let unit = u32::try_from(self.uniforms.int(sampler)).ok()?;
        let handle = self.units.get(&unit)?;
        self.textures.get(&handle.0)
    }

    fn sample_2d(&self, sampler: &str, uv: Vec2, lod: f32) -> Vec4 {
        self.texture(sampler)
            .map_or(Vec4::ZERO, |t| t.sample_2d(uv, lod))
    }

    fn sample_cube(&self, sampler: &str, dir: Vec3, lod: f32) -> Vec4 {
        self.texture(sampler)
            .map_or(Vec4::ZERO, |t| t.sample_cube(dir, lod))
    }
}

/// Run the fragment stage of `kind`
pub(crate) fn shade(kind: ProgramKind, frag: &Fragment, ctx: &ShadingContext) -> Vec4 {
    match kind {
        ProgramKind::EquirectToCubemap => equirect_to_cubemap(frag, ctx),
        ProgramKind::IrradianceConvolution => {
            convolve_irradiance(frag.local_pos.normalize_or_zero(), ctx).extend(1.0)
        }
        ProgramKind::SpecularPrefilter => {
            let roughness = ctx.uniforms.float("roughness");
            prefilter(frag.local_pos.normalize_or_zero(), roughness, ctx).extend(1.0)
        }
        ProgramKind::BrdfIntegration => {
            let scale_bias = integrate_brdf(frag.uv.x, frag.uv.y, ctx.config.brdf_sample_count);
            Vec4::new(scale_bias.x, scale_bias.y, 0.0, 1.0)
        }
        ProgramKind::Background => {
            let env = ctx.sample_cube("environment_map", frag.local_pos, 0.0).xyz();
            tonemap(env).extend(1.0)
        }
        ProgramKind::Pbr => shade_pbr(frag, ctx).extend(1.0),
    }
}

/// Direction to equirectangular UV, `v` = 0 at the south pole
pub(crate) fn equirect_uv(dir: Vec3) -> Vec2 {
    let inv_atan = Vec2::new(0.5 * std::f32::consts::FRAC_1_PI, std::f32::consts::FRAC_1_PI);
    Vec2::new(dir.z.atan2(dir.x), dir.y.clamp(-1.0, 1.0).asin()) * inv_atan + 0.5
}

fn equirect_to_cubemap(frag: &Fragment, ctx: &ShadingContext) -> Vec4 {
    let uv = equirect_uv(frag.local_pos.normalize_or_zero());
    ctx.sample_2d("equirectangular_map", uv, 0.0)
        .xyz()
        .extend(1.0)
}

/// Cosine-weighted hemisphere average around `normal`.
///
/// The sum is normalized by the accumulated weights, so a constant
/// environment convolves to exactly itself.
fn convolve_irradiance(normal: Vec3, ctx: &ShadingContext) -> Vec3 {
    let up = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::Z };
    let right = up.cross(normal).normalize();
    let up = normal.cross(right);

    let delta = ctx.config.irradiance_sample_delta.max(1e-3);
    let mut irradiance = Vec3::ZERO;
    let mut total_weight = 0.0;

    let mut phi = 0.0f32;
    while phi < 2.0 * PI {
        let mut theta = 0.0f32;
        while theta < 0.5 * PI {
            let tangent_sample = Vec3::new(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            );
            let sample_vec =
                tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;
            let weight = theta.cos() * theta.sin();
            irradiance += ctx.sample_cube("environment_map", sample_vec, 0.0).xyz() * weight;
            total_weight += weight;
            theta += delta;
        }
        phi += delta;
    }

    if total_weight > 0.0 {
        irradiance / total_weight
    } else {
        Vec3::ZERO
    }
}

fn prefilter(normal: Vec3, roughness: f32, ctx: &ShadingContext) -> Vec3 {
    let v = normal;
    let sample_count = ctx.config.prefilter_sample_count.max(1);
    let resolution = ctx
        .texture("environment_map")
        .map_or(512.0, |t| t.desc.width as f32);
    let sa_texel = 4.0 * PI / (6.0 * resolution * resolution);

    let mut color = Vec3::ZERO;
    let mut total_weight = 0.0;
    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, normal, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize_or_zero();

        let n_dot_l = normal.dot(l).max(0.0);
        if n_dot_l > 0.0 {
            let n_dot_h = normal.dot(h).max(0.0);
            let h_dot_v = h.dot(v).max(0.0);
            let d = distribution_ggx(n_dot_h, roughness);
            let pdf = d * n_dot_h / (4.0 * h_dot_v) + 0.0001;
            let sa_sample = 1.0 / (sample_count as f32 * pdf + 0.0001);
            let mip_level = if roughness == 0.0 {
                0.0
            } else {
                0.5 * (sa_sample / sa_texel).log2()
            };
            color += ctx.sample_cube("environment_map", l, mip_level).xyz() * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    color / f32::max(total_weight, 0.001)
}

/// Split-sum scale and bias for a view angle and roughness
pub(crate) fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let sample_count = sample_count.max(1);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;

    let mut a = 0.0;
    let mut b = 0.0;
    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize_or_zero();

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);
        if n_dot_l > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, ibl_k(roughness));
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(1e-6);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    Vec2::new(a, b) / sample_count as f32
}

/// Hammersley sequence for low-discrepancy sampling.
pub(crate) fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// GGX half vector around `n` for a 2D sample
pub(crate) fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).max(0.0).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom).max(1e-7)
}

fn geometry_schlick_ggx(n_dot_v: f32, k: f32) -> f32 {
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, k: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, k) * geometry_schlick_ggx(n_dot_l, k)
}

/// Remapped roughness for image-based lighting
fn ibl_k(roughness: f32) -> f32 {
    roughness * roughness / 2.0
}

/// Remapped roughness for analytic lights
fn direct_k(roughness: f32) -> f32 {
    let r = roughness + 1.0;
    r * r / 8.0
}

fn fresnel_schlick(cos_theta: f32, f0: Vec3) -> Vec3 {
    f0 + (Vec3::ONE - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powi(5)
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: Vec3, roughness: f32) -> Vec3 {
    let max = Vec3::splat(1.0 - roughness).max(f0);
    f0 + (max - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powi(5)
}

/// Reinhard tone mapping followed by gamma correction
fn tonemap(color: Vec3) -> Vec3 {
    let mapped = color / (color + Vec3::ONE);
    mapped.powf(1.0 / 2.2)
}

fn shade_pbr(frag: &Fragment, ctx: &ShadingContext) -> Vec3 {
    let uv = frag.uv;
    let albedo = ctx.sample_2d("material.albedo", uv, 0.0).xyz().powf(2.2);
    let metallic = ctx.sample_2d("material.metallic", uv, 0.0).x;
    let roughness = ctx.sample_2d("material.roughness", uv, 0.0).x;
    let ao = ctx.sample_2d("material.ao", uv, 0.0).x;

    let tangent_normal = ctx.sample_2d("material.normal", uv, 0.0).xyz() * 2.0 - Vec3::ONE;
    let n = frag.normal;
    let t = frag.tangent;
    let b = -n.cross(t).normalize_or_zero();
    let n = (t * tangent_normal.x + b * tangent_normal.y + n * tangent_normal.z).normalize_or_zero();

    let camera = ctx.uniforms.vec3("camera");
    let v = (camera - frag.world_pos).normalize_or_zero();
    let r = 2.0 * n.dot(v) * n - v;
    let n_dot_v = n.dot(v).max(0.0);

    let f0 = Vec3::splat(0.04).lerp(albedo, metallic);

    let mut lo = Vec3::ZERO;
    for (position, color) in LIGHT_POSITIONS.iter().zip(LIGHT_COLORS.iter()) {
        let to_light = ctx.uniforms.vec3(position) - frag.world_pos;
        let l = to_light.normalize_or_zero();
        let h = (v + l).normalize_or_zero();
        let distance = to_light.length();
        let attenuation = 1.0 / (distance * distance).max(1e-4);
        let radiance = ctx.uniforms.vec3(color) * attenuation;

        let n_dot_l = n.dot(l).max(0.0);
        let ndf = distribution_ggx(n.dot(h).max(0.0), roughness);
        let g = geometry_smith(n_dot_v, n_dot_l, direct_k(roughness));
        let f = fresnel_schlick(h.dot(v).max(0.0), f0);

        let specular = ndf * g * f / (4.0 * n_dot_v * n_dot_l + 0.0001);
        let k_d = (Vec3::ONE - f) * (1.0 - metallic);
        lo += (k_d * albedo / PI + specular) * radiance * n_dot_l;
    }

    let f = fresnel_schlick_roughness(n_dot_v, f0, roughness);
    let k_d = (Vec3::ONE - f) * (1.0 - metallic);
    let irradiance = ctx.sample_cube("irradiance_map", n, 0.0).xyz();
    let diffuse = irradiance * albedo;

    let prefiltered = ctx
        .sample_cube("prefilter_map", r, roughness * MAX_REFLECTION_LOD)
        .xyz();
    let brdf = ctx.sample_2d("brdf_lut", Vec2::new(n_dot_v, roughness), 0.0);
    let specular = prefiltered * (f * brdf.x + Vec3::splat(brdf.y));
    let ambient = (k_d * diffuse + specular) * ao;

    tonemap(ambient + lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hammersley() {
        assert_eq!(hammersley(0, 4), Vec2::ZERO);
        assert_eq!(hammersley(1, 4), Vec2::new(0.25, 0.5));
        assert_eq!(hammersley(2, 4), Vec2::new(0.5, 0.25));
    }

    #[test]
    fn test_ggx_sample_at_zero_roughness_is_normal() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        for i in 0..8 {
            let h = importance_sample_ggx(hammersley(i, 8), n, 0.0);
            assert!(h.abs_diff_eq(n, 1e-5));
        }
    }

    #[test]
    fn test_equirect_uv_poles_and_seam() {
        assert!(equirect_uv(Vec3::Y).y > 0.999);
        assert!(equirect_uv(Vec3::NEG_Y).y < 0.001);
        assert!(equirect_uv(Vec3::X).abs_diff_eq(Vec2::splat(0.5), 1e-6));
    }

    #[test]
    fn test_brdf_energy_bounds() {
        for &(n_dot_v, roughness) in &[(0.3, 0.7), (0.5, 0.5), (0.9, 0.9), (1.0, 0.0)] {
            let sb = integrate_brdf(n_dot_v, roughness, 64);
            assert!(sb.x >= 0.0 && sb.y >= 0.0);
            assert!(sb.x + sb.y <= 1.02, "{sb:?} at {n_dot_v}, {roughness}");
        }
    }

    #[test]
    fn test_primitive_hits() {
        // Ray from the origin towards +X leaves the cube at x = 1
        let t = intersect_cube(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)).unwrap();
        assert!((t - 0.1).abs() < 1e-6);
        // Ray from z = 3 towards the origin meets the sphere at z = 1
        let t = intersect_sphere(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -4.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert!(intersect_sphere(Vec3::new(2.0, 2.0, 3.0), Vec3::new(0.0, 0.0, -4.0)).is_none());
        let t = intersect_quad(Vec3::new(0.5, 0.5, 2.0), Vec3::new(0.0, 0.0, -4.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert!(intersect_quad(Vec3::new(1.5, 0.0, 2.0), Vec3::new(0.0, 0.0, -4.0)).is_none());
    }
}
