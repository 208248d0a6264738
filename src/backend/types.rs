//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rg16Float,
    Rgba16Float,
    Rgba32Float,
}

impl TextureFormat {
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rg16Float | TextureFormat::Rgba16Float | TextureFormat::Rgba32Float
        )
    }

    pub fn channels(&self) -> u32 {
        match self {
            TextureFormat::Rg16Float => 2,
            _ => 4,
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Rg16Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Apply the storage precision of this format to an RGBA value.
    ///
    /// Channels the format does not store read back as 0 (alpha as 1),
    /// normalized formats clamp to `[0, 1]`.
    pub fn store(&self, value: Vec4) -> Vec4 {
        match self {
            TextureFormat::Rg16Float => Vec4::new(value.x, value.y, 0.0, 1.0),
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
                value.clamp(Vec4::ZERO, Vec4::ONE)
            }
            TextureFormat::Rgba16Float | TextureFormat::Rgba32Float => value,
        }
    }
}

/// Whether a texture is a single image or six cube faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layers(&self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampling state baked into a texture, the way GL stores it per texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `None` samples level 0 only
    pub mipmap_filter: Option<FilterMode>,
    pub address_mode: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: None,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

impl SamplerDescriptor {
    pub fn trilinear() -> Self {
        Self {
            mipmap_filter: Some(FilterMode::Linear),
            ..Default::default()
        }
    }

    pub fn repeat(mut self) -> Self {
        self.address_mode = AddressMode::Repeat;
        self
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub sampler: SamplerDescriptor,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            dimension: TextureDimension::D2,
            sampler: SamplerDescriptor::default(),
        }
    }
}

impl TextureDescriptor {
    pub fn texture_2d(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            width,
            height,
            format,
            ..Default::default()
        }
    }

    pub fn cube(label: &str, size: u32, mip_levels: u32, format: TextureFormat) -> Self {
        let sampler = if mip_levels > 1 {
            SamplerDescriptor::trilinear()
        } else {
            SamplerDescriptor::default()
        };
        Self {
            label: Some(label.to_string()),
            width: size,
            height: size,
            mip_levels,
            format,
            dimension: TextureDimension::Cube,
            sampler,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerDescriptor) -> Self {
        self.sampler = sampler;
        self
    }

    /// Size of a mip level; each level halves and floors, never below 1
    pub fn mip_size(&self, mip: u32) -> (u32, u32) {
        let halve = |extent: u32| extent.checked_shr(mip).unwrap_or(0).max(1);
        (halve(self.width), halve(self.height))
    }

    /// Number of levels in a complete chain down to 1x1
    pub fn full_mip_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed")
    }
}

/// One face of a cube texture, in GL layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// Faces in capture order
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Direction the capture camera looks down for this face
    pub fn forward(&self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Capture up vector, never parallel to `forward`
    pub fn up(&self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    /// Designated right vector of the face basis, `up x forward`.
    ///
    /// Screen-space `s` grows along the negation of this vector.
    pub fn right(&self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::Z,
            CubeFace::NegativeX => Vec3::NEG_Z,
            CubeFace::PositiveY => Vec3::NEG_X,
            CubeFace::NegativeY => Vec3::NEG_X,
            CubeFace::PositiveZ => Vec3::NEG_X,
            CubeFace::NegativeZ => Vec3::X,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        }
    }
}

/// Buffers affected by a clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFlags(u32);

impl ClearFlags {
    pub const COLOR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);
    pub const ALL: Self = Self((1 << 0) | (1 << 1));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ClearFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Compare function for the depth test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    #[default]
    Less,
    LessEqual,
    Always,
}

impl CompareFunction {
    pub fn passes(&self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Always => true,
        }
    }
}

/// Declared type of a named program uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Vec3,
    Mat4,
    Sampler2d,
    SamplerCube,
}

impl UniformType {
    pub fn is_sampler(&self) -> bool {
        matches!(self, UniformType::Sampler2d | UniformType::SamplerCube)
    }
}

/// Value written to a named uniform. Samplers take the texture unit as `Int`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn matches(&self, ty: UniformType) -> bool {
        matches!(
            (self, ty),
            (UniformValue::Int(_), UniformType::Sampler2d)
                | (UniformValue::Int(_), UniformType::SamplerCube)
                | (UniformValue::Float(_), UniformType::Float)
                | (UniformValue::Vec3(_), UniformType::Vec3)
                | (UniformValue::Mat4(_), UniformType::Mat4)
        )
    }
}

/// A uniform slot declared by a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub ty: UniformType,
}

const fn decl(name: &'static str, ty: UniformType) -> UniformDecl {
    UniformDecl { name, ty }
}

const EQUIRECT_UNIFORMS: &[UniformDecl] = &[
    decl("projection", UniformType::Mat4),
    decl("view", UniformType::Mat4),
    decl("equirectangular_map", UniformType::Sampler2d),
];

const IRRADIANCE_UNIFORMS: &[UniformDecl] = &[
    decl("projection", UniformType::Mat4),
    decl("view", UniformType::Mat4),
    decl("environment_map", UniformType::SamplerCube),
];

const PREFILTER_UNIFORMS: &[UniformDecl] = &[
    decl("projection", UniformType::Mat4),
    decl("view", UniformType::Mat4),
    decl("roughness", UniformType::Float),
    decl("environment_map", UniformType::SamplerCube),
];

const BRDF_UNIFORMS: &[UniformDecl] = &[];

const BACKGROUND_UNIFORMS: &[UniformDecl] = &[
    decl("projection", UniformType::Mat4),
    decl("view", UniformType::Mat4),
    decl("environment_map", UniformType::SamplerCube),
];

const PBR_UNIFORMS: &[UniformDecl] = &[
    decl("model", UniformType::Mat4),
    decl("view", UniformType::Mat4),
    decl("projection", UniformType::Mat4),
    decl("camera", UniformType::Vec3),
    decl("lights[0].position", UniformType::Vec3),
    decl("lights[0].color", UniformType::Vec3),
    decl("lights[1].position", UniformType::Vec3),
    decl("lights[1].color", UniformType::Vec3),
    decl("lights[2].position", UniformType::Vec3),
    decl("lights[2].color", UniformType::Vec3),
    decl("lights[3].position", UniformType::Vec3),
    decl("lights[3].color", UniformType::Vec3),
    decl("irradiance_map", UniformType::SamplerCube),
    decl("prefilter_map", UniformType::SamplerCube),
    decl("brdf_lut", UniformType::Sampler2d),
    decl("material.albedo", UniformType::Sampler2d),
    decl("material.normal", UniformType::Sampler2d),
    decl("material.metallic", UniformType::Sampler2d),
    decl("material.roughness", UniformType::Sampler2d),
    decl("material.ao", UniformType::Sampler2d),
];

/// The fixed set of programs the renderer knows how to run.
///
/// Non-sampler uniforms are listed in the order of the WGSL `Uniforms`
/// struct; samplers follow in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    EquirectToCubemap,
    IrradianceConvolution,
    SpecularPrefilter,
    BrdfIntegration,
    Background,
    Pbr,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 6] = [
        ProgramKind::EquirectToCubemap,
        ProgramKind::IrradianceConvolution,
        ProgramKind::SpecularPrefilter,
        ProgramKind::BrdfIntegration,
        ProgramKind::Background,
        ProgramKind::Pbr,
    ];

    pub fn uniforms(&self) -> &'static [UniformDecl] {
        match self {
            ProgramKind::EquirectToCubemap => EQUIRECT_UNIFORMS,
            ProgramKind::IrradianceConvolution => IRRADIANCE_UNIFORMS,
            ProgramKind::SpecularPrefilter => PREFILTER_UNIFORMS,
            ProgramKind::BrdfIntegration => BRDF_UNIFORMS,
            ProgramKind::Background => BACKGROUND_UNIFORMS,
            ProgramKind::Pbr => PBR_UNIFORMS,
        }
    }

    pub fn uniform(&self, name: &str) -> Option<UniformDecl> {
        self.uniforms().iter().find(|u| u.name == name).copied()
    }

    /// Sampler uniforms in binding order
    pub fn samplers(&self) -> impl Iterator<Item = &'static UniformDecl> {
        self.uniforms().iter().filter(|u| u.ty.is_sampler())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProgramKind::EquirectToCubemap => "equirect_to_cubemap",
            ProgramKind::IrradianceConvolution => "irradiance",
            ProgramKind::SpecularPrefilter => "prefilter",
            ProgramKind::BrdfIntegration => "brdf",
            ProgramKind::Background => "background",
            ProgramKind::Pbr => "pbr",
        }
    }
}

/// Program creation input
#[derive(Debug, Clone)]
pub struct ShaderDescriptor {
    pub label: Option<String>,
    pub kind: ProgramKind,
    /// WGSL source with `vs_main` and `fs_main` entry points
    pub source: String,
}

/// Shape a mesh was generated from.
///
/// Backends that rasterize vertices ignore it; the software backend
/// intersects the analytic shape instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Unit cube spanning `[-1, 1]` on every axis
    Cube,
    /// Full-screen quad in normalized device coordinates
    Quad,
    /// Unit sphere centered at the origin
    Sphere,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

/// Standard vertex with position, normal and UV
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Mesh creation input
#[derive(Debug, Clone, Copy)]
pub struct MeshDescriptor<'a> {
    pub label: Option<&'a str>,
    pub primitive: Primitive,
    pub topology: PrimitiveTopology,
    pub vertices: &'a [Vertex],
    pub indices: Option<&'a [u32]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_basis_is_right_handed() {
        for face in CubeFace::ALL {
            let f = face.forward();
            let u = face.up();
            assert!((f.length() - 1.0).abs() < 1e-6);
            assert!((u.length() - 1.0).abs() < 1e-6);
            assert!(f.dot(u).abs() < 1e-6, "{} up is not orthogonal", face.label());
            assert!(u.cross(f).abs_diff_eq(face.right(), 1e-6));
        }
    }

    #[test]
    fn test_mip_sizes() {
        let desc = TextureDescriptor::cube("c", 128, 5, TextureFormat::Rgba16Float);
        let sizes: Vec<u32> = (0..5).map(|m| desc.mip_size(m).0).collect();
        assert_eq!(sizes, vec![128, 64, 32, 16, 8]);
        assert_eq!(desc.mip_size(12), (1, 1));
        assert_eq!(desc.mip_size(40), (1, 1));
        assert_eq!(TextureDescriptor::full_mip_count(512, 512), 10);
        assert_eq!(TextureDescriptor::full_mip_count(1, 1), 1);
        assert_eq!(TextureDescriptor::full_mip_count(3, 2), 2);
    }

    #[test]
    fn test_format_storage() {
        let v = Vec4::new(1.5, -0.5, 0.25, 0.5);
        assert_eq!(TextureFormat::Rg16Float.store(v), Vec4::new(1.5, -0.5, 0.0, 1.0));
        assert_eq!(TextureFormat::Rgba8Unorm.store(v), Vec4::new(1.0, 0.0, 0.25, 0.5));
        assert_eq!(TextureFormat::Rgba16Float.store(v), v);
    }

    #[test]
    fn test_uniform_lookup() {
        let roughness = ProgramKind::SpecularPrefilter.uniform("roughness").unwrap();
        assert_eq!(roughness.ty, UniformType::Float);
        assert!(ProgramKind::IrradianceConvolution.uniform("roughness").is_none());
        assert!(UniformValue::Int(0).matches(UniformType::SamplerCube));
        assert!(!UniformValue::Float(0.0).matches(UniformType::Mat4));
        assert_eq!(ProgramKind::Pbr.samplers().count(), 8);
    }
}
