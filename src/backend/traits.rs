//! Core backend abstraction traits
//!
//! The renderer drives a GL-style immediate-mode device through
//! [`GraphicsBackend`]: one bound framebuffer, one bound program, texture
//! units, a viewport and a depth function. Both the software and the wgpu
//! backends implement it.

use crate::backend::types::*;
use glam::Vec4;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create mesh: {0}")]
    MeshCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
    #[error("Unknown uniform '{name}' for program '{program}'")]
    UnknownUniform { program: &'static str, name: String },
    #[error("Uniform '{0}' set with a value of the wrong type")]
    UniformTypeMismatch(String),
    #[error("No program bound")]
    NoProgramBound,
    #[error("Invalid texture data: {0}")]
    InvalidData(String),
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a texture (2D or cube)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to an offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a depth renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub(crate) u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) u64);

macro_rules! impl_handle {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Raw id, unique for the lifetime of the backend
                pub fn id(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

impl_handle!(
    TextureHandle,
    FramebufferHandle,
    RenderbufferHandle,
    ProgramHandle,
    MeshHandle
);

/// Number of live objects per kind, used for leak checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    pub textures: usize,
    pub framebuffers: usize,
    pub renderbuffers: usize,
    pub programs: usize,
    pub meshes: usize,
}

impl LiveResources {
    pub fn total(&self) -> usize {
        self.textures + self.framebuffers + self.renderbuffers + self.programs + self.meshes
    }
}

/// Main graphics backend trait
///
/// Handles are never reused while the backend is alive. Every object
/// created here must be released with the matching `destroy_*` call.
pub trait GraphicsBackend {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    // Textures

    /// Create a texture; size, format and mip count are fixed for its lifetime
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload RGBA texels to mip 0 of a 2D texture or of one cube face
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        data: &[Vec4],
    ) -> BackendResult<()>;

    /// Rebuild mips `1..` from level 0
    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()>;

    /// Read back one level as RGBA, row 0 first
    fn read_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<Vec<Vec4>>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    // Framebuffers

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn create_renderbuffer(&mut self) -> BackendResult<RenderbufferHandle>;

    /// (Re)allocate depth storage for a renderbuffer
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()>;

    /// Attach one level of a texture (and one face for cubes) as color target
    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<()>;

    fn detach_color(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()>;

    /// Bind an offscreen framebuffer, or the default surface with `None`
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn set_depth_compare(&mut self, compare: CompareFunction);

    /// Clear the whole color attachment (and depth) of the bound framebuffer
    fn clear(&mut self, color: Vec4, flags: ClearFlags) -> BackendResult<()>;

    // Programs

    fn create_program(&mut self, desc: &ShaderDescriptor) -> BackendResult<ProgramHandle>;

    fn destroy_program(&mut self, program: ProgramHandle);

    /// Make a program current for draws, or unbind with `None`
    fn use_program(&mut self, program: Option<ProgramHandle>);

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()>;

    /// Bind a texture to a unit; unbound units sample as black
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    // Meshes

    fn create_mesh(&mut self, desc: &MeshDescriptor) -> BackendResult<MeshHandle>;

    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Draw a mesh with the current program into the bound framebuffer
    fn draw_mesh(&mut self, mesh: MeshHandle) -> BackendResult<()>;

    // Default surface

    fn resize_surface(&mut self, width: u32, height: u32) -> BackendResult<()>;

    fn surface_size(&self) -> (u32, u32);

    /// Read back the default surface as RGBA, bottom row first
    fn read_surface(&mut self) -> BackendResult<Vec<Vec4>>;

    fn live_resources(&self) -> LiveResources;
}
