//! Software backend
//!
//! A CPU reference implementation of [`GraphicsBackend`]. It runs the
//! builtin programs per pixel, so the full precompute pipeline and the
//! shading pass can execute (and be verified) without a GPU.

mod image;
mod programs;

use std::collections::HashMap;

use glam::{Vec2, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shader::validate_wgsl;

use self::image::{DepthBuffer, Image, SoftTexture};
use self::programs::{ShadingContext, UniformStore};

/// Shader-level tuning for the CPU programs
#[derive(Debug, Clone)]
pub struct SoftwareConfig {
    /// Angular step (radians) of the irradiance hemisphere sweep
    pub irradiance_sample_delta: f32,
    /// GGX samples per prefiltered texel
    pub prefilter_sample_count: u32,
    /// GGX samples per BRDF LUT texel
    pub brdf_sample_count: u32,
    /// Initial default surface size
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            irradiance_sample_delta: 0.05,
            prefilter_sample_count: 64,
            brdf_sample_count: 64,
            surface_width: 800,
            surface_height: 600,
        }
    }
}

impl SoftwareConfig {
    /// Coarse sampling and a small surface, for quick runs
    pub fn preview() -> Self {
        Self {
            irradiance_sample_delta: 0.2,
            prefilter_sample_count: 16,
            brdf_sample_count: 16,
            surface_width: 64,
            surface_height: 48,
        }
    }
}

/// Backend call recorded for inspection
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    BindFramebuffer(Option<FramebufferHandle>),
    AttachColor {
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    },
    DetachColor,
    RenderbufferStorage {
        width: u32,
        height: u32,
    },
    Viewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Clear(ClearFlags),
    SetUniform {
        name: &'static str,
        value: UniformValue,
    },
    Draw {
        program: ProgramKind,
        primitive: Primitive,
    },
    GenerateMipmaps(TextureHandle),
}

#[derive(Debug, Clone, Copy)]
struct ColorAttachment {
    texture: TextureHandle,
    layer: usize,
    mip: u32,
}

#[derive(Debug, Default)]
struct Framebuffer {
    color: Option<ColorAttachment>,
    depth: Option<RenderbufferHandle>,
}

#[derive(Debug)]
struct Program {
    kind: ProgramKind,
    uniforms: UniformStore,
}

#[derive(Debug)]
struct SoftMesh {
    primitive: Primitive,
}

/// Where a draw or clear lands
#[derive(Clone, Copy)]
enum Target {
    Surface,
    Texture {
        attachment: ColorAttachment,
        depth: Option<RenderbufferHandle>,
    },
}

pub struct SoftwareBackend {
    config: SoftwareConfig,
    next_id: u64,

    textures: HashMap<u64, SoftTexture>,
    framebuffers: HashMap<u64, Framebuffer>,
    renderbuffers: HashMap<u64, DepthBuffer>,
    programs: HashMap<u64, Program>,
    meshes: HashMap<u64, SoftMesh>,

    units: HashMap<u32, TextureHandle>,
    bound_framebuffer: Option<FramebufferHandle>,
    current_program: Option<ProgramHandle>,
    viewport: (u32, u32, u32, u32),
    depth_compare: CompareFunction,

    surface: Image,
    surface_depth: DepthBuffer,

    events: Vec<BackendEvent>,
}

impl SoftwareBackend {
    pub fn new(config: SoftwareConfig) -> Self {
        let (width, height) = (config.surface_width, config.surface_height);
        log::info!("Software backend initialized ({}x{} surface)", width, height);
        Self {
            config,
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            units: HashMap::new(),
            bound_framebuffer: None,
            current_program: None,
            viewport: (0, 0, width, height),
            depth_compare: CompareFunction::Less,
            surface: Image::new(width, height),
            surface_depth: DepthBuffer::new(width, height),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SoftwareConfig {
        &self.config
    }

    /// Drain the recorded call log
    pub fn take_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn viewport(&self) -> (u32, u32, u32, u32) {
        self.viewport
    }

    pub fn depth_compare(&self) -> CompareFunction {
        self.depth_compare
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&SoftTexture> {
        self.textures.get(&handle.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: handle.0,
        })
    }

    fn framebuffer_mut(&mut self, handle: FramebufferHandle) -> BackendResult<&mut Framebuffer> {
        self.framebuffers
            .get_mut(&handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: handle.0,
            })
    }

    fn layer_for(texture: &SoftTexture, face: Option<CubeFace>) -> BackendResult<usize> {
        match (texture.desc.dimension, face) {
            (TextureDimension::D2, None) => Ok(0),
            (TextureDimension::Cube, Some(face)) => Ok(face.index()),
            (TextureDimension::D2, Some(face)) => Err(BackendError::InvalidAttachment(format!(
                "face {} requested on 2D texture '{}'",
                face.label(),
                texture.desc.label_or_default()
            ))),
            (TextureDimension::Cube, None) => Err(BackendError::InvalidAttachment(format!(
                "cube texture '{}' needs a face",
                texture.desc.label_or_default()
            ))),
        }
    }

    fn target(&self) -> BackendResult<Target> {
        let Some(fb) = self.bound_framebuffer else {
            return Ok(Target::Surface);
        };
        let framebuffer = self
            .framebuffers
            .get(&fb.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: fb.0,
            })?;
        let attachment = framebuffer.color.ok_or_else(|| {
            BackendError::InvalidAttachment(format!("framebuffer {} has no color attachment", fb.0))
        })?;
        Ok(Target::Texture {
            attachment,
            depth: framebuffer.depth,
        })
    }

    /// Take the color level and depth buffer of the current target out of
    /// storage so they can be written while other textures are sampled.
    fn take_target(&mut self) -> BackendResult<(Target, Image, Option<DepthBuffer>, TextureFormat)> {
        let target = self.target()?;
        match target {
            Target::Surface => {
                let color = std::mem::take(&mut self.surface);
                let depth = std::mem::take(&mut self.surface_depth);
                Ok((target, color, Some(depth), TextureFormat::Rgba8Unorm))
            }
            Target::Texture { attachment, depth } => {
                let texture = self
                    .textures
                    .get_mut(&attachment.texture.0)
                    .ok_or(BackendError::InvalidHandle {
                        kind: "texture",
                        id: attachment.texture.0,
                    })?;
                let format = texture.desc.format;
                let level = texture
                    .level_mut(attachment.layer, attachment.mip)
                    .ok_or_else(|| {
                        BackendError::InvalidAttachment(format!(
                            "mip {} missing on texture {}",
                            attachment.mip, attachment.texture.0
                        ))
                    })?;
                let color = std::mem::take(level);
                let depth = depth.and_then(|rb| self.renderbuffers.remove(&rb.0));
                Ok((target, color, depth, format))
            }
        }
    }

    fn restore_target(&mut self, target: Target, color: Image, depth: Option<DepthBuffer>) {
        match target {
            Target::Surface => {
                self.surface = color;
                if let Some(depth) = depth {
                    self.surface_depth = depth;
                }
            }
            Target::Texture {
                attachment,
                depth: depth_handle,
            } => {
                if let Some(level) = self
                    .textures
                    .get_mut(&attachment.texture.0)
                    .and_then(|t| t.level_mut(attachment.layer, attachment.mip))
                {
                    *level = color;
                }
                if let (Some(rb), Some(depth)) = (depth_handle, depth) {
                    self.renderbuffers.insert(rb.0, depth);
                }
            }
        }
    }

    /// Pixel rectangle covered by the viewport and every bound buffer
    fn raster_bounds(&self, color: &Image, depth: Option<&DepthBuffer>) -> (u32, u32, u32, u32) {
        let (vx, vy, vw, vh) = self.viewport;
        let mut x_end = (vx + vw).min(color.width);
        let mut y_end = (vy + vh).min(color.height);
        if let Some(depth) = depth {
            x_end = x_end.min(depth.width);
            y_end = y_end.min(depth.height);
        }
        (vx, vy, x_end, y_end)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new(SoftwareConfig::default())
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "'{}' has zero size",
                desc.label_or_default()
            )));
        }
        let max_mips = TextureDescriptor::full_mip_count(desc.width, desc.height);
        if desc.mip_levels == 0 || desc.mip_levels > max_mips {
            return Err(BackendError::TextureCreationFailed(format!(
                "'{}' requests {} mips, at most {} fit",
                desc.label_or_default(),
                desc.mip_levels,
                max_mips
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(format!(
                "cube '{}' must be square",
                desc.label_or_default()
            )));
        }
        let id = self.alloc_id();
        log::trace!(
            "SoftwareBackend: creating texture {} '{}' {}x{} ({} mips, {:?})",
            id,
            desc.label_or_default(),
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.dimension
        );
        self.textures.insert(id, SoftTexture::new(desc));
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        data: &[Vec4],
    ) -> BackendResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;
        let layer = Self::layer_for(tex, face)?;
        let format = tex.desc.format;
        let level = tex
            .level_mut(layer, 0)
            .ok_or_else(|| BackendError::InvalidData("missing level 0".to_string()))?;
        if data.len() != level.texels.len() {
            return Err(BackendError::InvalidData(format!(
                "expected {} texels, got {}",
                level.texels.len(),
                data.len()
            )));
        }
        for (dst, src) in level.texels.iter_mut().zip(data) {
            *dst = format.store(*src);
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;
        log::trace!("SoftwareBackend: generating mipmaps for texture {}", texture.0);
        tex.generate_mipmaps();
        self.events.push(BackendEvent::GenerateMipmaps(texture));
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<Vec<Vec4>> {
        let tex = self.texture(texture)?;
        let layer = Self::layer_for(tex, face)?;
        tex.level(layer, mip)
            .map(|level| level.texels.clone())
            .ok_or_else(|| BackendError::ReadbackFailed(format!("mip {} out of range", mip)))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("SoftwareBackend: destroying texture {}", texture.0);
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("SoftwareBackend: texture {} destroyed twice", texture.0);
        }
        for framebuffer in self.framebuffers.values_mut() {
            if framebuffer.color.map(|c| c.texture) == Some(texture) {
                framebuffer.color = None;
            }
        }
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.alloc_id();
        log::trace!("SoftwareBackend: creating framebuffer {}", id);
        self.framebuffers.insert(id, Framebuffer::default());
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        log::trace!("SoftwareBackend: destroying framebuffer {}", framebuffer.0);
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_renderbuffer(&mut self) -> BackendResult<RenderbufferHandle> {
        let id = self.alloc_id();
        log::trace!("SoftwareBackend: creating renderbuffer {}", id);
        self.renderbuffers.insert(id, DepthBuffer::new(0, 0));
        Ok(RenderbufferHandle(id))
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let storage = self
            .renderbuffers
            .get_mut(&renderbuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            })?;
        *storage = DepthBuffer::new(width, height);
        self.events
            .push(BackendEvent::RenderbufferStorage { width, height });
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        log::trace!("SoftwareBackend: destroying renderbuffer {}", renderbuffer.0);
        self.renderbuffers.remove(&renderbuffer.0);
        for framebuffer in self.framebuffers.values_mut() {
            if framebuffer.depth == Some(renderbuffer) {
                framebuffer.depth = None;
            }
        }
    }

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        self.framebuffer_mut(framebuffer)?.depth = Some(renderbuffer);
        Ok(())
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<()> {
        let tex = self.texture(texture)?;
        let layer = Self::layer_for(tex, face)?;
        if mip >= tex.desc.mip_levels {
            return Err(BackendError::InvalidAttachment(format!(
                "mip {} requested on '{}' with {} levels",
                mip,
                tex.desc.label_or_default(),
                tex.desc.mip_levels
            )));
        }
        self.framebuffer_mut(framebuffer)?.color = Some(ColorAttachment {
            texture,
            layer,
            mip,
        });
        self.events
            .push(BackendEvent::AttachColor { texture, face, mip });
        Ok(())
    }

    fn detach_color(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        self.framebuffer_mut(framebuffer)?.color = None;
        self.events.push(BackendEvent::DetachColor);
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
        self.events.push(BackendEvent::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = (x, y, width, height);
        self.events.push(BackendEvent::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn set_depth_compare(&mut self, compare: CompareFunction) {
        self.depth_compare = compare;
    }

    fn clear(&mut self, color: Vec4, flags: ClearFlags) -> BackendResult<()> {
        let (target, mut image, mut depth, format) = self.take_target()?;
        if flags.contains(ClearFlags::COLOR) {
            image.texels.fill(format.store(color));
        }
        if flags.contains(ClearFlags::DEPTH) {
            if let Some(depth) = depth.as_mut() {
                depth.clear(1.0);
            }
        }
        self.restore_target(target, image, depth);
        self.events.push(BackendEvent::Clear(flags));
        Ok(())
    }

    fn create_program(&mut self, desc: &ShaderDescriptor) -> BackendResult<ProgramHandle> {
        let label = desc.label.as_deref().unwrap_or(desc.kind.name());
        validate_wgsl(&desc.source)
            .map_err(|e| BackendError::ShaderCreationFailed(format!("{}: {}", label, e)))?;
        let id = self.alloc_id();
        log::trace!("SoftwareBackend: creating program {} '{}'", id, label);
        self.programs.insert(
            id,
            Program {
                kind: desc.kind,
                uniforms: UniformStore::default(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        log::trace!("SoftwareBackend: destroying program {}", program.0);
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()> {
        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            })?;
        let decl = entry
            .kind
            .uniform(name)
            .ok_or_else(|| BackendError::UnknownUniform {
                program: entry.kind.name(),
                name: name.to_string(),
            })?;
        if !value.matches(decl.ty) {
            return Err(BackendError::UniformTypeMismatch(name.to_string()));
        }
        entry.uniforms.set(decl.name, value);
        self.events.push(BackendEvent::SetUniform {
            name: decl.name,
            value,
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.units.insert(unit, texture);
            }
            None => {
                self.units.remove(&unit);
            }
        }
    }

    fn create_mesh(&mut self, desc: &MeshDescriptor) -> BackendResult<MeshHandle> {
        if desc.vertices.is_empty() {
            return Err(BackendError::MeshCreationFailed(format!(
                "'{}' has no vertices",
                desc.label.unwrap_or("unnamed")
            )));
        }
        let id = self.alloc_id();
        log::trace!(
            "SoftwareBackend: creating mesh {} ({:?}, {} vertices)",
            id,
            desc.primitive,
            desc.vertices.len()
        );
        self.meshes.insert(
            id,
            SoftMesh {
                primitive: desc.primitive,
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        log::trace!("SoftwareBackend: destroying mesh {}", mesh.0);
        self.meshes.remove(&mesh.0);
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> BackendResult<()> {
        let program = self.current_program.ok_or(BackendError::NoProgramBound)?;
        let kind = self
            .programs
            .get(&program.0)
            .map(|p| p.kind)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            })?;
        let primitive = self
            .meshes
            .get(&mesh.0)
            .map(|m| m.primitive)
            .ok_or(BackendError::InvalidHandle {
                kind: "mesh",
                id: mesh.0,
            })?;

        let (target, mut color, mut depth, format) = self.take_target()?;
        let (x0, y0, x_end, y_end) = self.raster_bounds(&color, depth.as_ref());
        let (vx, vy, vw, vh) = self.viewport;
        let compare = self.depth_compare;

        if let Some(program) = self.programs.get(&program.0) {
            let ctx = ShadingContext {
                config: &self.config,
                uniforms: &program.uniforms,
                textures: &self.textures,
                units: &self.units,
            };
            for py in y0..y_end {
                for px in x0..x_end {
                    let ndc = Vec2::new(
                        ((px - vx) as f32 + 0.5) / vw as f32 * 2.0 - 1.0,
                        ((py - vy) as f32 + 0.5) / vh as f32 * 2.0 - 1.0,
                    );
                    let Some(frag) = programs::rasterize(kind, primitive, ndc, &program.uniforms)
                    else {
                        continue;
                    };
                    if let Some(depth) = depth.as_mut() {
                        if !compare.passes(frag.depth, depth.get(px, py)) {
                            continue;
                        }
                        depth.set(px, py, frag.depth);
                    }
                    let value = programs::shade(kind, &frag, &ctx);
                    color.set(px, py, format.store(value));
                }
            }
        }

        self.restore_target(target, color, depth);
        self.events.push(BackendEvent::Draw {
            program: kind,
            primitive,
        });
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> BackendResult<()> {
        log::debug!("SoftwareBackend: resizing surface to {}x{}", width, height);
        self.surface = Image::new(width, height);
        self.surface_depth = DepthBuffer::new(width, height);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn read_surface(&mut self) -> BackendResult<Vec<Vec4>> {
        Ok(self.surface.texels.clone())
    }

    fn live_resources(&self) -> LiveResources {
        LiveResources {
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            renderbuffers: self.renderbuffers.len(),
            programs: self.programs.len(),
            meshes: self.meshes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MeshData;
    use crate::shader::ShaderLibrary;

    fn backend() -> SoftwareBackend {
        SoftwareBackend::new(SoftwareConfig::preview())
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut b = backend();
        let desc = TextureDescriptor::texture_2d("t", 4, 4, TextureFormat::Rgba16Float);
        let first = b.create_texture(&desc).unwrap();
        b.destroy_texture(first);
        let second = b.create_texture(&desc).unwrap();
        assert_ne!(first, second);
        assert_eq!(b.live_resources().textures, 1);
    }

    #[test]
    fn test_attach_rejects_missing_mip_and_face() {
        let mut b = backend();
        let fb = b.create_framebuffer().unwrap();
        let cube = b
            .create_texture(&TextureDescriptor::cube("c", 8, 1, TextureFormat::Rgba16Float))
            .unwrap();
        assert!(matches!(
            b.attach_color(fb, cube, Some(CubeFace::PositiveX), 1),
            Err(BackendError::InvalidAttachment(_))
        ));
        assert!(matches!(
            b.attach_color(fb, cube, None, 0),
            Err(BackendError::InvalidAttachment(_))
        ));
        assert!(b.attach_color(fb, cube, Some(CubeFace::NegativeZ), 0).is_ok());
    }

    #[test]
    fn test_clear_writes_attachment_only() {
        let mut b = backend();
        let fb = b.create_framebuffer().unwrap();
        let tex = b
            .create_texture(&TextureDescriptor::texture_2d("t", 2, 2, TextureFormat::Rg16Float))
            .unwrap();
        b.attach_color(fb, tex, None, 0).unwrap();
        b.bind_framebuffer(Some(fb));
        b.clear(Vec4::new(0.25, 0.5, 0.75, 1.0), ClearFlags::ALL).unwrap();
        let texels = b.read_texture(tex, None, 0).unwrap();
        assert!(texels.iter().all(|t| *t == Vec4::new(0.25, 0.5, 0.0, 1.0)));
        assert!(b.read_surface().unwrap().iter().all(|t| *t == Vec4::ZERO));
    }

    #[test]
    fn test_unknown_uniform_is_an_error() {
        let mut b = backend();
        let library = ShaderLibrary::builtin();
        let program = b
            .create_program(&library.descriptor(ProgramKind::BrdfIntegration))
            .unwrap();
        assert!(matches!(
            b.set_uniform(program, "roughness", UniformValue::Float(0.5)),
            Err(BackendError::UnknownUniform { .. })
        ));
    }

    #[test]
    fn test_quad_draw_covers_viewport() {
        let mut b = backend();
        let library = ShaderLibrary::builtin();
        let program = b
            .create_program(&library.descriptor(ProgramKind::BrdfIntegration))
            .unwrap();
        let quad = MeshData::quad();
        let mesh = b.create_mesh(&quad.descriptor()).unwrap();
        let lut = b
            .create_texture(&TextureDescriptor::texture_2d("lut", 8, 8, TextureFormat::Rg16Float))
            .unwrap();
        let fb = b.create_framebuffer().unwrap();
        b.attach_color(fb, lut, None, 0).unwrap();
        b.bind_framebuffer(Some(fb));
        b.set_viewport(0, 0, 8, 8);
        b.use_program(Some(program));
        b.draw_mesh(mesh).unwrap();
        let texels = b.read_texture(lut, None, 0).unwrap();
        assert!(texels.iter().all(|t| t.x > 0.0 && t.z == 0.0));
    }
}
