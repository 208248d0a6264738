//! Shared offscreen framebuffer for the precompute passes

use crate::backend::traits::*;
use crate::backend::types::CubeFace;
use crate::error::{RenderError, RenderResult};
use crate::resources::GpuTexture;

/// A framebuffer with a depth renderbuffer, re-pointed at a different
/// texture level for every pass.
///
/// Passes must run between [`RenderTarget::begin`] and [`RenderTarget::end`]
/// and never interleave.
#[derive(Debug)]
pub struct RenderTarget {
    framebuffer: FramebufferHandle,
    depth: RenderbufferHandle,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let framebuffer = backend.create_framebuffer()?;
        let depth = match backend.create_renderbuffer() {
            Ok(depth) => depth,
            Err(e) => {
                backend.destroy_framebuffer(framebuffer);
                return Err(e.into());
            }
        };
        let target = Self {
            framebuffer,
            depth,
            width,
            height,
        };
        let configured = backend
            .renderbuffer_storage(depth, width, height)
            .and_then(|_| backend.attach_depth(framebuffer, depth));
        if let Err(e) = configured {
            target.release(backend);
            return Err(e.into());
        }
        log::debug!("Created render target {}x{}", width, height);
        Ok(target)
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bind the framebuffer for a pass
    pub fn begin<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.bind_framebuffer(Some(self.framebuffer));
    }

    /// Point the colour attachment at one level of `texture`.
    ///
    /// A face or mip the texture was not created with is a configuration
    /// error: it is logged, the attachment is left unchanged and the caller
    /// should skip the draw.
    pub fn attach<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        texture: &GpuTexture,
        face: Option<CubeFace>,
        mip: u32,
    ) -> RenderResult<()> {
        if !texture.has_level(face, mip) {
            let err = RenderError::configuration(format!(
                "'{}' has no level {} for face {}",
                texture.name(),
                mip,
                face.map_or("none", |f| f.label())
            ));
            log::warn!("{}", err);
            return Err(err);
        }
        backend
            .attach_color(self.framebuffer, texture.handle(), face, mip)
            .map_err(|e| {
                let err = RenderError::configuration(e.to_string());
                log::warn!("{}", err);
                err
            })
    }

    /// Reallocate depth storage and set the viewport to match
    pub fn resize<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        backend.renderbuffer_storage(self.depth, width, height)?;
        backend.set_viewport(0, 0, width, height);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Detach the colour level and rebind the default framebuffer
    pub fn end<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        if let Err(e) = backend.detach_color(self.framebuffer) {
            log::warn!("Render target detach failed: {}", e);
        }
        backend.bind_framebuffer(None);
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_framebuffer(self.framebuffer);
        backend.destroy_renderbuffer(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendEvent, SoftwareBackend, SoftwareConfig, TextureDescriptor, TextureFormat};

    #[test]
    fn test_attach_missing_mip_is_skipped() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let target = RenderTarget::new(&mut backend, 8, 8).unwrap();
        let cube = GpuTexture::create(
            &mut backend,
            TextureDescriptor::cube("irradiance", 8, 1, TextureFormat::Rgba16Float),
        )
        .unwrap();
        backend.take_events();

        let err = target
            .attach(&mut backend, &cube, Some(CubeFace::PositiveX), 3)
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(backend.take_events().is_empty());

        target
            .attach(&mut backend, &cube, Some(CubeFace::PositiveX), 0)
            .unwrap();
        cube.release(&mut backend);
        target.release(&mut backend);
        assert_eq!(backend.live_resources().total(), 0);
    }

    #[test]
    fn test_resize_sets_viewport() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let mut target = RenderTarget::new(&mut backend, 512, 512).unwrap();
        backend.take_events();
        target.resize(&mut backend, 64, 64).unwrap();
        assert_eq!(
            backend.take_events(),
            vec![
                BackendEvent::RenderbufferStorage {
                    width: 64,
                    height: 64
                },
                BackendEvent::Viewport {
                    x: 0,
                    y: 0,
                    width: 64,
                    height: 64
                },
            ]
        );
        assert_eq!(target.size(), (64, 64));
        target.release(&mut backend);
    }
}
