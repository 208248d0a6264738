//! Texture loading and management

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use glam::Vec4;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Floating-point equirectangular environment, row 0 at the bottom
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<f32>,
    pub name: String,
}

impl HdrImage {
    /// Decode an HDR file, flipped so the first row is the bottom of the image
    pub fn load<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| {
            RenderError::resource_missing(format!("HDR image '{}': {}", path.display(), e))
        })?;
        let image = Self::from_image(img.flipv(), &name);
        if image.is_empty() {
            return Err(RenderError::resource_missing(format!(
                "HDR image '{}' decoded to no pixels",
                path.display()
            )));
        }
        log::info!(
            "Loaded HDR image '{}' ({}x{})",
            image.name,
            image.width,
            image.height
        );
        Ok(image)
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let rgb = img.into_rgb32f();
        Self {
            width,
            height,
            channels: 3,
            data: rgb.into_raw(),
            name: name.to_string(),
        }
    }

    /// A 1x1 source of constant radiance
    pub fn uniform(radiance: glam::Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            channels: 3,
            data: radiance.to_array().to_vec(),
            name: "uniform".to_string(),
        }
    }

    pub fn from_rgb(width: u32, height: u32, data: Vec<f32>, name: &str) -> Self {
        Self {
            width,
            height,
            channels: 3,
            data,
            name: name.to_string(),
        }
    }

    /// Pixel count, `None` when it does not fit in memory
    fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    pub fn is_empty(&self) -> bool {
        let needed = self
            .pixel_count()
            .and_then(|pixels| pixels.checked_mul(self.channels as usize));
        match needed {
            Some(needed) => needed == 0 || self.data.len() < needed,
            None => true,
        }
    }

    /// Expand to RGBA texels with alpha 1
    pub fn to_rgba(&self) -> Vec<Vec4> {
        let channels = self.channels.max(1) as usize;
        self.data
            .chunks_exact(channels)
            .take(self.pixel_count().unwrap_or(0))
            .map(|px| match px {
                [l] => Vec4::new(*l, *l, *l, 1.0),
                [r, g] => Vec4::new(*r, *g, 0.0, 1.0),
                [r, g, b] => Vec4::new(*r, *g, *b, 1.0),
                [r, g, b, a, ..] => Vec4::new(*r, *g, *b, *a),
                [] => Vec4::W,
            })
            .collect()
    }
}

/// Loaded 8-bit texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| {
            RenderError::resource_missing(format!("texture '{}': {}", path.display(), e))
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> RenderResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| RenderError::resource_missing(format!("texture '{}': {}", name, e)))?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let data = img.to_rgba8().into_raw();
        Self {
            width,
            height,
            data,
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Tangent-space normal map pointing straight out of the surface
    pub fn flat_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "flat_normal")
    }

    pub fn to_rgba(&self) -> Vec<Vec4> {
        self.data
            .chunks_exact(4)
            .map(|px| {
                Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32) / 255.0
            })
            .collect()
    }
}

/// A texture or cubemap owned on the backend.
///
/// Size, format and mip count are fixed at creation; changing any of them
/// means creating a new texture. Release it with [`GpuTexture::release`].
#[derive(Debug)]
pub struct GpuTexture {
    handle: TextureHandle,
    desc: TextureDescriptor,
}

impl GpuTexture {
    pub fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        desc: TextureDescriptor,
    ) -> RenderResult<Self> {
        let handle = backend.create_texture(&desc)?;
        Ok(Self { handle, desc })
    }

    /// Upload an equirectangular HDR image as a 2D float texture
    pub fn from_hdr<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        image: &HdrImage,
    ) -> RenderResult<Self> {
        if image.is_empty() {
            return Err(RenderError::resource_missing(format!(
                "HDR image '{}' is empty",
                image.name
            )));
        }
        let texture = Self::create(
            backend,
            TextureDescriptor::texture_2d(
                &image.name,
                image.width,
                image.height,
                TextureFormat::Rgba32Float,
            ),
        )?;
        if let Err(e) = backend.write_texture(texture.handle, None, &image.to_rgba()) {
            texture.release(backend);
            return Err(e.into());
        }
        Ok(texture)
    }

    /// Upload an 8-bit texture with a full, repeating mip chain
    pub fn from_data<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        data: &TextureData,
    ) -> RenderResult<Self> {
        let desc = TextureDescriptor::texture_2d(
            &data.name,
            data.width,
            data.height,
            TextureFormat::Rgba8Unorm,
        )
        .with_mip_levels(TextureDescriptor::full_mip_count(data.width, data.height))
        .with_sampler(SamplerDescriptor::trilinear().repeat());
        let texture = Self::create(backend, desc)?;
        let uploaded = backend
            .write_texture(texture.handle, None, &data.to_rgba())
            .and_then(|_| backend.generate_mipmaps(texture.handle));
        if let Err(e) = uploaded {
            texture.release(backend);
            return Err(e.into());
        }
        Ok(texture)
    }

    /// Build a cubemap from six square face images in `CubeFace::ALL` order
    pub fn cube_from_faces<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        faces: &[TextureData; 6],
    ) -> RenderResult<Self> {
        let size = faces[0].width;
        if let Some(bad) = faces
            .iter()
            .find(|f| f.width != size || f.height != size)
        {
            return Err(RenderError::configuration(format!(
                "cubemap '{}' face '{}' is {}x{}, expected {}x{}",
                label, bad.name, bad.width, bad.height, size, size
            )));
        }
        let texture = Self::create(
            backend,
            TextureDescriptor::cube(label, size, 1, TextureFormat::Rgba8Unorm),
        )?;
        for (face, data) in CubeFace::ALL.iter().zip(faces.iter()) {
            if let Err(e) = backend.write_texture(texture.handle, Some(*face), &data.to_rgba()) {
                texture.release(backend);
                return Err(e.into());
            }
        }
        Ok(texture)
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn name(&self) -> &str {
        self.desc.label_or_default()
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    /// Whether the mip chain reaches 1x1
    pub fn has_full_mip_chain(&self) -> bool {
        self.desc.mip_levels >= TextureDescriptor::full_mip_count(self.desc.width, self.desc.height)
    }

    pub fn is_cube(&self) -> bool {
        self.desc.dimension == TextureDimension::Cube
    }

    pub fn mip_size(&self, mip: u32) -> (u32, u32) {
        self.desc.mip_size(mip)
    }

    /// Whether `(face, mip)` names a level this texture was created with
    pub fn has_level(&self, face: Option<CubeFace>, mip: u32) -> bool {
        let face_ok = match face {
            Some(_) => self.is_cube(),
            None => !self.is_cube(),
        };
        face_ok && mip < self.desc.mip_levels
    }

    pub fn read<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        face: Option<CubeFace>,
        mip: u32,
    ) -> RenderResult<Vec<Vec4>> {
        Ok(backend.read_texture(self.handle, face, mip)?)
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        log::trace!("Releasing texture '{}'", self.name());
        backend.destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SoftwareBackend, SoftwareConfig};

    #[test]
    fn test_missing_hdr_is_resource_missing() {
        let err = HdrImage::load("does/not/exist.hdr").unwrap_err();
        assert!(matches!(err, RenderError::ResourceMissing(_)));
    }

    #[test]
    fn test_uniform_hdr() {
        let img = HdrImage::uniform(glam::Vec3::new(1.0, 2.0, 3.0));
        assert!(!img.is_empty());
        assert_eq!(img.to_rgba(), vec![Vec4::new(1.0, 2.0, 3.0, 1.0)]);
    }

    #[test]
    fn test_empty_hdr_is_rejected() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let empty = HdrImage::from_rgb(0, 0, Vec::new(), "empty");
        assert!(GpuTexture::from_hdr(&mut backend, &empty).is_err());
        assert_eq!(backend.live_resources().textures, 0);
    }

    #[test]
    fn test_oversized_hdr_is_empty() {
        let huge = HdrImage::from_rgb(65536, 65536, Vec::new(), "huge");
        assert!(huge.is_empty());
        assert!(huge.to_rgba().is_empty());

        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let err = GpuTexture::from_hdr(&mut backend, &huge).unwrap_err();
        assert!(matches!(err, RenderError::ResourceMissing(_)));
        assert_eq!(backend.live_resources().textures, 0);

        let short = HdrImage::from_rgb(2, 2, vec![1.0; 11], "short");
        assert!(short.is_empty());
    }

    #[test]
    fn test_levels() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let cube = GpuTexture::create(
            &mut backend,
            TextureDescriptor::cube("c", 16, 3, TextureFormat::Rgba16Float),
        )
        .unwrap();
        assert!(cube.has_level(Some(CubeFace::NegativeY), 2));
        assert!(!cube.has_level(Some(CubeFace::NegativeY), 3));
        assert!(!cube.has_level(None, 0));
        assert_eq!(cube.mip_size(2), (4, 4));
        assert!(!cube.has_full_mip_chain());
        cube.release(&mut backend);
        assert_eq!(backend.live_resources().textures, 0);
    }

    #[test]
    fn test_material_texture_mips() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let data = TextureData {
            width: 4,
            height: 4,
            data: vec![255; 64],
            name: "white".to_string(),
        };
        let tex = GpuTexture::from_data(&mut backend, &data).unwrap();
        assert_eq!(tex.mip_levels(), 3);
        let last = tex.read(&mut backend, None, 2).unwrap();
        assert_eq!(last, vec![Vec4::ONE]);
    }

    #[test]
    fn test_cube_from_mismatched_faces() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let mut faces: [TextureData; 6] =
            std::array::from_fn(|_| TextureData::solid_color([10, 20, 30, 255], "face"));
        faces[3] = TextureData {
            width: 2,
            height: 2,
            data: vec![0; 16],
            name: "big".to_string(),
        };
        let err = GpuTexture::cube_from_faces(&mut backend, "sky", &faces).unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
    }
}
