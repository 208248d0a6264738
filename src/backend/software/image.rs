//! CPU texel storage and filtering
//!
//! Images are stored row 0 first, which is the bottom row in GL window
//! coordinates. Texel centers sit at half-integer coordinates, so `uv`
//! `(0.5 / w, 0.5 / h)` hits texel `(0, 0)` exactly.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::types::{
    AddressMode, CubeFace, FilterMode, TextureDescriptor, TextureDimension,
};

/// One RGBA level
#[derive(Debug, Clone, Default)]
pub(crate) struct Image {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Vec4>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Vec4::ZERO)
    }

    pub fn filled(width: u32, height: u32, value: Vec4) -> Self {
        Self {
            width,
            height,
            texels: vec![value; (width as usize) * (height as usize)],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.texels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let i = self.index(x, y);
        self.texels[i] = value;
    }

    fn fetch(&self, x: i32, y: i32, address: AddressMode) -> Vec4 {
        let (w, h) = (self.width as i32, self.height as i32);
        let (x, y) = match address {
            AddressMode::ClampToEdge => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
            AddressMode::Repeat => (x.rem_euclid(w), y.rem_euclid(h)),
        };
        self.get(x as u32, y as u32)
    }

    pub fn sample(&self, uv: Vec2, filter: FilterMode, address: AddressMode) -> Vec4 {
        if self.texels.is_empty() {
            return Vec4::ZERO;
        }
        let x = uv.x * self.width as f32;
        let y = uv.y * self.height as f32;
        match filter {
            FilterMode::Nearest => self.fetch(x.floor() as i32, y.floor() as i32, address),
            FilterMode::Linear => {
                let x = x - 0.5;
                let y = y - 0.5;
                let x0 = x.floor();
                let y0 = y.floor();
                let fx = x - x0;
                let fy = y - y0;
                let (x0, y0) = (x0 as i32, y0 as i32);
                let top = self
                    .fetch(x0, y0, address)
                    .lerp(self.fetch(x0 + 1, y0, address), fx);
                let bottom = self
                    .fetch(x0, y0 + 1, address)
                    .lerp(self.fetch(x0 + 1, y0 + 1, address), fx);
                top.lerp(bottom, fy)
            }
        }
    }

    /// 2x2 box filter down to the next mip size
    pub fn downsample(&self) -> Image {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut out = Image::new(width, height);
        let max_x = self.width.saturating_sub(1);
        let max_y = self.height.saturating_sub(1);
        for y in 0..height {
            for x in 0..width {
                let sx = (x * 2).min(max_x);
                let sy = (y * 2).min(max_y);
                let sx1 = (sx + 1).min(max_x);
                let sy1 = (sy + 1).min(max_y);
                let sum = self.get(sx, sy) + self.get(sx1, sy) + self.get(sx, sy1) + self.get(sx1, sy1);
                out.set(x, y, sum * 0.25);
            }
        }
        out
    }
}

/// Depth renderbuffer storage
#[derive(Debug, Clone, Default)]
pub(crate) struct DepthBuffer {
    pub width: u32,
    pub height: u32,
    values: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![1.0; (width as usize) * (height as usize)],
        }
    }

    pub fn clear(&mut self, depth: f32) {
        self.values.fill(depth);
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        let i = (y as usize) * (self.width as usize) + x as usize;
        self.values[i] = depth;
    }
}

/// A texture: one mip chain per layer (six layers for cubes)
#[derive(Debug, Clone)]
pub(crate) struct SoftTexture {
    pub desc: TextureDescriptor,
    pub layers: Vec<Vec<Image>>,
}

impl SoftTexture {
    pub fn new(desc: &TextureDescriptor) -> Self {
        let layers = (0..desc.dimension.layers())
            .map(|_| {
                (0..desc.mip_levels)
                    .map(|mip| {
                        let (w, h) = desc.mip_size(mip);
                        Image::new(w, h)
                    })
                    .collect()
            })
            .collect();
        Self {
            desc: desc.clone(),
            layers,
        }
    }

    pub fn is_cube(&self) -> bool {
        self.desc.dimension == TextureDimension::Cube
    }

    pub fn level(&self, layer: usize, mip: u32) -> Option<&Image> {
        self.layers.get(layer)?.get(mip as usize)
    }

    pub fn level_mut(&mut self, layer: usize, mip: u32) -> Option<&mut Image> {
        self.layers.get_mut(layer)?.get_mut(mip as usize)
    }

    pub fn generate_mipmaps(&mut self) {
        for chain in &mut self.layers {
            for mip in 1..chain.len() {
                let next = chain[mip - 1].downsample();
                chain[mip] = next;
            }
        }
    }

    fn sample_layer(&self, layer: usize, uv: Vec2, lod: f32) -> Vec4 {
        let Some(chain) = self.layers.get(layer) else {
            return Vec4::ZERO;
        };
        let sampler = &self.desc.sampler;
        let filter = if lod > 0.0 {
            sampler.min_filter
        } else {
            sampler.mag_filter
        };
        let address = sampler.address_mode;
        let max_level = (chain.len() - 1) as f32;
        match sampler.mipmap_filter {
            None => chain[0].sample(uv, filter, address),
            Some(FilterMode::Nearest) => {
                let level = lod.round().clamp(0.0, max_level) as usize;
                chain[level].sample(uv, filter, address)
            }
            Some(FilterMode::Linear) => {
                let lod = lod.clamp(0.0, max_level);
                let l0 = lod.floor() as usize;
                let l1 = (l0 + 1).min(chain.len() - 1);
                let t = lod - l0 as f32;
                let a = chain[l0].sample(uv, filter, address);
                if l1 == l0 || t == 0.0 {
                    a
                } else {
                    a.lerp(chain[l1].sample(uv, filter, address), t)
                }
            }
        }
    }

    pub fn sample_2d(&self, uv: Vec2, lod: f32) -> Vec4 {
        if self.is_cube() {
            return Vec4::ZERO;
        }
        self.sample_layer(0, uv, lod)
    }

    pub fn sample_cube(&self, dir: Vec3, lod: f32) -> Vec4 {
        if !self.is_cube() {
            return Vec4::ZERO;
        }
        let (face, uv) = cube_face_uv(dir);
        self.sample_layer(face.index(), uv, lod)
    }
}

/// Select the cube face hit by `dir` and the `(s, t)` coordinates on it,
/// following the GL major-axis table.
pub(crate) fn cube_face_uv(dir: Vec3) -> (CubeFace, Vec2) {
    let a = dir.abs();
    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if dir.x >= 0.0 {
            (CubeFace::PositiveX, -dir.z, -dir.y, a.x)
        } else {
            (CubeFace::NegativeX, dir.z, -dir.y, a.x)
        }
    } else if a.y >= a.z {
        if dir.y >= 0.0 {
            (CubeFace::PositiveY, dir.x, dir.z, a.y)
        } else {
            (CubeFace::NegativeY, dir.x, -dir.z, a.y)
        }
    } else if dir.z >= 0.0 {
        (CubeFace::PositiveZ, dir.x, -dir.y, a.z)
    } else {
        (CubeFace::NegativeZ, -dir.x, -dir.y, a.z)
    };
    if ma <= 0.0 {
        return (CubeFace::PositiveX, Vec2::splat(0.5));
    }
    (face, Vec2::new(sc / ma, tc / ma) * 0.5 + 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{SamplerDescriptor, TextureFormat};

    #[test]
    fn test_bilinear_hits_texel_centers() {
        let mut img = Image::new(2, 1);
        img.set(0, 0, Vec4::ZERO);
        img.set(1, 0, Vec4::ONE);
        let left = img.sample(Vec2::new(0.25, 0.5), FilterMode::Linear, AddressMode::ClampToEdge);
        let mid = img.sample(Vec2::new(0.5, 0.5), FilterMode::Linear, AddressMode::ClampToEdge);
        assert_eq!(left, Vec4::ZERO);
        assert!((mid.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_downsample_averages() {
        let mut img = Image::new(2, 2);
        img.set(0, 0, Vec4::splat(1.0));
        img.set(1, 1, Vec4::splat(3.0));
        let half = img.downsample();
        assert_eq!((half.width, half.height), (1, 1));
        assert_eq!(half.get(0, 0), Vec4::splat(1.0));
    }

    #[test]
    fn test_cube_face_selection() {
        for face in CubeFace::ALL {
            let (hit, uv) = cube_face_uv(face.forward());
            assert_eq!(hit, face);
            assert!(uv.abs_diff_eq(Vec2::splat(0.5), 1e-6));
        }
        let (_, uv) = cube_face_uv(Vec3::ZERO);
        assert_eq!(uv, Vec2::splat(0.5));
    }

    #[test]
    fn test_trilinear_blends_levels() {
        let desc = TextureDescriptor::texture_2d("t", 2, 2, TextureFormat::Rgba16Float)
            .with_mip_levels(2)
            .with_sampler(SamplerDescriptor::trilinear());
        let mut tex = SoftTexture::new(&desc);
        tex.layers[0][0] = Image::filled(2, 2, Vec4::ZERO);
        tex.layers[0][1] = Image::filled(1, 1, Vec4::ONE);
        let v = tex.sample_2d(Vec2::splat(0.5), 0.5);
        assert!((v.x - 0.5).abs() < 1e-6);
        assert_eq!(tex.sample_cube(Vec3::X, 0.0), Vec4::ZERO);
    }
}
