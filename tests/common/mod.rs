//! Shared helpers for the integration suites.
//!
//! Every backend-parameterised test asks [`Backend::create`] for a device and
//! returns early when that backend is not available in this build or on
//! this machine.

#![allow(dead_code)]

use glam::{Vec3, Vec4};
use pbr_ibl::backend::{GraphicsBackend, SoftwareBackend, SoftwareConfig};
use pbr_ibl::resources::HdrImage;

/// Surface size used by every test scene
pub const SURFACE_WIDTH: u32 = 64;
pub const SURFACE_HEIGHT: u32 = 48;

/// Backends the suites run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Software,
    Wgpu,
}

impl Backend {
    pub fn create(self) -> Option<Box<dyn GraphicsBackend>> {
        let _ = env_logger::builder().is_test(true).try_init();
        match self {
            Backend::Software => Some(Box::new(SoftwareBackend::new(SoftwareConfig::preview()))),
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => match pbr_ibl::WgpuBackend::new(SURFACE_WIDTH, SURFACE_HEIGHT) {
                Ok(backend) => Some(Box::new(backend)),
                Err(e) => {
                    eprintln!("wgpu backend unavailable: {}", e);
                    None
                }
            },
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => None,
        }
    }

    /// Storage of the float targets differs per backend (f32 vs f16)
    pub fn tolerance(self) -> f32 {
        match self {
            Backend::Software => 1e-3,
            Backend::Wgpu => 2e-2,
        }
    }
}

pub fn software() -> SoftwareBackend {
    let _ = env_logger::builder().is_test(true).try_init();
    SoftwareBackend::new(SoftwareConfig::preview())
}

/// Constant radiance everywhere
pub fn uniform_source(radiance: Vec3) -> HdrImage {
    HdrImage::uniform(radiance)
}

/// Ramp across u from 0.1 to 4.1: brightest towards +Z, darkest towards -Z,
/// with the wrap seam along -X
pub fn gradient_source(width: u32, height: u32) -> HdrImage {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..height {
        for x in 0..width {
            let v = 0.1 + 4.0 * (x as f32 / (width - 1).max(1) as f32);
            data.extend_from_slice(&[v, v, v]);
        }
    }
    HdrImage::from_rgb(width, height, data, "gradient")
}

/// Largest per-channel (rgb) deviation from `expected` relative to its magnitude
pub fn max_relative_error(texels: &[Vec4], expected: Vec3) -> f32 {
    texels
        .iter()
        .map(|t| {
            let diff = (t.truncate() - expected).abs();
            (diff / expected.abs().max(Vec3::splat(1e-3))).max_element()
        })
        .fold(0.0, f32::max)
}

/// Texel of a bottom-row-first image
pub fn pixel(texels: &[Vec4], width: u32, x: u32, y: u32) -> Vec4 {
    texels[(y * width + x) as usize]
}
