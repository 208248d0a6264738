//! PBR IBL - Physically based rendering with image-based lighting
//!
//! Turns an equirectangular HDR environment into the resources a
//! split-sum PBR shading pass samples, and renders a scene with them.
//!
//! Two backends implement the same immediate-mode [`GraphicsBackend`] seam:
//! - **software**: CPU reference that runs every program per pixel (always available)
//! - **wgpu**: headless GPU backend running the WGSL programs (`wgpu-backend` feature)
//!
//! # Features
//! - Environment capture, irradiance convolution, GGX prefiltering and BRDF LUT integration
//! - Resumable precompute that can be spread across frames
//! - Scene with explicit registries, point lights, PBR materials and a fly camera
//! - WGSL programs validated with naga on every backend

pub mod backend;
pub mod error;
pub mod ibl;
pub mod resources;
pub mod scene;
pub mod shader;

pub use backend::{GraphicsBackend, SoftwareBackend, SoftwareConfig};
#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuBackend;
pub use error::{RenderError, RenderResult};
pub use ibl::{IblPipeline, IblResources, IblState};
pub use scene::{Scene, SceneConfig};

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// CPU reference backend, no GPU needed
    #[default]
    Software,
    /// wgpu backend on a headless device
    Wgpu,
}

/// Create a backend of the requested type
pub fn create_backend(
    backend: BackendType,
    config: SoftwareConfig,
) -> RenderResult<Box<dyn GraphicsBackend>> {
    match backend {
        BackendType::Software => Ok(Box::new(SoftwareBackend::new(config))),
        #[cfg(feature = "wgpu-backend")]
        BackendType::Wgpu => Ok(Box::new(WgpuBackend::new(
            config.surface_width,
            config.surface_height,
        )?)),
        #[cfg(not(feature = "wgpu-backend"))]
        BackendType::Wgpu => Err(RenderError::configuration(
            "built without the `wgpu-backend` feature",
        )),
    }
}
