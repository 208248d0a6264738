//! Image-based lighting precompute
//!
//! Converts an equirectangular HDR source into the four resources the
//! shading pass samples: an environment cubemap, a diffuse irradiance
//! cubemap, a roughness-prefiltered specular cubemap and a BRDF lookup
//! table. Every stage renders through one shared [`RenderTarget`].

pub mod brdf;
pub mod capture;
pub mod environment;
pub mod irradiance;
pub mod pipeline;
pub mod prefilter;
pub mod render_target;

pub use capture::{render_to_cube, CaptureGeometry};
pub use pipeline::{IblPipeline, IblSource, IblState};
pub use prefilter::{PrefilterLevel, RoughnessMipSeries};
pub use render_target::RenderTarget;

use static_assertions::const_assert;

use crate::backend::{GraphicsBackend, ProgramKind};
use crate::resources::GpuTexture;
use crate::shader::{ShaderLibrary, ShaderProgram};

/// Edge length of the captured environment cubemap
pub const ENVIRONMENT_SIZE: u32 = 512;
/// Edge length of the irradiance cubemap
pub const IRRADIANCE_SIZE: u32 = 32;
/// Edge length of mip 0 of the prefiltered cubemap
pub const PREFILTER_SIZE: u32 = 128;
/// Mip levels of the prefiltered cubemap, one per roughness step
pub const PREFILTER_MIP_LEVELS: u32 = 5;
/// Edge length of the BRDF integration lookup table
pub const BRDF_LUT_SIZE: u32 = 512;

// Roughness is mip / (levels - 1)
const_assert!(PREFILTER_MIP_LEVELS > 1);
const_assert!(PREFILTER_SIZE >> (PREFILTER_MIP_LEVELS - 1) >= 1);

/// Texture unit every precompute program samples its input from
pub const SOURCE_UNIT: u32 = 0;

/// The four outputs of the precompute chain.
///
/// A slot stays `None` when its stage has not run or could not complete.
#[derive(Debug, Default)]
pub struct IblResources {
    pub environment: Option<GpuTexture>,
    pub irradiance: Option<GpuTexture>,
    pub prefilter: Option<GpuTexture>,
    pub brdf_lut: Option<GpuTexture>,
}

impl IblResources {
    /// Whether every output has been produced
    pub fn is_complete(&self) -> bool {
        self.environment.is_some()
            && self.irradiance.is_some()
            && self.prefilter.is_some()
            && self.brdf_lut.is_some()
    }

    /// Number of outputs currently held
    pub fn count(&self) -> usize {
        [
            &self.environment,
            &self.irradiance,
            &self.prefilter,
            &self.brdf_lut,
        ]
        .iter()
        .filter(|t| t.is_some())
        .count()
    }

    /// Release every held output, leaving all slots empty
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for texture in [
            self.environment.take(),
            self.irradiance.take(),
            self.prefilter.take(),
            self.brdf_lut.take(),
        ]
        .into_iter()
        .flatten()
        {
            texture.release(backend);
        }
    }
}

/// Programs used by the precompute stages
#[derive(Debug)]
pub struct IblPrograms {
    pub equirect: ShaderProgram,
    pub irradiance: ShaderProgram,
    pub prefilter: ShaderProgram,
    pub brdf: ShaderProgram,
}

impl IblPrograms {
    /// Compile all four; a failed one is kept in its unusable state
    pub fn compile<B: GraphicsBackend + ?Sized>(backend: &mut B, library: &ShaderLibrary) -> Self {
        Self {
            equirect: library.compile(backend, ProgramKind::EquirectToCubemap),
            irradiance: library.compile(backend, ProgramKind::IrradianceConvolution),
            prefilter: library.compile(backend, ProgramKind::SpecularPrefilter),
            brdf: library.compile(backend, ProgramKind::BrdfIntegration),
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.equirect.release(backend);
        self.irradiance.release(backend);
        self.prefilter.release(backend);
        self.brdf.release(backend);
    }
}

/// A stage cannot draw through a program that failed to compile
pub(crate) fn require_program(program: &ShaderProgram) -> crate::error::RenderResult<()> {
    if program.is_valid() {
        Ok(())
    } else {
        Err(crate::error::RenderError::Driver(format!(
            "program '{}' is unusable",
            program.name()
        )))
    }
}
