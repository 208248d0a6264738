//! Roughness-prefiltered specular cubemap

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{SamplerDescriptor, TextureDescriptor, TextureFormat};
use crate::error::{RenderError, RenderResult};
use crate::ibl::{
    render_to_cube, require_program, CaptureGeometry, RenderTarget, PREFILTER_MIP_LEVELS,
    PREFILTER_SIZE, SOURCE_UNIT,
};
use crate::resources::{GpuMesh, GpuTexture};
use crate::shader::ShaderProgram;

/// One prefiltered mip level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefilterLevel {
    pub mip: u32,
    pub size: u32,
    pub roughness: f32,
}

/// Mip index to roughness mapping, `roughness = mip / (levels - 1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoughnessMipSeries {
    base_size: u32,
    levels: u32,
}

impl RoughnessMipSeries {
    pub fn new(base_size: u32, levels: u32) -> RenderResult<Self> {
        if levels < 2 {
            return Err(RenderError::configuration(format!(
                "prefilter needs at least 2 mip levels, got {}",
                levels
            )));
        }
        if base_size.checked_shr(levels - 1).unwrap_or(0) == 0 {
            return Err(RenderError::configuration(format!(
                "{} mip levels do not fit a {}px base",
                levels, base_size
            )));
        }
        Ok(Self { base_size, levels })
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn base_size(&self) -> u32 {
        self.base_size
    }

    pub fn size(&self, mip: u32) -> u32 {
        self.base_size.checked_shr(mip).unwrap_or(0).max(1)
    }

    pub fn roughness(&self, mip: u32) -> f32 {
        mip as f32 / (self.levels - 1) as f32
    }

    pub fn iter(&self) -> impl Iterator<Item = PrefilterLevel> + '_ {
        (0..self.levels).map(move |mip| PrefilterLevel {
            mip,
            size: self.size(mip),
            roughness: self.roughness(mip),
        })
    }
}

impl Default for RoughnessMipSeries {
    fn default() -> Self {
        Self {
            base_size: PREFILTER_SIZE,
            levels: PREFILTER_MIP_LEVELS,
        }
    }
}

/// Prefilter the environment once per roughness step into successive mips
pub fn prefilter<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    geometry: &CaptureGeometry,
    cube_mesh: &GpuMesh,
    environment: Option<&GpuTexture>,
) -> RenderResult<GpuTexture> {
    let environment = environment
        .filter(|env| env.is_cube())
        .ok_or_else(|| RenderError::resource_missing("environment cubemap for prefilter"))?;
    require_program(program)?;

    let series = RoughnessMipSeries::default();
    let prefiltered = GpuTexture::create(
        backend,
        TextureDescriptor::cube(
            "prefilter",
            series.base_size(),
            series.levels(),
            TextureFormat::Rgba16Float,
        )
        .with_sampler(SamplerDescriptor::trilinear()),
    )?;

    target.begin(backend);
    program.use_program(backend);
    program.set_sampler(backend, "environment_map", SOURCE_UNIT);
    backend.bind_texture(SOURCE_UNIT, Some(environment.handle()));
    let mut result = Ok(());
    for level in series.iter() {
        if let Err(e) = target.resize(backend, level.size, level.size) {
            result = Err(e);
            break;
        }
        program.set_float(backend, "roughness", level.roughness);
        let drawn = render_to_cube(backend, target, program, geometry, &prefiltered, level.mip, |b| {
            cube_mesh.draw(b)
        });
        log::debug!(
            "Prefiltered mip {} ({}px, roughness {:.2}, {} faces)",
            level.mip,
            level.size,
            level.roughness,
            drawn
        );
    }
    backend.bind_texture(SOURCE_UNIT, None);
    target.end(backend);

    match result {
        Ok(()) => {
            log::info!(
                "Prefiltered specular cubemap {}px with {} mips",
                series.base_size(),
                series.levels()
            );
            Ok(prefiltered)
        }
        Err(e) => {
            prefiltered.release(backend);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_series() {
        let series = RoughnessMipSeries::default();
        let sizes: Vec<u32> = series.iter().map(|l| l.size).collect();
        let roughness: Vec<f32> = series.iter().map(|l| l.roughness).collect();
        assert_eq!(sizes, vec![128, 64, 32, 16, 8]);
        assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_single_level_rejected() {
        assert!(matches!(
            RoughnessMipSeries::new(128, 1),
            Err(RenderError::Configuration(_))
        ));
        assert!(RoughnessMipSeries::new(4, 5).is_err());
        assert!(RoughnessMipSeries::new(16, 5).is_ok());
        assert!(matches!(
            RoughnessMipSeries::new(128, 40),
            Err(RenderError::Configuration(_))
        ));
        assert!(RoughnessMipSeries::new(u32::MAX, 32).is_ok());
    }

    #[test]
    fn test_size_past_the_chain_is_one() {
        let series = RoughnessMipSeries::default();
        assert_eq!(series.size(7), 1);
        assert_eq!(series.size(40), 1);
    }
}
