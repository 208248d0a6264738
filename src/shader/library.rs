use std::collections::HashMap;

use crate::backend::{GraphicsBackend, ProgramKind, ShaderDescriptor};

use super::ShaderProgram;

/// Catalog of program sources, one per [`ProgramKind`]
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    sources: HashMap<ProgramKind, String>,
}

impl ShaderLibrary {
    /// The sources shipped with the crate
    pub fn builtin() -> Self {
        let sources = ProgramKind::ALL
            .into_iter()
            .map(|kind| (kind, builtin_source(kind).to_string()))
            .collect();
        Self { sources }
    }

    /// Replace the source for one program kind
    pub fn with_source(mut self, kind: ProgramKind, source: impl Into<String>) -> Self {
        self.sources.insert(kind, source.into());
        self
    }

    pub fn source(&self, kind: ProgramKind) -> &str {
        self.sources
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| builtin_source(kind))
    }

    pub fn descriptor(&self, kind: ProgramKind) -> ShaderDescriptor {
        ShaderDescriptor {
            label: Some(kind.name().to_string()),
            kind,
            source: self.source(kind).to_string(),
        }
    }

    /// Compile one program; failures yield an invalid program
    pub fn compile<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        kind: ProgramKind,
    ) -> ShaderProgram {
        ShaderProgram::compile(backend, &self.descriptor(kind))
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_source(kind: ProgramKind) -> &'static str {
    match kind {
        ProgramKind::EquirectToCubemap => include_str!("../shaders/equirect_to_cubemap.wgsl"),
        ProgramKind::IrradianceConvolution => include_str!("../shaders/irradiance.wgsl"),
        ProgramKind::SpecularPrefilter => include_str!("../shaders/prefilter.wgsl"),
        ProgramKind::BrdfIntegration => include_str!("../shaders/brdf.wgsl"),
        ProgramKind::Background => include_str!("../shaders/background.wgsl"),
        ProgramKind::Pbr => include_str!("../shaders/pbr.wgsl"),
    }
}
