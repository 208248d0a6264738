use glam::{Mat4, Vec3};

use crate::backend::{GraphicsBackend, ProgramHandle, ProgramKind, ShaderDescriptor, UniformValue};
use crate::error::{RenderError, RenderResult};

/// A compiled program with by-name uniform setters.
///
/// A program whose compilation failed keeps no backend handle. Using it or
/// setting uniforms on it does nothing, so draws issued with it leave the
/// target untouched.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    kind: ProgramKind,
    handle: Option<ProgramHandle>,
}

impl ShaderProgram {
    /// Compile, logging a driver error and returning an unusable program on failure
    pub fn compile<B: GraphicsBackend + ?Sized>(backend: &mut B, desc: &ShaderDescriptor) -> Self {
        match Self::try_compile(backend, desc) {
            Ok(program) => program,
            Err(e) => {
                log::error!("{}", e);
                Self::invalid(desc.label.as_deref().unwrap_or(desc.kind.name()), desc.kind)
            }
        }
    }

    pub fn try_compile<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        desc: &ShaderDescriptor,
    ) -> RenderResult<Self> {
        let name = desc.label.clone().unwrap_or_else(|| desc.kind.name().to_string());
        let handle = backend
            .create_program(desc)
            .map_err(|e| RenderError::Driver(format!("program '{}': {}", name, e)))?;
        log::debug!("Compiled program '{}' on {}", name, backend.name());
        Ok(Self {
            name,
            kind: desc.kind,
            handle: Some(handle),
        })
    }

    /// A program in the failed state
    pub fn invalid(name: &str, kind: ProgramKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            handle: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make this program current. No-op for a failed program.
    pub fn use_program<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        if let Some(handle) = self.handle {
            backend.use_program(Some(handle));
        }
    }

    fn set<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, name: &str, value: UniformValue) {
        let Some(handle) = self.handle else {
            return;
        };
        if let Err(e) = backend.set_uniform(handle, name, value) {
            log::warn!("Program '{}': {}", self.name, e);
        }
    }

    pub fn set_mat4<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, name: &str, value: Mat4) {
        self.set(backend, name, UniformValue::Mat4(value));
    }

    pub fn set_vec3<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, name: &str, value: Vec3) {
        self.set(backend, name, UniformValue::Vec3(value));
    }

    pub fn set_float<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, name: &str, value: f32) {
        self.set(backend, name, UniformValue::Float(value));
    }

    /// Point a sampler uniform at a texture unit
    pub fn set_sampler<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, name: &str, unit: u32) {
        self.set(backend, name, UniformValue::Int(unit as i32));
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        if let Some(handle) = self.handle {
            backend.destroy_program(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SoftwareBackend, SoftwareConfig};
    use crate::shader::ShaderLibrary;

    #[test]
    fn test_failed_program_is_inert() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let library = ShaderLibrary::builtin().with_source(ProgramKind::BrdfIntegration, "not wgsl");

        let err = ShaderProgram::try_compile(&mut backend, &library.descriptor(ProgramKind::BrdfIntegration))
            .unwrap_err();
        assert!(matches!(err, RenderError::Driver(_)));

        let program = library.compile(&mut backend, ProgramKind::BrdfIntegration);
        assert!(!program.is_valid());
        program.use_program(&mut backend);
        program.set_float(&mut backend, "roughness", 1.0);
        assert_eq!(backend.current_program(), None);
        assert_eq!(backend.live_resources().programs, 0);
    }

    #[test]
    fn test_compile_and_release() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let program = ShaderLibrary::builtin().compile(&mut backend, ProgramKind::SpecularPrefilter);
        assert!(program.is_valid());
        program.use_program(&mut backend);
        assert_eq!(backend.current_program(), program.handle());
        program.release(&mut backend);
        assert_eq!(backend.live_resources().programs, 0);
        assert_eq!(backend.current_program(), None);
    }
}
