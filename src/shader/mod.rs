//! Shader programs
//!
//! Builtin WGSL sources, the [`ShaderProgram`] wrapper the renderer talks
//! to, and WGSL validation shared by every backend.

mod library;
mod program;

pub use library::*;
pub use program::*;

/// Entry points every program must export
pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Parse and validate a WGSL module, checking both entry points exist.
pub fn validate_wgsl(source: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    for entry in [VERTEX_ENTRY, FRAGMENT_ENTRY] {
        if !module.entry_points.iter().any(|ep| ep.name == entry) {
            return Err(format!("missing entry point '{}'", entry));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProgramKind;

    #[test]
    fn test_builtin_sources_validate() {
        let library = ShaderLibrary::builtin();
        for kind in ProgramKind::ALL {
            if let Err(e) = validate_wgsl(library.source(kind)) {
                panic!("{} failed validation:\n{}", kind.name(), e);
            }
        }
    }

    #[test]
    fn test_invalid_source_reports_error() {
        assert!(validate_wgsl("fn broken( {").is_err());
        let no_fragment = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
        let err = validate_wgsl(no_fragment).unwrap_err();
        assert!(err.contains("fs_main"));
    }
}
