//! Error taxonomy for the renderer
//!
//! None of these are fatal: stages log them and leave their output absent,
//! and the frame renders in a degraded form.

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// A required input (texture, shader, HDR source) could not be loaded
    /// or was never produced by an earlier stage
    #[error("Resource missing: {0}")]
    ResourceMissing(String),
    /// An attach or resize referenced a face or mip level the resource
    /// was not created with
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Shader compile or link failure
    #[error("Driver error: {0}")]
    Driver(String),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl RenderError {
    pub fn resource_missing(what: impl Into<String>) -> Self {
        RenderError::ResourceMissing(what.into())
    }

    pub fn configuration(what: impl Into<String>) -> Self {
        RenderError::Configuration(what.into())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::resource_missing("environment cubemap");
        assert_eq!(err.to_string(), "Resource missing: environment cubemap");

        let err = RenderError::configuration("mip 3 of 'irradiance'");
        assert!(err.to_string().starts_with("Configuration error"));

        let err: RenderError = BackendError::NoProgramBound.into();
        assert_eq!(err.to_string(), "Backend error: No program bound");
    }
}
