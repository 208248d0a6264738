//! Backend abstraction layer
//!
//! Provides common traits and types that the software and wgpu backends implement.

pub mod software;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use software::{BackendEvent, SoftwareBackend, SoftwareConfig};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
