//! wgpu frame driver for the snowscape renderer.
//!
//! [`WgpuBackend`] is the asset cache's GPU capability over a real device;
//! [`WgpuRenderer`] draws a frame's draw list through one pipeline per
//! shading variant and depth-test setting. [`FlyCamera`] is the mouse-look
//! camera driven by the desktop app.
//!
//! # Invariants
//! - Only the asset cache allocates or frees buffers and textures, always
//!   through [`WgpuBackend`].
//! - The renderer never mutates the scene or the cache.
//! - Camera motion is frame-time scaled; object motion is a fixed step.

mod backend;
mod camera;
mod gpu;
mod shaders;

pub use backend::{GpuResources, LiveTexture, WgpuBackend};
pub use camera::FlyCamera;
pub use gpu::WgpuRenderer;
