//! Frame driver interface: renderer-agnostic.
//!
//! # Invariants
//! - Renderers read the scene and the asset cache; they never mutate either.
//! - Draw order is scene order.
//! - The shading pipeline is chosen per object from its `ShadingKind`, not
//!   from the object's type.

mod draw;
mod frame;
mod renderer;

pub use draw::{DrawItem, PipelineKind, build_draw_list};
pub use frame::FrameCounter;
pub use renderer::{DebugTextRenderer, Frame, RenderView, Renderer};

pub fn crate_info() -> &'static str {
    "snowscape-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
