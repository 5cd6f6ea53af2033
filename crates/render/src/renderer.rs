use crate::draw::build_draw_list;
use glam::Vec3;
use snowscape_assets::AssetCache;
use snowscape_scene::Scene;
use std::fmt::Write;

/// Camera/view configuration for rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    /// Camera position in world space.
    pub eye: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Field of view in degrees.
    pub fov_degrees: f32,
    /// Light position in world space.
    pub light_position: Vec3,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            fov_degrees: 45.0,
            light_position: Vec3::new(50.0, 50.0, 50.0),
        }
    }
}

/// What a renderer reads each frame. Both parts are borrowed immutably; a
/// renderer never changes the scene or the cache.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    pub scene: &'a Scene,
    pub cache: &'a AssetCache,
}

/// Renderer-agnostic interface. All renderers implement this trait.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Render one frame from the given scene, cache and view.
    fn render(&self, frame: Frame<'_>, view: &RenderView) -> Self::Output;
}

/// Renders the scene as text: one line per drawn object.
///
/// Used by the CLI and by tests that check what would be drawn.
#[derive(Debug, Default)]
pub struct DebugTextRenderer;

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, frame: Frame<'_>, view: &RenderView) -> String {
        let stats = frame.cache.stats();
        let items = build_draw_list(frame.scene, frame.cache);
        let mut out = String::new();
        let _ = writeln!(out, "=== Scene (tick={}) ===", frame.scene.tick());
        let _ = writeln!(
            out,
            "Objects: {} ({} drawn)",
            frame.scene.len(),
            items.len()
        );
        let _ = writeln!(
            out,
            "Cache: meshes={} textures={} normal_maps={} buffers={}",
            stats.meshes, stats.textures, stats.normal_maps, stats.gpu_buffers
        );
        let _ = writeln!(
            out,
            "Camera: eye=({:.1}, {:.1}, {:.1}) target=({:.1}, {:.1}, {:.1}) fov={:.0}",
            view.eye.x,
            view.eye.y,
            view.eye.z,
            view.target.x,
            view.target.y,
            view.target.z,
            view.fov_degrees
        );

        for item in &items {
            let p = item.model.w_axis;
            let mesh = frame
                .cache
                .mesh(item.mesh)
                .map(|m| m.path.as_str())
                .unwrap_or("?");
            let _ = writeln!(
                out,
                "  [{}] {} pos=({:.3}, {:.3}, {:.3}) mesh={}{}",
                item.object.short(),
                item.pipeline.name(),
                p.x,
                p.y,
                p.z,
                mesh,
                if item.depth_test { "" } else { " no-depth" }
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use snowscape_assets::{
        AssetError, AssetSource, HeadlessBackend, MeshSource, TextureImage,
    };
    use snowscape_scene::ObjectDesc;

    struct Tri;

    impl AssetSource for Tri {
        fn load_mesh(&mut self, _: &str) -> Result<MeshSource, AssetError> {
            Ok(MeshSource {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
                normals: vec![Vec3::Z; 3],
            })
        }

        fn load_texture(&mut self, _: &str) -> Result<TextureImage, AssetError> {
            Ok(TextureImage::solid([0, 0, 0, 255]))
        }
    }

    #[test]
    fn debug_renderer_empty_scene() {
        let scene = Scene::new();
        let cache = AssetCache::new();
        let output = DebugTextRenderer::new().render(
            Frame {
                scene: &scene,
                cache: &cache,
            },
            &RenderView::default(),
        );

        assert!(output.contains("tick=0"));
        assert!(output.contains("Objects: 0 (0 drawn)"));
        assert!(output.contains("meshes=0"));
    }

    #[test]
    fn debug_renderer_with_objects() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut scene = Scene::new();
        scene
            .spawn(
                ObjectDesc::new("rock.obj", "rock.dds")
                    .at(Vec3::new(1.0, 2.0, 3.0))
                    .moving(Vec3::X),
                &mut cache,
                &mut gpu,
                &mut Tri,
            )
            .unwrap();
        scene
            .spawn(ObjectDesc::new("rock.obj", "rock.dds"), &mut cache, &mut gpu, &mut Tri)
            .unwrap();
        scene.advance_all();

        let output = DebugTextRenderer::new().render(
            Frame {
                scene: &scene,
                cache: &cache,
            },
            &RenderView::default(),
        );

        assert!(output.contains("tick=1"));
        assert!(output.contains("Objects: 2 (2 drawn)"));
        assert!(output.contains("meshes=1 textures=1"));
        assert!(output.contains("lit pos=(2.000, 2.000, 3.000) mesh=rock.obj"));
        snowscape_scene::shutdown(scene, cache, &mut gpu);
    }

    #[test]
    fn render_view_default() {
        let view = RenderView::default();
        assert_eq!(view.fov_degrees, 45.0);
        assert_eq!(view.target, Vec3::ZERO);
    }
}
