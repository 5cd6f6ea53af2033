use glam::Mat4;
use snowscape_assets::{AssetCache, MeshHandle, TextureHandle, VertexLayout};
use snowscape_common::ObjectId;
use snowscape_scene::{Scene, ShadingKind};

/// Concrete pipeline a draw goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineKind {
    Unlit,
    Lit,
    NormalMapped,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [Self::Unlit, Self::Lit, Self::NormalMapped];

    pub fn name(self) -> &'static str {
        match self {
            Self::Unlit => "unlit",
            Self::Lit => "lit",
            Self::NormalMapped => "normal_mapped",
        }
    }
}

/// One object's draw call, read from the scene and the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub object: ObjectId,
    pub pipeline: PipelineKind,
    pub mesh: MeshHandle,
    pub texture: TextureHandle,
    pub normal_map: Option<TextureHandle>,
    pub model: Mat4,
    pub depth_test: bool,
}

/// Build this frame's draw calls in scene order.
///
/// Objects without attached assets, or whose mesh the cache no longer
/// holds, are left out. A lit object is normal-mapped only when it has a
/// normal map and its mesh carries tangent frames.
pub fn build_draw_list(scene: &Scene, cache: &AssetCache) -> Vec<DrawItem> {
    let mut items = Vec::with_capacity(scene.len());
    for object in scene.objects() {
        let Some(assets) = object.assets() else {
            continue;
        };
        let Some(mesh) = cache.mesh(assets.mesh) else {
            tracing::warn!(
                id = %object.id().short(),
                "object references a mesh the cache does not hold"
            );
            continue;
        };
        if cache.texture(assets.texture).is_none() {
            continue;
        }
        let pipeline = match (object.shading, assets.normal_map) {
            (ShadingKind::Unlit, _) => PipelineKind::Unlit,
            (ShadingKind::Lit, Some(_)) if mesh.buffers.layout == VertexLayout::TangentSpace => {
                PipelineKind::NormalMapped
            }
            (ShadingKind::Lit, _) => PipelineKind::Lit,
        };
        items.push(DrawItem {
            object: object.id(),
            pipeline,
            mesh: assets.mesh,
            texture: assets.texture,
            normal_map: assets.normal_map.filter(|_| pipeline == PipelineKind::NormalMapped),
            model: object.compute_model_transform(),
            depth_test: object.depth_test,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use snowscape_assets::{
        AssetError, AssetSource, HeadlessBackend, MeshSource, TextureImage,
    };
    use snowscape_scene::{ObjectDesc, RenderableObject};

    struct Quad;

    impl AssetSource for Quad {
        fn load_mesh(&mut self, _: &str) -> Result<MeshSource, AssetError> {
            Ok(MeshSource {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::ONE],
                uvs: vec![Vec2::ZERO, Vec2::X, Vec2::ONE],
                normals: vec![Vec3::Z; 3],
            })
        }

        fn load_texture(&mut self, _: &str) -> Result<TextureImage, AssetError> {
            Ok(TextureImage::solid([1, 2, 3, 4]))
        }
    }

    #[test]
    fn pipelines_follow_shading_and_normal_maps() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut scene = Scene::new();
        let descs = [
            ObjectDesc::new("rock.obj", "rock.dds"),
            ObjectDesc::new("rock.obj", "rock.dds").shaded(ShadingKind::Unlit),
            ObjectDesc::new("snow.obj", "snow.png").with_normal_map("snow_n.png"),
            ObjectDesc::new("snow.obj", "snow.png")
                .with_normal_map("snow_n.png")
                .shaded(ShadingKind::Unlit),
        ];
        for desc in descs {
            scene.spawn(desc, &mut cache, &mut gpu, &mut Quad).unwrap();
        }

        let items = build_draw_list(&scene, &cache);
        let kinds: Vec<_> = items.iter().map(|i| i.pipeline).collect();
        assert_eq!(
            kinds,
            vec![
                PipelineKind::Lit,
                PipelineKind::Unlit,
                PipelineKind::NormalMapped,
                PipelineKind::Unlit
            ]
        );
        assert!(items[2].normal_map.is_some());
        assert!(items[3].normal_map.is_none());
        assert_eq!(items[0].mesh, items[1].mesh);
        snowscape_scene::shutdown(scene, cache, &mut gpu);
    }

    #[test]
    fn normal_map_on_plain_mesh_draws_lit() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut scene = Scene::new();
        scene
            .spawn(ObjectDesc::new("rock.obj", "rock.dds"), &mut cache, &mut gpu, &mut Quad)
            .unwrap();
        let mapped = ObjectDesc::new("rock.obj", "rock.dds").with_normal_map("rock_n.png");
        scene.spawn(mapped, &mut cache, &mut gpu, &mut Quad).unwrap();

        let items = build_draw_list(&scene, &cache);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.pipeline == PipelineKind::Lit));
        assert!(items[1].normal_map.is_none());
        snowscape_scene::shutdown(scene, cache, &mut gpu);
    }

    #[test]
    fn draw_items_carry_transform_and_depth_flag() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut scene = Scene::new();
        let desc = ObjectDesc::new("rock.obj", "rock.dds").at(Vec3::new(1.0, 2.0, 3.0));
        let mut object = RenderableObject::new(desc);
        object.depth_test = false;
        let id = scene
            .spawn_object(object, &mut cache, &mut gpu, &mut Quad)
            .unwrap();

        let items = build_draw_list(&scene, &cache);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].object, id);
        assert!(!items[0].depth_test);
        assert_eq!(items[0].model, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        snowscape_scene::shutdown(scene, cache, &mut gpu);
    }

    #[test]
    fn empty_scene_draws_nothing() {
        let cache = AssetCache::new();
        assert!(build_draw_list(&Scene::new(), &cache).is_empty());
    }
}
