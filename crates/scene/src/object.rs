use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use snowscape_assets::{
    AssetCache, AssetError, AssetSource, GpuBackend, MeshHandle, TextureHandle, VertexLayout,
};
use snowscape_common::{ObjectId, Transform};

/// Which shading pipeline draws an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadingKind {
    /// Diffuse + specular lighting from the scene light, normal-mapped when
    /// the object has a normal map.
    #[default]
    Lit,
    /// Texture colour only.
    Unlit,
}

/// Everything needed to create an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDesc {
    pub mesh: String,
    pub texture: String,
    #[serde(default)]
    pub normal_map: Option<String>,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(default)]
    pub shading: ShadingKind,
}

impl ObjectDesc {
    pub fn new(mesh: impl Into<String>, texture: impl Into<String>) -> Self {
        Self {
            mesh: mesh.into(),
            texture: texture.into(),
            normal_map: None,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            shading: ShadingKind::Lit,
        }
    }

    pub fn with_normal_map(mut self, path: impl Into<String>) -> Self {
        self.normal_map = Some(path.into());
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn moving(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn shaded(mut self, shading: ShadingKind) -> Self {
        self.shading = shading;
        self
    }
}

/// Cache handles held by a fully attached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedAssets {
    pub mesh: MeshHandle,
    pub texture: TextureHandle,
    pub normal_map: Option<TextureHandle>,
}

/// A positioned, moving object drawn with a cached mesh and texture.
///
/// The object never owns GPU resources. It holds cache handles once
/// [`RenderableObject::attach_assets`] succeeds, and nothing before that.
#[derive(Debug, Clone)]
pub struct RenderableObject {
    id: ObjectId,
    mesh_path: String,
    texture_path: String,
    normal_map_path: Option<String>,
    pub transform: Transform,
    pub velocity: Vec3,
    pub depth_test: bool,
    pub shading: ShadingKind,
    assets: Option<AttachedAssets>,
}

impl RenderableObject {
    /// Create an unattached object: rotation zero, scale one, depth test on.
    pub fn new(desc: ObjectDesc) -> Self {
        Self {
            id: ObjectId::new(),
            mesh_path: desc.mesh,
            texture_path: desc.texture,
            normal_map_path: desc.normal_map,
            transform: Transform::from_position(desc.position),
            velocity: desc.velocity,
            depth_test: true,
            shading: desc.shading,
            assets: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn mesh_path(&self) -> &str {
        &self.mesh_path
    }

    pub fn texture_path(&self) -> &str {
        &self.texture_path
    }

    pub fn normal_map_path(&self) -> Option<&str> {
        self.normal_map_path.as_deref()
    }

    /// Normal-mapped objects need tangent frames in their mesh.
    pub fn vertex_layout(&self) -> VertexLayout {
        if self.normal_map_path.is_some() {
            VertexLayout::TangentSpace
        } else {
            VertexLayout::Standard
        }
    }

    /// Resolve mesh, texture and normal map through the cache.
    ///
    /// The handles are stored only if every resolve succeeds. Assets that did
    /// resolve before a failure stay in the cache, owned by it as usual.
    pub fn attach_assets(
        &mut self,
        cache: &mut AssetCache,
        gpu: &mut impl GpuBackend,
        source: &mut impl AssetSource,
    ) -> Result<AttachedAssets, AssetError> {
        if let Some(assets) = self.assets {
            return Ok(assets);
        }
        let mesh = cache.resolve_mesh(gpu, &self.mesh_path, self.vertex_layout(), |p| {
            source.load_mesh(p)
        })?;
        let texture = cache.resolve_texture(gpu, &self.texture_path, |p| source.load_texture(p))?;
        let normal_map = cache.resolve_normal_map(gpu, self.normal_map_path.as_deref(), |p| {
            source.load_texture(p)
        })?;

        let assets = AttachedAssets {
            mesh,
            texture,
            normal_map,
        };
        self.assets = Some(assets);
        Ok(assets)
    }

    /// Handles for drawing; `None` until attached.
    pub fn assets(&self) -> Option<AttachedAssets> {
        self.assets
    }

    pub fn is_attached(&self) -> bool {
        self.assets.is_some()
    }

    /// Advance one fixed step: `position += velocity`.
    ///
    /// There is no delta time. Callers must tick at a steady cadence.
    pub fn tick(&mut self) {
        self.transform.position += self.velocity;
    }

    /// Scale, then rotate about Y, then about X, then translate.
    pub fn compute_model_transform(&self) -> Mat4 {
        self.transform.model_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use snowscape_assets::{HeadlessBackend, MeshSource, TextureImage};

    #[derive(Default)]
    struct Stub {
        mesh_loads: usize,
        texture_loads: usize,
        fail_texture: bool,
    }

    impl AssetSource for Stub {
        fn load_mesh(&mut self, _path: &str) -> Result<MeshSource, AssetError> {
            self.mesh_loads += 1;
            Ok(MeshSource {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
                normals: vec![Vec3::Z; 3],
            })
        }

        fn load_texture(&mut self, path: &str) -> Result<TextureImage, AssetError> {
            self.texture_loads += 1;
            if self.fail_texture {
                return Err(AssetError::Io {
                    path: path.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Ok(TextureImage::solid([255, 255, 255, 255]))
        }
    }

    #[test]
    fn new_object_has_default_transform() {
        let obj = RenderableObject::new(ObjectDesc::new("rock.obj", "rock.dds"));
        assert_eq!(obj.transform, Transform::default());
        assert!(obj.depth_test);
        assert!(!obj.is_attached());
        assert_eq!(obj.vertex_layout(), VertexLayout::Standard);
        assert_eq!(obj.compute_model_transform(), Mat4::IDENTITY);
    }

    #[test]
    fn tick_adds_velocity_exactly() {
        let p0 = Vec3::new(1.0, 2.0, 3.0);
        let v = Vec3::new(0.5, -0.25, 0.125);
        let mut obj = RenderableObject::new(ObjectDesc::new("a", "b").at(p0).moving(v));
        for _ in 0..8 {
            obj.tick();
        }
        // values chosen to be exact in binary floating point
        assert_eq!(obj.transform.position, p0 + 8.0 * v);
    }

    #[test]
    fn tick_accumulates_within_tolerance() {
        let v = Vec3::new(0.0042, 0.0017, 0.0099);
        let mut obj = RenderableObject::new(ObjectDesc::new("a", "b").moving(v));
        for _ in 0..1000 {
            obj.tick();
        }
        assert!(obj.transform.position.abs_diff_eq(v * 1000.0, 1e-3));
    }

    #[test]
    fn attach_resolves_all_handles() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut source = Stub::default();
        let mut obj = RenderableObject::new(ObjectDesc::new("rock.obj", "rock.dds"));

        let assets = obj.attach_assets(&mut cache, &mut gpu, &mut source).unwrap();
        assert_eq!(obj.assets(), Some(assets));
        assert_eq!(assets.normal_map, None);
        assert!(cache.mesh(assets.mesh).is_some());

        // attaching again is a no-op
        obj.attach_assets(&mut cache, &mut gpu, &mut source).unwrap();
        assert_eq!(source.mesh_loads, 1);
        assert_eq!(cache.stats().hits, 0);
        cache.teardown(&mut gpu);
    }

    #[test]
    fn normal_mapped_object_requests_tangent_space() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut source = Stub::default();
        let mut obj = RenderableObject::new(
            ObjectDesc::new("snow.obj", "snow.png").with_normal_map("snow_n.png"),
        );
        let assets = obj.attach_assets(&mut cache, &mut gpu, &mut source).unwrap();
        let mesh = cache.mesh(assets.mesh).unwrap();
        assert_eq!(mesh.buffers.layout, VertexLayout::TangentSpace);
        assert!(assets.normal_map.is_some());
        cache.teardown(&mut gpu);
    }

    #[test]
    fn failed_attach_leaves_object_unattached() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = AssetCache::new();
        let mut source = Stub {
            fail_texture: true,
            ..Stub::default()
        };
        let mut obj = RenderableObject::new(ObjectDesc::new("rock.obj", "missing.dds"));
        assert!(obj.attach_assets(&mut cache, &mut gpu, &mut source).is_err());
        assert!(!obj.is_attached());
        assert_eq!(obj.assets(), None);
        // the mesh resolved before the failure stays cache-owned
        assert!(cache.contains_mesh("rock.obj"));
        assert!(!cache.contains_texture("missing.dds"));
        cache.teardown(&mut gpu);
    }

    #[test]
    fn shading_kind_parses_lowercase() {
        let desc: ObjectDesc = serde_json::from_str(
            r#"{"mesh":"m.obj","texture":"t.png","shading":"unlit"}"#,
        )
        .unwrap();
        assert_eq!(desc.shading, ShadingKind::Unlit);
        assert_eq!(desc.normal_map, None);
        assert_eq!(desc.position, Vec3::ZERO);
    }
}
