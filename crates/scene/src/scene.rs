use crate::SceneError;
use crate::config::SceneConfig;
use crate::object::{ObjectDesc, RenderableObject};
use glam::Vec3;
use snowscape_assets::{AssetCache, AssetSource, GpuBackend, TeardownReport};
use snowscape_common::ObjectId;

/// The list of live objects plus the update-step counter.
///
/// Objects are kept in insertion order; [`Scene::advance_all`] and the frame
/// driver both walk them in that order.
#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<RenderableObject>,
    tick: u64,
}

/// Outcome of [`Scene::populate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub spawned: usize,
    /// `(mesh path, error message)` for each group that was skipped.
    pub skipped: Vec<(String, String)>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of update steps run so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[RenderableObject] {
        &self.objects
    }

    pub fn get(&self, id: ObjectId) -> Option<&RenderableObject> {
        self.objects.iter().find(|o| o.id() == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RenderableObject> {
        self.objects.iter_mut().find(|o| o.id() == id)
    }

    /// Create an object from `desc`, attach its assets and add it.
    pub fn spawn(
        &mut self,
        desc: ObjectDesc,
        cache: &mut AssetCache,
        gpu: &mut impl GpuBackend,
        source: &mut impl AssetSource,
    ) -> Result<ObjectId, SceneError> {
        self.spawn_object(RenderableObject::new(desc), cache, gpu, source)
    }

    /// Attach `object`'s assets and add it. On failure the object is
    /// discarded and the scene is unchanged.
    pub fn spawn_object(
        &mut self,
        mut object: RenderableObject,
        cache: &mut AssetCache,
        gpu: &mut impl GpuBackend,
        source: &mut impl AssetSource,
    ) -> Result<ObjectId, SceneError> {
        object
            .attach_assets(cache, gpu, source)
            .map_err(|source| SceneError::Asset {
                mesh: object.mesh_path().to_string(),
                texture: object.texture_path().to_string(),
                source,
            })?;
        let id = object.id();
        tracing::debug!(id = %id.short(), mesh = object.mesh_path(), "object spawned");
        self.objects.push(object);
        Ok(id)
    }

    /// Build every group in `config`, scattering positions and velocities
    /// from `config.seed`.
    ///
    /// A group whose assets fail is skipped when `config.skip_failed` is set;
    /// otherwise the first failure is returned and objects spawned so far
    /// remain.
    pub fn populate(
        &mut self,
        config: &SceneConfig,
        cache: &mut AssetCache,
        gpu: &mut impl GpuBackend,
        source: &mut impl AssetSource,
    ) -> Result<PopulateReport, SceneError> {
        let _span = tracing::info_span!("populate", groups = config.groups.len()).entered();
        let mut scatter = Scatter::new(config.seed);
        let mut report = PopulateReport::default();

        'groups: for group in &config.groups {
            for _ in 0..group.count {
                let desc = ObjectDesc {
                    mesh: group.mesh.clone(),
                    texture: group.texture.clone(),
                    normal_map: group.normal_map.clone(),
                    position: scatter.position(group.spread),
                    velocity: scatter.velocity(),
                    shading: group.shading,
                };
                let mut object = RenderableObject::new(desc);
                object.depth_test = group.depth_test;
                object.transform.scale = Vec3::splat(group.scale);

                match self.spawn_object(object, cache, gpu, source) {
                    Ok(_) => report.spawned += 1,
                    Err(e) if config.skip_failed => {
                        tracing::warn!(mesh = %group.mesh, error = %e, "skipping object group");
                        report.skipped.push((group.mesh.clone(), e.to_string()));
                        continue 'groups;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(
            spawned = report.spawned,
            skipped = report.skipped.len(),
            "scene populated"
        );
        Ok(report)
    }

    /// Run one update step on every object, in order.
    pub fn advance_all(&mut self) {
        for object in &mut self.objects {
            object.tick();
        }
        self.tick += 1;
    }

    /// Drop every object. Cached assets are not affected.
    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

/// Drop the scene, then free every asset the cache owns.
pub fn shutdown(scene: Scene, cache: AssetCache, gpu: &mut impl GpuBackend) -> TeardownReport {
    let objects = scene.len();
    drop(scene);
    let report = cache.teardown(gpu);
    tracing::info!(objects, "scene shut down");
    report
}

/// Deterministic placement source.
struct Scatter {
    state: u64,
}

impl Scatter {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = splitmix64(self.state);
        self.state
    }

    fn position(&mut self, spread: u32) -> Vec3 {
        let spread = u64::from(spread.max(1));
        let mut axis = || (self.next() % spread) as f32;
        Vec3::new(axis(), axis(), axis())
    }

    fn velocity(&mut self) -> Vec3 {
        let mut axis = || (self.next() % 100) as f32 / 10000.0;
        Vec3::new(axis(), axis(), axis())
    }
}

fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
