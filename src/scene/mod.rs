//! Scene management
//!
//! A [`Scene`] stores its entities in a bevy [`World`]. Rendering walks every
//! entity carrying a [`MeshComponent`] and a [`Transform`] and hands it to the
//! [`SceneRenderer`] draw list.

mod camera;
mod environment;
mod light;
mod scene_renderer;
mod transform;

pub use camera::*;
pub use environment::*;
pub use light::*;
pub use scene_renderer::*;
pub use transform::*;

use std::sync::Arc;

use bevy_ecs::prelude::*;

use crate::renderer::Renderer;
use crate::resources::Mesh;

/// Entities plus the scene-wide light and environment.
pub struct Scene {
    name: String,
    world: World,
    light: Light,
    environment: Option<Environment>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            world: World::new(),
            light: Light::default(),
            environment: None,
        }
    }

    /// Spawn an entity drawing `mesh` at `transform`.
    pub fn spawn_mesh(&mut self, tag: &str, mesh: Arc<Mesh>, transform: Transform) -> Entity {
        self.world
            .spawn((Tag::from(tag), MeshComponent(mesh), transform))
            .id()
    }

    /// Number of entities that will be submitted by [`render`](Self::render).
    pub fn mesh_count(&mut self) -> usize {
        self.world
            .query::<(&MeshComponent, &Transform)>()
            .iter(&self.world)
            .count()
    }

    /// Record every mesh entity into one scene of `scene_renderer`.
    pub fn render(
        &mut self,
        scene_renderer: &mut SceneRenderer,
        renderer: &mut Renderer,
        camera: SceneCamera,
    ) {
        scene_renderer.begin_scene(camera, self.light);
        let mut query = self.world.query::<(&MeshComponent, &Transform)>();
        for (mesh, transform) in query.iter(&self.world) {
            scene_renderer.submit_mesh(&mesh.0, transform.matrix(), None);
        }
        scene_renderer.end_scene(renderer);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn light(&self) -> Light {
        self.light
    }

    pub fn set_light(&mut self, light: Light) {
        self.light = light;
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("entities", &self.world.entities().len())
            .field("light", &self.light)
            .finish()
    }
}
