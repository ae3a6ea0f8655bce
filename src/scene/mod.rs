pub mod camera;
pub mod entity;
pub mod frustum;
mod json;
pub mod light;
pub mod probes;
#[allow(clippy::module_inception)]
pub mod scene;

pub use camera::{Camera, Projection};
pub use entity::{Decal, Entity, EntityKind, PrefabInstance};
pub use frustum::{Aabb, Frustum, Plane};
pub use light::{Light, LightType};
pub use probes::{nearest_probe, IrradianceGrid, IrradianceProbe, ReflectionProbe};
pub use scene::Scene;
