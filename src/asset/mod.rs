pub mod cache;
pub mod handle;
pub mod material;
pub mod mesh;
pub mod prefab;

pub use cache::AssetCache;
pub use handle::Handle;
pub use material::{AlphaMode, Material, MaterialFlags};
pub use mesh::Mesh;
pub use prefab::{Node, Prefab};

/// Everything the render-call builder resolves handles against.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub materials: AssetCache<Material>,
    pub prefabs: AssetCache<Prefab>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
            prefabs: AssetCache::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
