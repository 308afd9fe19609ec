//! Scene representation and the mesh draw path.

pub mod frame;
pub mod material;
pub mod mesh;
pub mod mesh_renderer;
pub mod registry;
pub mod scene;

pub use frame::{GpuCameraData, GpuObjectData, GpuSceneData, MAX_OBJECTS};
pub use material::Material;
pub use mesh::{GpuMesh, MeshVertex};
pub use mesh_renderer::MeshRenderer;
pub use registry::{MaterialHandle, MeshHandle, RenderRegistry, TextureHandle};
pub use scene::{InstanceBatch, RenderObject, RenderScene};
