//! Handle-indexed storage for GPU-resident render resources.
//!
//! Handles are plain indices: cheap to copy, hashable, and stable for
//! the registry's lifetime (resources are never removed mid-run, only
//! dropped wholesale at teardown).

use cinder_core::collections::hashmap::HashMap;
use cinder_rhi::Texture;
use crate::material::Material;
use crate::mesh::GpuMesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Default)]
pub struct RenderRegistry {
    meshes: Vec<GpuMesh>,
    mesh_names: HashMap<String, MeshHandle>,

    materials: Vec<Material>,
    material_names: HashMap<String, MaterialHandle>,

    textures: Vec<Texture>,
    texture_names: HashMap<String, TextureHandle>,
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, name: &str, mesh: GpuMesh) -> MeshHandle {
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(mesh);
        self.mesh_names.insert(name.to_owned(), handle);
        handle
    }

    pub fn mesh(&self, handle: MeshHandle) -> &GpuMesh {
        &self.meshes[handle.0 as usize]
    }

    pub fn find_mesh(&self, name: &str) -> Option<MeshHandle> {
        self.mesh_names.get(name).copied()
    }

    pub fn add_material(&mut self, name: &str, material: Material) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len() as u32);
        self.materials.push(material);
        self.material_names.insert(name.to_owned(), handle);
        handle
    }

    pub fn material(&self, handle: MaterialHandle) -> &Material {
        &self.materials[handle.0 as usize]
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialHandle> {
        self.material_names.get(name).copied()
    }

    pub fn add_texture(&mut self, name: &str, texture: Texture) -> TextureHandle {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(texture);
        self.texture_names.insert(name.to_owned(), handle);
        handle
    }

    pub fn texture(&self, handle: TextureHandle) -> &Texture {
        &self.textures[handle.0 as usize]
    }

    pub fn find_texture(&self, name: &str) -> Option<TextureHandle> {
        self.texture_names.get(name).copied()
    }

    pub fn first_texture(&self) -> Option<TextureHandle> {
        if self.textures.is_empty() {
            None
        } else {
            Some(TextureHandle(0))
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}
