//! Render scene: per-frame draw list sorting and instance batching.

use glam::Mat4;
use cinder_core::collections::hash_value;
use crate::registry::{MaterialHandle, MeshHandle};

/// One renderable submitted for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub transform: Mat4,
}

/// Sortable view of one render object.
#[derive(Debug, Clone, Copy)]
struct RenderBatch {
    object_index: u32,
    sort_key: u64,
}

/// A contiguous run of draws sharing one (mesh, material) pair,
/// collapsed into a single instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBatch {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    /// First slot in draw order (indexes `instance_data`).
    pub first: u32,
    pub count: u32,
}

/// Builds the sorted, instanced draw stream for one frame.
///
/// All state is rebuilt by `build_instances`; the vectors are kept only
/// to reuse their allocations across frames.
#[derive(Default)]
pub struct RenderScene {
    batches: Vec<RenderBatch>,
    instances: Vec<InstanceBatch>,
    transforms: Vec<Mat4>,
    /// Draw slot -> original object index.
    instance_data: Vec<u32>,
}

fn sort_key(material: MaterialHandle, mesh: MeshHandle) -> u64 {
    let material_hash = hash_value(&material) & u64::from(u32::MAX);
    let mesh_hash = hash_value(&mesh) & u64::from(u32::MAX);
    material_hash << 32 | mesh_hash
}

impl RenderScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort the frame's objects by (material, mesh) identity and collapse
    /// consecutive equal pairs into instanced batches.
    #[profiling::function]
    pub fn build_instances(&mut self, objects: &[RenderObject]) {
        self.batches.clear();
        self.instances.clear();
        self.transforms.clear();
        self.instance_data.clear();

        if objects.is_empty() {
            return;
        }

        self.batches.reserve(objects.len());
        self.transforms.reserve(objects.len());
        for (index, object) in objects.iter().enumerate() {
            self.batches.push(RenderBatch {
                object_index: index as u32,
                sort_key: sort_key(object.material, object.mesh),
            });
            self.transforms.push(object.transform);
        }

        // Equal keys may land in any order; only grouping matters.
        self.batches.sort_unstable_by_key(|b| b.sort_key);

        self.instance_data.extend(self.batches.iter().map(|b| b.object_index));

        self.instances.reserve(objects.len() / 3 + 1);
        for (slot, batch) in self.batches.iter().enumerate() {
            let object = &objects[batch.object_index as usize];

            match self.instances.last_mut() {
                Some(instance) if instance.mesh == object.mesh && instance.material == object.material => {
                    instance.count += 1;
                }
                _ => {
                    self.instances.push(InstanceBatch {
                        mesh: object.mesh,
                        material: object.material,
                        first: slot as u32,
                        count: 1,
                    });
                }
            }
        }
    }

    /// Instanced draw batches, in draw order.
    pub fn instances(&self) -> &[InstanceBatch] {
        &self.instances
    }

    /// Object transforms, indexed by original object index.
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    /// Draw slot -> original object index mapping.
    pub fn instance_data(&self) -> &[u32] {
        &self.instance_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(mesh: u32, material: u32) -> RenderObject {
        RenderObject {
            mesh: MeshHandle(mesh),
            material: MaterialHandle(material),
            transform: Mat4::IDENTITY,
        }
    }

    #[test]
    fn empty_input_produces_no_instances() {
        let mut scene = RenderScene::new();
        scene.build_instances(&[]);

        assert!(scene.instances().is_empty());
        assert!(scene.instance_data().is_empty());
        assert!(scene.transforms().is_empty());
    }

    #[test]
    fn duplicate_pairs_collapse_into_one_batch() {
        // (meshA, matX), (meshB, matX), (meshA, matX) -> exactly two
        // batches: the meshA pair with count 2 and meshB with count 1.
        let mut scene = RenderScene::new();
        scene.build_instances(&[object(0, 0), object(1, 0), object(0, 0)]);

        let instances = scene.instances();
        assert_eq!(instances.len(), 2);

        let total: u32 = instances.iter().map(|i| i.count).sum();
        assert_eq!(total, 3);

        let a = instances.iter().find(|i| i.mesh == MeshHandle(0)).unwrap();
        let b = instances.iter().find(|i| i.mesh == MeshHandle(1)).unwrap();
        assert_eq!(a.count, 2);
        assert_eq!(b.count, 1);
    }

    #[test]
    fn counts_cover_every_object() {
        let mut objects = Vec::new();
        for i in 0..64u32 {
            objects.push(object(i % 5, i % 3));
        }

        let mut scene = RenderScene::new();
        scene.build_instances(&objects);

        let total: u32 = scene.instances().iter().map(|i| i.count).sum();
        assert_eq!(total, objects.len() as u32);
        assert_eq!(scene.instance_data().len(), objects.len());
    }

    #[test]
    fn adjacent_batches_never_share_mesh_and_material() {
        let mut objects = Vec::new();
        for i in 0..200u32 {
            objects.push(object(i % 7, i % 4));
        }

        let mut scene = RenderScene::new();
        scene.build_instances(&objects);

        for pair in scene.instances().windows(2) {
            let same = pair[0].mesh == pair[1].mesh && pair[0].material == pair[1].material;
            assert!(!same, "adjacent batches {:?} and {:?} should have been merged", pair[0], pair[1]);
        }
    }

    #[test]
    fn batches_are_contiguous_in_draw_order() {
        let mut objects = Vec::new();
        for i in 0..50u32 {
            objects.push(object(i % 4, 0));
        }

        let mut scene = RenderScene::new();
        scene.build_instances(&objects);

        let mut expected_first = 0;
        for instance in scene.instances() {
            assert_eq!(instance.first, expected_first);
            expected_first += instance.count;
        }
        assert_eq!(expected_first as usize, objects.len());
    }

    #[test]
    fn instance_data_maps_draw_slots_to_objects() {
        let objects = [object(0, 0), object(1, 1), object(0, 0), object(1, 1)];

        let mut scene = RenderScene::new();
        scene.build_instances(&objects);

        // Each draw slot must point back at an object with the batch's
        // (mesh, material) pair.
        for instance in scene.instances() {
            for slot in instance.first..instance.first + instance.count {
                let object_index = scene.instance_data()[slot as usize] as usize;
                assert_eq!(objects[object_index].mesh, instance.mesh);
                assert_eq!(objects[object_index].material, instance.material);
            }
        }
    }

    #[test]
    fn single_object_is_one_batch() {
        let mut scene = RenderScene::new();
        scene.build_instances(&[object(3, 9)]);

        assert_eq!(
            scene.instances(),
            &[InstanceBatch {
                mesh: MeshHandle(3),
                material: MaterialHandle(9),
                first: 0,
                count: 1,
            }]
        );
    }
}
