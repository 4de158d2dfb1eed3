//! # Batch Map: Grouping Entities by Shared Model
//!
//! Binding a mesh, binding its textures and uploading material uniforms are
//! the expensive state changes of a frame. The batch map groups every entity
//! that shares a [`TexturedModel`] so a pass can do that work once per model
//! and then issue one cheap draw per instance:
//!
//! ```text
//! fern  ─▶ [e0, e4, e7]     bind fern mesh + texture once, 3 draws
//! pine  ─▶ [e1, e2]         bind pine mesh + texture once, 2 draws
//! rocks ─▶ [e3]             bind rocks mesh + texture once, 1 draw
//! ```
//!
//! Keys are model *identity*: two entities batch together when they hold
//! clones of the same `Rc<TexturedModel>`. Distinct keys keep first-insertion
//! order, so a frame's draw order is deterministic.
//!
//! The map is rebuilt every frame and emptied by the compositor after
//! rendering. Instances inside a batch are never sorted, so transparent
//! models composite in push order.

use std::collections::HashMap;
use std::rc::Rc;

use crate::model::TexturedModel;
use crate::scene::Entity;

/// All instances of one model pushed this frame.
#[derive(Debug, Clone)]
pub struct Batch {
    pub model: Rc<TexturedModel>,
    pub entities: Vec<Entity>,
}

/// Model-keyed, insertion-ordered entity lists.
#[derive(Debug, Default)]
pub struct BatchMap {
    /// `Rc` allocation address → index into `batches`. The batch holds a
    /// clone of the `Rc`, which keeps the address unique while it is a key.
    index: HashMap<usize, usize>,
    batches: Vec<Batch>,
}

impl BatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity to its model's batch, creating the batch if needed.
    ///
    /// Entities without a model or with a non-finite transform are dropped;
    /// returns whether the entity was accepted.
    pub fn push(&mut self, entity: &Entity) -> bool {
        let Some(model) = entity.model.as_ref().filter(|_| entity.is_drawable()) else {
            log::trace!("dropping undrawable entity {:?}", entity.transform);
            return false;
        };

        let key = Rc::as_ptr(model) as usize;
        let slot = *self.index.entry(key).or_insert_with(|| {
            self.batches.push(Batch {
                model: Rc::clone(model),
                entities: Vec::new(),
            });
            self.batches.len() - 1
        });
        self.batches[slot].entities.push(entity.clone());
        true
    }

    /// Number of distinct models.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total entities across all batches.
    pub fn instance_count(&self) -> usize {
        self.batches.iter().map(|b| b.entities.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    pub fn get(&self, model: &Rc<TexturedModel>) -> Option<&[Entity]> {
        let slot = self.index.get(&(Rc::as_ptr(model) as usize))?;
        Some(&self.batches[*slot].entities)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.batches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{MeshHandle, TextureHandle};
    use crate::math::Transform;
    use crate::model::{ModelTexture, RawModel};

    fn model(id: u32) -> Rc<TexturedModel> {
        Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(id),
                vertex_count: 36,
            },
            ModelTexture::new(TextureHandle(id)),
        ))
    }

    #[test]
    fn entities_group_by_model_identity() {
        let fern = model(1);
        let pine = model(2);
        let mut map = BatchMap::new();
        for i in 0..5 {
            let m = if i % 2 == 0 { &fern } else { &pine };
            map.push(&Entity::new(Rc::clone(m), Transform::from_xyz(i as f32, 0.0, 0.0)));
        }
        assert_eq!(map.len(), 2);
        assert_eq!(map.instance_count(), 5);
        assert_eq!(map.get(&fern).unwrap().len(), 3);
        assert_eq!(map.get(&pine).unwrap().len(), 2);
    }

    #[test]
    fn equal_but_distinct_models_do_not_merge() {
        let a = model(1);
        let b = model(1);
        assert_eq!(*a, *b);
        let mut map = BatchMap::new();
        map.push(&Entity::new(a, Transform::IDENTITY));
        map.push(&Entity::new(b, Transform::IDENTITY));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn keys_keep_first_insertion_order() {
        let models: Vec<_> = (1..=4).map(model).collect();
        let mut map = BatchMap::new();
        for m in models.iter().rev() {
            map.push(&Entity::new(Rc::clone(m), Transform::IDENTITY));
        }
        map.push(&Entity::new(Rc::clone(&models[3]), Transform::IDENTITY));
        let order: Vec<_> = map.iter().map(|b| b.model.raw.mesh).collect();
        assert_eq!(order, vec![MeshHandle(4), MeshHandle(3), MeshHandle(2), MeshHandle(1)]);
    }

    #[test]
    fn malformed_entities_are_dropped() {
        let mut map = BatchMap::new();
        let orphan = Entity {
            model: None,
            transform: Transform::IDENTITY,
            texture_index: 0,
        };
        assert!(!map.push(&orphan));
        let broken = Entity::new(model(1), Transform::IDENTITY.with_scale(f32::INFINITY));
        assert!(!broken.is_drawable());
        assert!(!map.push(&broken));
        let lost = Entity::new(model(2), Transform::from_xyz(f32::NAN, 0.0, 0.0));
        assert!(!map.push(&lost));
        assert!(map.is_empty());
    }

    #[test]
    fn clear_empties_every_batch() {
        let mut map = BatchMap::new();
        map.push(&Entity::new(model(1), Transform::IDENTITY));
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.instance_count(), 0);
    }
}
