//! Material cache
//!
//! Long-lived arena of materials. Every material gets a stable registration
//! index, used to break sort ties and to group polygons; index 0 is the default
//! material that stale or unknown handles resolve to.

use std::collections::HashMap;

use crate::foundation::collections::{MaterialHandle, SlotMap};
use crate::render::api::TextureHandle;

use super::material::{Material, MaterialSort};

/// Name of the fallback material
pub const DEFAULT_MATERIAL_NAME: &str = "<default>";

/// Arena of materials addressable by handle, index or name
#[derive(Debug, Clone)]
pub struct MaterialCache {
    materials: SlotMap<MaterialHandle, Material>,
    by_index: Vec<MaterialHandle>,
    by_name: HashMap<String, MaterialHandle>,
    textures: HashMap<String, TextureHandle>,
    default_material: MaterialHandle,
    fallback: Material,
}

impl Default for MaterialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialCache {
    /// Create a cache holding only the default material
    pub fn new() -> Self {
        let mut cache = Self {
            materials: SlotMap::with_key(),
            by_index: Vec::new(),
            by_name: HashMap::new(),
            textures: HashMap::new(),
            default_material: MaterialHandle::default(),
            fallback: Material::new(DEFAULT_MATERIAL_NAME, MaterialSort::Opaque),
        };

        cache.fallback.is_default = true;
        cache.default_material = cache.insert(cache.fallback.clone());
        cache.fallback = cache.get(cache.default_material).clone();
        cache
    }

    /// Register a material, assigning its handle and index
    ///
    /// Registering a name twice shadows the earlier material for name lookups.
    pub fn insert(&mut self, mut material: Material) -> MaterialHandle {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.by_index.len() as u32;
        material.index = index;

        let name = material.name.clone();
        let handle = self.materials.insert_with_key(|handle| {
            material.handle = handle;
            material
        });

        self.by_index.push(handle);
        self.by_name.insert(name.to_ascii_lowercase(), handle);
        log::debug!("Registered material {name} at index {index}");
        handle
    }

    /// Material for `handle`, or the default material for stale handles
    pub fn get(&self, handle: MaterialHandle) -> &Material {
        self.materials.get(handle).unwrap_or(&self.fallback)
    }

    /// Mutable access for time offsets and remaps
    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    /// Material actually rendered for `handle`, following one remap
    pub fn resolve(&self, handle: MaterialHandle) -> &Material {
        let material = self.get(handle);
        material.remapped.map_or(material, |target| self.get(target))
    }

    /// Material by registration index
    pub fn by_index(&self, index: u32) -> Option<&Material> {
        self.by_index
            .get(index as usize)
            .and_then(|handle| self.materials.get(*handle))
    }

    /// Case-insensitive lookup by name
    pub fn find(&self, name: &str) -> Option<MaterialHandle> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Handle of the fallback material
    pub const fn default_material(&self) -> MaterialHandle {
        self.default_material
    }

    /// Register a named texture so materials can reference it
    pub fn register_texture(&mut self, name: &str, texture: TextureHandle) {
        self.textures.insert(name.to_ascii_lowercase(), texture);
    }

    /// Named texture lookup
    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(&name.to_ascii_lowercase()).copied()
    }

    /// Number of materials, default included
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Always false; the default material is permanent
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
