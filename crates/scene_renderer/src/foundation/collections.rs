//! Arena handles
//!
//! Materials live in a long-lived arena owned by the material cache, entities in
//! a per-frame arena owned by the scene aggregator. Both are referenced through
//! generational keys, so a handle that outlives its slot resolves to `None`
//! instead of dangling.

pub use slotmap::{Key, SlotMap};

slotmap::new_key_type! {
    /// Handle to a material in the material cache
    pub struct MaterialHandle;

    /// Handle to an entity submitted for the current frame
    pub struct EntityKey;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_entity_key_resolves_to_none() {
        let mut arena: SlotMap<EntityKey, u32> = SlotMap::with_key();
        let key = arena.insert(7);
        assert_eq!(arena.get(key), Some(&7));

        arena.clear();
        assert!(arena.get(key).is_none());

        // A new insertion reuses the slot with a bumped generation.
        let fresh = arena.insert(9);
        assert_ne!(key, fresh);
        assert!(arena.get(key).is_none());
    }

    #[test]
    fn test_default_handle_is_null() {
        assert!(MaterialHandle::default().is_null());
    }
}
