//! Long-lived renderer resources

pub mod materials;
