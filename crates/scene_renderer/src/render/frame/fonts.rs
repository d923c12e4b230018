//! Registered bitmap fonts
//!
//! Font files are parsed by the host; the registry resolves glyph materials
//! and deduplicates registrations by point size.

use crate::foundation::logging::{info, warn};
use crate::render::resources::materials::MaterialCache;

/// Fonts the registry holds at most
pub const MAX_FONTS: usize = 6;
/// Glyphs per font
pub const GLYPHS_PER_FONT: usize = 256;
/// Point size used when the caller passes zero or less
pub const DEFAULT_POINT_SIZE: i32 = 12;

/// One glyph of a font image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Glyph {
    /// Glyph height
    pub height: i32,
    /// Distance from the baseline to the top
    pub top: i32,
    /// Distance from the baseline to the bottom
    pub bottom: i32,
    /// Image pitch
    pub pitch: i32,
    /// Horizontal advance
    pub x_skip: i32,
    /// Image width
    pub image_width: i32,
    /// Image height
    pub image_height: i32,
    /// Left texture coordinate
    pub s: f32,
    /// Top texture coordinate
    pub t: f32,
    /// Right texture coordinate
    pub s2: f32,
    /// Bottom texture coordinate
    pub t2: f32,
    /// Material index the glyph draws with, 0 when unresolved
    pub material_index: u32,
    /// Material name from the font file
    pub material_name: String,
}

/// A parsed font
#[derive(Debug, Clone, PartialEq)]
pub struct FontInfo {
    /// File the font was read from
    pub name: String,
    /// Glyph table, indexed by character
    pub glyphs: Vec<Glyph>,
    /// Scale applied to glyph metrics
    pub glyph_scale: f32,
}

/// File holding the font image data for a point size
pub fn font_file_name(point_size: i32) -> String {
    format!("fonts/fontImage_{point_size}.dat")
}

/// Fonts registered so far
#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    fonts: Vec<FontInfo>,
}

impl FontRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered fonts
    pub fn fonts(&self) -> &[FontInfo] {
        &self.fonts
    }

    /// Register the font for `point_size`, loading it with `load` on first use
    ///
    /// `load` receives the resolved file name and returns `None` when the file
    /// is missing or malformed.
    pub fn register<F>(&mut self, name: &str, point_size: i32, materials: &MaterialCache, load: F) -> Option<FontInfo>
    where
        F: FnOnce(&str) -> Option<FontInfo>,
    {
        if name.is_empty() {
            info!("register_font: called with empty name");
            return None;
        }

        let point_size = if point_size <= 0 { DEFAULT_POINT_SIZE } else { point_size };
        let file_name = font_file_name(point_size);

        if let Some(font) = self.fonts.iter().find(|font| font.name.eq_ignore_ascii_case(&file_name)) {
            return Some(font.clone());
        }

        if self.fonts.len() >= MAX_FONTS {
            warn!("register_font: Too many fonts registered already");
            return None;
        }

        let mut font = load(&file_name)?;
        font.name = file_name;
        font.glyphs.resize(GLYPHS_PER_FONT, Glyph::default());

        for glyph in &mut font.glyphs {
            glyph.material_index = materials
                .find(&glyph.material_name)
                .map(|handle| materials.get(handle))
                .filter(|material| !material.is_default)
                .map_or(0, |material| material.index);
        }

        self.fonts.push(font.clone());
        Some(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resources::materials::{Material, MaterialSort};

    fn font_with_glyph(material_name: &str) -> FontInfo {
        let glyph = Glyph { material_name: material_name.to_string(), x_skip: 8, ..Glyph::default() };
        FontInfo { name: String::new(), glyphs: vec![glyph], glyph_scale: 1.0 }
    }

    #[test]
    fn test_empty_name_is_ignored() {
        let mut registry = FontRegistry::new();
        let materials = MaterialCache::new();

        assert!(registry.register("", 16, &materials, |_| Some(font_with_glyph("x"))).is_none());
        assert!(registry.fonts().is_empty());
    }

    #[test]
    fn test_point_size_defaults_and_dedups() {
        let mut registry = FontRegistry::new();
        let mut materials = MaterialCache::new();
        let handle = materials.insert(Material::new("fonts/glyph_a", MaterialSort::Nearest));
        let index = materials.get(handle).index;
        let mut loads = Vec::new();

        let font = registry
            .register("bigchars", 0, &materials, |file| {
                loads.push(file.to_string());
                Some(font_with_glyph("fonts/glyph_a"))
            })
            .expect("font");
        assert_eq!(font.name, "fonts/fontImage_12.dat");
        assert_eq!(font.glyphs.len(), GLYPHS_PER_FONT);
        assert_eq!(font.glyphs[0].material_index, index);
        assert_eq!(font.glyphs[1].material_index, 0);

        let again = registry.register("other", 12, &materials, |file| {
            loads.push(file.to_string());
            None
        });
        assert_eq!(again, Some(font));
        assert_eq!(loads, vec!["fonts/fontImage_12.dat".to_string()]);
    }

    #[test]
    fn test_registry_is_capped() {
        let mut registry = FontRegistry::new();
        let materials = MaterialCache::new();

        for size in 1..=8 {
            registry.register("font", size, &materials, |_| Some(font_with_glyph("missing")));
        }

        assert_eq!(registry.fonts().len(), MAX_FONTS);
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let mut registry = FontRegistry::new();
        let materials = MaterialCache::new();

        assert!(registry.register("font", 24, &materials, |_| None).is_none());
        assert!(registry.fonts().is_empty());
    }
}
