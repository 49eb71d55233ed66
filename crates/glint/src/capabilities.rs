use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

/// The effect and palette names a device is able to render.
///
/// The position of a name inside its list is the identifier a device expects
/// when an effect or a palette is applied to one of its segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Capabilities {
    /// Effect names.
    #[serde(default)]
    pub effects: Vec<String>,
    /// Palette names.
    #[serde(default)]
    pub palettes: Vec<String>,
}

fn position(names: &[String], name: &str) -> Option<u16> {
    names
        .iter()
        .position(|n| n == name)
        .and_then(|index| u16::try_from(index).ok())
}

impl Capabilities {
    /// Creates [`Capabilities`] from effect and palette names.
    #[must_use]
    #[inline]
    pub const fn new(effects: Vec<String>, palettes: Vec<String>) -> Self {
        Self { effects, palettes }
    }

    /// Returns the identifier of the effect with the given name.
    #[must_use]
    pub fn effect_id(&self, name: &str) -> Option<u16> {
        position(&self.effects, name)
    }

    /// Returns the identifier of the palette with the given name.
    #[must_use]
    pub fn palette_id(&self, name: &str) -> Option<u16> {
        position(&self.palettes, name)
    }

    /// Checks whether both lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.palettes.is_empty()
    }
}
