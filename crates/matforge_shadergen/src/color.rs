// SPDX-License-Identifier: MIT OR Apache-2.0
//! Color space transforms applied to color-valued inputs.

use indexmap::IndexMap;
use matforge_document::Value;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// A per-component color transform
pub type ColorTransform = fn(f32) -> f32;

/// Registry of color space transforms keyed by (source, target) space.
///
/// Ships with srgb ↔ linear Rec.709 transforms; hosts may register more.
/// Values in an unknown space pass through unchanged, matching the
/// source-document convention that untagged colors are already in the
/// working space.
#[derive(Debug, Clone)]
pub struct ColorManagementSystem {
    transforms: IndexMap<(String, String), ColorTransform>,
}

/// Name of the sRGB texture color space
pub const SRGB_TEXTURE: &str = "srgb_texture";
/// Name of the linear Rec.709 working color space
pub const LIN_REC709: &str = "lin_rec709";

impl ColorManagementSystem {
    /// Create a system with the default srgb ↔ linear transforms
    pub fn new() -> Self {
        let mut transforms: IndexMap<(String, String), ColorTransform> = IndexMap::new();
        transforms.insert(
            (SRGB_TEXTURE.to_string(), LIN_REC709.to_string()),
            srgb_to_linear,
        );
        transforms.insert(
            (LIN_REC709.to_string(), SRGB_TEXTURE.to_string()),
            linear_to_srgb,
        );
        Self { transforms }
    }

    /// Register a transform between two named spaces
    pub fn register(&mut self, from: &str, to: &str, transform: ColorTransform) {
        self.transforms
            .insert((from.to_string(), to.to_string()), transform);
    }

    /// Whether a transform between the two spaces is known
    pub fn supports(&self, from: &str, to: &str) -> bool {
        from == to || self.transforms.contains_key(&(from.to_string(), to.to_string()))
    }

    /// Transform the color components of a value between two spaces.
    ///
    /// Alpha components and non-color values pass through unchanged, as do
    /// values in an unknown space.
    pub fn transform(&self, value: &Value, from: &str, to: &str) -> Value {
        if from == to {
            return value.clone();
        }
        let Some(transform) = self.transforms.get(&(from.to_string(), to.to_string())) else {
            return value.clone();
        };
        match value {
            Value::Color3(c) => Value::Color3(c.map(transform)),
            Value::Color4([r, g, b, a]) => {
                Value::Color4([transform(*r), transform(*g), transform(*b), *a])
            }
            other => other.clone(),
        }
    }
}

impl Default for ColorManagementSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_round_trip() {
        let cms = ColorManagementSystem::new();
        let srgb = Value::Color3([0.5, 0.25, 1.0]);
        let linear = cms.transform(&srgb, SRGB_TEXTURE, LIN_REC709);
        let back = cms.transform(&linear, LIN_REC709, SRGB_TEXTURE);
        let (Value::Color3(original), Value::Color3(restored)) = (&srgb, &back) else {
            panic!("expected color3");
        };
        for (a, b) in original.iter().zip(restored) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_alpha_passes_through() {
        let cms = ColorManagementSystem::new();
        let c = Value::Color4([0.5, 0.5, 0.5, 0.25]);
        let Value::Color4(out) = cms.transform(&c, SRGB_TEXTURE, LIN_REC709) else {
            panic!("expected color4");
        };
        assert_eq!(out[3], 0.25);
    }

    #[test]
    fn test_unknown_space_passes_through() {
        let cms = ColorManagementSystem::new();
        let c = Value::Color3([0.5, 0.5, 0.5]);
        assert_eq!(cms.transform(&c, "aces", LIN_REC709), c);
        assert!(!cms.supports("aces", LIN_REC709));
    }
}
