// SPDX-License-Identifier: MIT OR Apache-2.0
//! Real-world unit definitions and linear conversion.

use crate::value::Value;
use indexmap::IndexMap;

/// A unit family: named units with linear scales relative to a default
#[derive(Debug, Clone)]
pub struct UnitTypeDef {
    /// Family name, e.g. "distance"
    pub name: String,
    /// Default unit name
    pub default_unit: String,
    /// Scale of each unit expressed in the default unit
    pub scales: IndexMap<String, f32>,
}

/// The standard distance unit family, scaled in meters
pub fn distance_unit_type() -> UnitTypeDef {
    let mut scales = IndexMap::new();
    scales.insert("nanometer".to_string(), 1.0e-9);
    scales.insert("micrometer".to_string(), 1.0e-6);
    scales.insert("millimeter".to_string(), 1.0e-3);
    scales.insert("centimeter".to_string(), 1.0e-2);
    scales.insert("meter".to_string(), 1.0);
    scales.insert("kilometer".to_string(), 1.0e3);
    scales.insert("inch".to_string(), 0.0254);
    scales.insert("foot".to_string(), 0.3048);
    scales.insert("yard".to_string(), 0.9144);
    scales.insert("mile".to_string(), 1609.344);
    UnitTypeDef {
        name: "distance".to_string(),
        default_unit: "meter".to_string(),
        scales,
    }
}

/// The standard angle unit family, scaled in degrees
pub fn angle_unit_type() -> UnitTypeDef {
    let mut scales = IndexMap::new();
    scales.insert("degree".to_string(), 1.0);
    scales.insert("radian".to_string(), 57.295_78);
    UnitTypeDef {
        name: "angle".to_string(),
        default_unit: "degree".to_string(),
        scales,
    }
}

/// Linear converter over one unit family
#[derive(Debug, Clone)]
pub struct LinearUnitConverter {
    def: UnitTypeDef,
}

impl LinearUnitConverter {
    /// Build a converter from a unit family definition
    pub fn new(def: UnitTypeDef) -> Self {
        Self { def }
    }

    /// Family name this converter handles
    pub fn unit_type(&self) -> &str {
        &self.def.name
    }

    /// Scale table, in declaration order
    pub fn unit_scales(&self) -> &IndexMap<String, f32> {
        &self.def.scales
    }

    /// Stable integer index of a unit name, for enumeration
    pub fn unit_as_integer(&self, unit: &str) -> Option<usize> {
        self.def.scales.get_index_of(unit)
    }

    /// Convert a scalar between two named units
    pub fn convert(&self, value: f32, from: &str, to: &str) -> Result<f32, UnitError> {
        if from == to {
            return Ok(value);
        }
        let from_scale = self.scale(from)?;
        let to_scale = self.scale(to)?;
        Ok(value * from_scale / to_scale)
    }

    /// Convert every float component of a value between two named units.
    ///
    /// Non-numeric values pass through unchanged.
    pub fn convert_value(&self, value: &Value, from: &str, to: &str) -> Result<Value, UnitError> {
        if from == to {
            return Ok(value.clone());
        }
        let from_scale = self.scale(from)?;
        let to_scale = self.scale(to)?;
        let factor = from_scale / to_scale;
        Ok(match value {
            Value::Float(f) => Value::Float(f * factor),
            Value::Vector2(v) => Value::Vector2(v.map(|c| c * factor)),
            Value::Vector3(v) => Value::Vector3(v.map(|c| c * factor)),
            Value::Vector4(v) => Value::Vector4(v.map(|c| c * factor)),
            other => other.clone(),
        })
    }

    fn scale(&self, unit: &str) -> Result<f32, UnitError> {
        self.def
            .scales
            .get(unit)
            .copied()
            .ok_or_else(|| UnitError::UnknownUnit {
                unit_type: self.def.name.clone(),
                unit: unit.to_string(),
            })
    }
}

/// Registry of unit converters keyed by family name
#[derive(Debug, Clone, Default)]
pub struct UnitConverterRegistry {
    converters: IndexMap<String, LinearUnitConverter>,
}

impl UnitConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the standard distance and angle families
    pub fn with_standard_units() -> Self {
        let mut registry = Self::new();
        registry.add_converter(LinearUnitConverter::new(distance_unit_type()));
        registry.add_converter(LinearUnitConverter::new(angle_unit_type()));
        registry
    }

    /// Register a converter for its unit family
    pub fn add_converter(&mut self, converter: LinearUnitConverter) {
        self.converters
            .insert(converter.unit_type().to_string(), converter);
    }

    /// Look up the converter for a unit family
    pub fn converter(&self, unit_type: &str) -> Option<&LinearUnitConverter> {
        self.converters.get(unit_type)
    }

    /// Find the converter whose family contains the given unit name
    pub fn converter_for_unit(&self, unit: &str) -> Option<&LinearUnitConverter> {
        self.converters
            .values()
            .find(|c| c.unit_scales().contains_key(unit))
    }
}

/// Error raised by unit conversion
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnitError {
    /// Unit name is not part of the family
    #[error("Unknown {unit_type} unit {unit:?}")]
    UnknownUnit {
        /// Unit family
        unit_type: String,
        /// Offending unit name
        unit: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_conversion() {
        let converter = LinearUnitConverter::new(distance_unit_type());
        let cm = converter.convert(2.0, "meter", "centimeter").unwrap();
        assert!((cm - 200.0).abs() < 1e-4);
    }

    #[test]
    fn test_vector_value_conversion() {
        let converter = LinearUnitConverter::new(distance_unit_type());
        let v = Value::Vector3([1.0, 2.0, 3.0]);
        let converted = converter
            .convert_value(&v, "millimeter", "meter")
            .unwrap();
        assert_eq!(converted, Value::Vector3([0.001, 0.002, 0.003]));
    }

    #[test]
    fn test_unknown_unit_is_error() {
        let converter = LinearUnitConverter::new(distance_unit_type());
        assert!(matches!(
            converter.convert(1.0, "meter", "parsec"),
            Err(UnitError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_unit_indices_are_stable() {
        let converter = LinearUnitConverter::new(distance_unit_type());
        assert_eq!(converter.unit_as_integer("meter"), Some(4));
        assert_eq!(converter.unit_as_integer("parsec"), None);
    }

    #[test]
    fn test_registry_resolves_family_by_unit() {
        let registry = UnitConverterRegistry::with_standard_units();
        let converter = registry.converter_for_unit("radian").unwrap();
        assert_eq!(converter.unit_type(), "angle");
    }
}
