// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed attribute values and their textual representation.

use serde::{Deserialize, Serialize};

/// Data type declared by a port or attribute type-string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Floating point value
    Float,
    /// Integer value
    Integer,
    /// Boolean value
    Boolean,
    /// RGB color
    Color3,
    /// RGBA color
    Color4,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// 3x3 matrix, row-major
    Matrix33,
    /// 4x4 matrix, row-major
    Matrix44,
    /// String value
    String,
    /// File path value
    Filename,
}

impl ValueType {
    /// Resolve a declared type-string ("color3", "filename", ...)
    pub fn from_type_string(ty: &str) -> Result<Self, ValueError> {
        Ok(match ty {
            "float" => Self::Float,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "color3" => Self::Color3,
            "color4" => Self::Color4,
            "vector2" => Self::Vector2,
            "vector3" => Self::Vector3,
            "vector4" => Self::Vector4,
            "matrix33" => Self::Matrix33,
            "matrix44" => Self::Matrix44,
            "string" => Self::String,
            "filename" => Self::Filename,
            _ => return Err(ValueError::UnknownTypeString(ty.to_string())),
        })
    }

    /// The declared type-string for this type
    pub fn type_string(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Color3 => "color3",
            Self::Color4 => "color4",
            Self::Vector2 => "vector2",
            Self::Vector3 => "vector3",
            Self::Vector4 => "vector4",
            Self::Matrix33 => "matrix33",
            Self::Matrix44 => "matrix44",
            Self::String => "string",
            Self::Filename => "filename",
        }
    }

    /// Number of float components, for numeric types
    pub fn component_count(&self) -> Option<usize> {
        match self {
            Self::Float => Some(1),
            Self::Vector2 => Some(2),
            Self::Color3 | Self::Vector3 => Some(3),
            Self::Color4 | Self::Vector4 => Some(4),
            Self::Matrix33 => Some(9),
            Self::Matrix44 => Some(16),
            Self::Integer | Self::Boolean | Self::String | Self::Filename => None,
        }
    }
}

/// A typed value carried by an input or attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Floating point
    Float(f32),
    /// Integer
    Integer(i32),
    /// Boolean
    Boolean(bool),
    /// RGB color
    Color3([f32; 3]),
    /// RGBA color
    Color4([f32; 4]),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// 3x3 matrix, row-major
    Matrix33([f32; 9]),
    /// 4x4 matrix, row-major
    Matrix44([f32; 16]),
    /// String
    String(String),
    /// File path
    Filename(String),
}

fn parse_components<const N: usize>(ty: ValueType, text: &str) -> Result<[f32; N], ValueError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(ValueError::Malformed {
            ty,
            text: text.to_string(),
        });
    }
    let mut out = [0.0f32; N];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| ValueError::Malformed {
            ty,
            text: text.to_string(),
        })?;
    }
    Ok(out)
}

fn format_components(components: &[f32]) -> String {
    components
        .iter()
        .map(|c| format!("{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Value {
    /// Parse a textual attribute value against its declared type
    pub fn parse(ty: ValueType, text: &str) -> Result<Self, ValueError> {
        let text = text.trim();
        Ok(match ty {
            ValueType::Float => Self::Float(text.parse().map_err(|_| ValueError::Malformed {
                ty,
                text: text.to_string(),
            })?),
            ValueType::Integer => Self::Integer(text.parse().map_err(|_| ValueError::Malformed {
                ty,
                text: text.to_string(),
            })?),
            ValueType::Boolean => match text {
                "true" => Self::Boolean(true),
                "false" => Self::Boolean(false),
                _ => {
                    return Err(ValueError::Malformed {
                        ty,
                        text: text.to_string(),
                    })
                }
            },
            ValueType::Color3 => Self::Color3(parse_components(ty, text)?),
            ValueType::Color4 => Self::Color4(parse_components(ty, text)?),
            ValueType::Vector2 => Self::Vector2(parse_components(ty, text)?),
            ValueType::Vector3 => Self::Vector3(parse_components(ty, text)?),
            ValueType::Vector4 => Self::Vector4(parse_components(ty, text)?),
            ValueType::Matrix33 => Self::Matrix33(parse_components(ty, text)?),
            ValueType::Matrix44 => Self::Matrix44(parse_components(ty, text)?),
            ValueType::String => Self::String(text.to_string()),
            ValueType::Filename => Self::Filename(text.to_string()),
        })
    }

    /// The zero value of a type, used when a port has neither a literal
    /// value nor a nodedef default
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Float => Self::Float(0.0),
            ValueType::Integer => Self::Integer(0),
            ValueType::Boolean => Self::Boolean(false),
            ValueType::Color3 => Self::Color3([0.0; 3]),
            ValueType::Color4 => Self::Color4([0.0; 4]),
            ValueType::Vector2 => Self::Vector2([0.0; 2]),
            ValueType::Vector3 => Self::Vector3([0.0; 3]),
            ValueType::Vector4 => Self::Vector4([0.0; 4]),
            ValueType::Matrix33 => Self::Matrix33([0.0; 9]),
            ValueType::Matrix44 => Self::Matrix44([0.0; 16]),
            ValueType::String => Self::String(String::new()),
            ValueType::Filename => Self::Filename(String::new()),
        }
    }

    /// The type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Float(_) => ValueType::Float,
            Self::Integer(_) => ValueType::Integer,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Color3(_) => ValueType::Color3,
            Self::Color4(_) => ValueType::Color4,
            Self::Vector2(_) => ValueType::Vector2,
            Self::Vector3(_) => ValueType::Vector3,
            Self::Vector4(_) => ValueType::Vector4,
            Self::Matrix33(_) => ValueType::Matrix33,
            Self::Matrix44(_) => ValueType::Matrix44,
            Self::String(_) => ValueType::String,
            Self::Filename(_) => ValueType::Filename,
        }
    }

    /// Get as a float, if this is a float value
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as an integer, if this is an integer value
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean, if this is a boolean value
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a string slice, for string and filename values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Filename(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric components of this value, if it is float-component shaped
    pub fn components(&self) -> Option<&[f32]> {
        match self {
            Self::Float(f) => Some(std::slice::from_ref(f)),
            Self::Color3(c) | Self::Vector3(c) => Some(c),
            Self::Color4(c) | Self::Vector4(c) => Some(c),
            Self::Vector2(v) => Some(v),
            Self::Matrix33(m) => Some(m),
            Self::Matrix44(m) => Some(m),
            Self::Integer(_) | Self::Boolean(_) | Self::String(_) | Self::Filename(_) => None,
        }
    }

    /// Convert to a 4-component host color.
    ///
    /// A `color3` widens with alpha 1.0. Matrix values have no host color
    /// representation and report `UnsupportedType` instead of dropping the
    /// value.
    pub fn to_host_color(&self) -> Result<[f32; 4], ValueError> {
        match self {
            Self::Color3([r, g, b]) => Ok([*r, *g, *b, 1.0]),
            Self::Color4(c) | Self::Vector4(c) => Ok(*c),
            Self::Float(f) => Ok([*f, *f, *f, 1.0]),
            other => Err(ValueError::UnsupportedType {
                ty: other.value_type(),
                context: "host color".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Color3(c) => write!(f, "{}", format_components(c)),
            Self::Color4(c) => write!(f, "{}", format_components(c)),
            Self::Vector2(c) => write!(f, "{}", format_components(c)),
            Self::Vector3(c) => write!(f, "{}", format_components(c)),
            Self::Vector4(c) => write!(f, "{}", format_components(c)),
            Self::Matrix33(c) => write!(f, "{}", format_components(c)),
            Self::Matrix44(c) => write!(f, "{}", format_components(c)),
            Self::String(s) | Self::Filename(s) => write!(f, "{s}"),
        }
    }
}

/// Error for value parsing and conversion
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueError {
    /// Declared type-string is not a known type
    #[error("Unknown type string: {0:?}")]
    UnknownTypeString(String),

    /// Value text does not parse against the declared type
    #[error("Malformed {} value: {text:?}", ty.type_string())]
    Malformed {
        /// Declared type
        ty: ValueType,
        /// Offending text
        text: String,
    },

    /// Value has no representation in the requested context
    #[error("Unsupported {} value in {context}", ty.type_string())]
    UnsupportedType {
        /// Value type
        ty: ValueType,
        /// Conversion context
        context: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color3() {
        let v = Value::parse(ValueType::Color3, "1, 0, 0").unwrap();
        assert_eq!(v, Value::Color3([1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_color3_widens_to_host_color() {
        let v = Value::parse(ValueType::Color3, "1, 0, 0").unwrap();
        assert_eq!(v.to_host_color().unwrap(), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_matrix_host_conversion_is_unsupported() {
        let v = Value::parse(
            ValueType::Matrix33,
            "1, 0, 0, 0, 1, 0, 0, 0, 1",
        )
        .unwrap();
        assert!(matches!(
            v.to_host_color(),
            Err(ValueError::UnsupportedType { ty: ValueType::Matrix33, .. })
        ));
    }

    #[test]
    fn test_wrong_arity_is_malformed() {
        assert!(matches!(
            Value::parse(ValueType::Vector2, "1, 2, 3"),
            Err(ValueError::Malformed { .. })
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let v = Value::parse(ValueType::Vector3, "0.5, 1, 2").unwrap();
        let text = v.to_string();
        assert_eq!(Value::parse(ValueType::Vector3, &text).unwrap(), v);
    }

    #[test]
    fn test_unknown_type_string() {
        assert!(matches!(
            ValueType::from_type_string("quaternion"),
            Err(ValueError::UnknownTypeString(_))
        ));
    }
}
