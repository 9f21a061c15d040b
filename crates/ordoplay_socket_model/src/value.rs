// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried by socket rows and the rules for converting between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Facet of a row's data that is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Human-readable text (node titles, socket labels)
    Display,
    /// Value as shown in an editor
    Edit,
    /// Raw value propagated along connections
    Value,
    /// Source-defined role
    Custom(u16),
}

/// Declared type of a row's value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// String value
    String,
    /// Accepts any value
    Any,
    /// Custom type, only compatible with itself
    Custom(String),
}

impl ValueType {
    /// Check if a value of this type can be converted into `target`
    pub fn can_convert_to(&self, target: &ValueType) -> bool {
        if matches!(target, Self::Any) || self == target {
            return true;
        }

        match (self, target) {
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => true,
            (Self::Bool, Self::Int) | (Self::Int, Self::Bool) => true,
            (Self::Bool | Self::Int | Self::Float, Self::String) => true,
            (Self::Float, Self::Vector2 | Self::Vector3 | Self::Vector4) => true,
            (Self::Vector2, Self::Vector3 | Self::Vector4) => true,
            (Self::Vector3, Self::Vector4) => true,
            (Self::Color, Self::Vector4) | (Self::Vector4, Self::Color) => true,
            _ => false,
        }
    }

    /// Check if a row declared with this type accepts a payload of `payload` type
    pub fn accepts(&self, payload: &ValueType) -> bool {
        payload.can_convert_to(self)
    }
}

/// Value stored in a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color
    Color([f32; 4]),
    /// String
    String(String),
    /// Custom type name with an opaque payload
    Custom(String, String),
}

impl Value {
    /// Get the declared type for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Vector2(_) => ValueType::Vector2,
            Self::Vector3(_) => ValueType::Vector3,
            Self::Vector4(_) => ValueType::Vector4,
            Self::Color(_) => ValueType::Color,
            Self::String(_) => ValueType::String,
            Self::Custom(name, _) => ValueType::Custom(name.clone()),
        }
    }

    /// Convert this value into `target`, following [`ValueType::can_convert_to`]
    pub fn convert_to(&self, target: &ValueType) -> Option<Value> {
        if matches!(target, ValueType::Any) || self.value_type() == *target {
            return Some(self.clone());
        }

        let converted = match (self, target) {
            (Self::Int(v), ValueType::Float) => Self::Float(*v as f64),
            (Self::Float(v), ValueType::Int) => Self::Int(v.trunc() as i64),
            (Self::Bool(v), ValueType::Int) => Self::Int(i64::from(*v)),
            (Self::Int(v), ValueType::Bool) => Self::Bool(*v != 0),
            (Self::Bool(_) | Self::Int(_) | Self::Float(_), ValueType::String) => {
                Self::String(self.to_string())
            }
            (Self::Float(v), ValueType::Vector2) => Self::Vector2([*v as f32; 2]),
            (Self::Float(v), ValueType::Vector3) => Self::Vector3([*v as f32; 3]),
            (Self::Float(v), ValueType::Vector4) => Self::Vector4([*v as f32; 4]),
            (Self::Vector2([x, y]), ValueType::Vector3) => Self::Vector3([*x, *y, 0.0]),
            (Self::Vector2([x, y]), ValueType::Vector4) => Self::Vector4([*x, *y, 0.0, 0.0]),
            (Self::Vector3([x, y, z]), ValueType::Vector4) => Self::Vector4([*x, *y, *z, 0.0]),
            (Self::Color(c), ValueType::Vector4) => Self::Vector4(*c),
            (Self::Vector4(v), ValueType::Color) => Self::Color(*v),
            _ => return None,
        };

        Some(converted)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Vector2(v) => write!(f, "{v:?}"),
            Self::Vector3(v) => write!(f, "{v:?}"),
            Self::Vector4(v) | Self::Color(v) => write!(f, "{v:?}"),
            Self::String(v) => f.write_str(v),
            Self::Custom(name, payload) => write!(f, "{name}({payload})"),
        }
    }
}
