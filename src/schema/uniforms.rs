//! Typed pass inputs.
//!
//! A pass declares the scalar inputs it reads up front, with a type and a
//! default value. Surface inputs are not declared here: they come from the
//! owning variable's dependencies and are named after them.

use serde::{Deserialize, Serialize};

/// Names that collide with values every pass already receives.
///
/// Generated shader code binds inputs under an `in_` prefix and pads the
/// parameter block with `_pad` fields, so only these and WGSL keywords can
/// clash.
pub const RESERVED_NAMES: &[&str] = &["params", "output", "resolution", "main", "compute_cell", "cell"];

/// WGSL keywords and predeclared type names.
const SHADER_KEYWORDS: &[&str] = &[
    "alias", "array", "bitcast", "bool", "break", "case", "const", "const_assert", "continue",
    "continuing", "default", "diagnostic", "discard", "else", "enable", "f16", "f32", "false",
    "fn", "for", "i32", "if", "let", "loop", "mat2x2", "mat3x3", "mat4x4", "override", "ptr",
    "requires", "return", "sampler", "struct", "switch", "true", "u32", "var", "vec2", "vec3",
    "vec4", "while",
];

/// Kind of a uniform input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Scalar,
    Vec2,
}

/// Value of a non-surface pass input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
}

impl UniformValue {
    pub fn kind(&self) -> InputKind {
        match self {
            UniformValue::Scalar(_) => InputKind::Scalar,
            UniformValue::Vec2(_) => InputKind::Vec2,
        }
    }

    /// Pack into one 16-byte slot, zero padded.
    pub fn to_slot(&self) -> [f32; 4] {
        match *self {
            UniformValue::Scalar(v) => [v, 0.0, 0.0, 0.0],
            UniformValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
        }
    }
}

/// Declaration of one uniform input with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformDecl {
    pub name: String,
    pub default: UniformValue,
}

impl UniformDecl {
    pub fn scalar(name: impl Into<String>, default: f32) -> Self {
        Self {
            name: name.into(),
            default: UniformValue::Scalar(default),
        }
    }

    pub fn vec2(name: impl Into<String>, default: [f32; 2]) -> Self {
        Self {
            name: name.into(),
            default: UniformValue::Vec2(default),
        }
    }

    #[inline]
    pub fn kind(&self) -> InputKind {
        self.default.kind()
    }
}

/// Check that `name` can be used as a pass input name.
///
/// Input names become identifiers in generated shader code, so they follow
/// identifier rules and may not shadow the built-in names.
pub fn validate_input_name(name: &str) -> Result<(), NameError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(NameError::NotIdentifier(name.to_string()));
    }
    // WGSL reserves identifiers starting with two underscores.
    if name == "_"
        || name.starts_with("__")
        || name.starts_with("_pad")
        || RESERVED_NAMES.contains(&name)
        || SHADER_KEYWORDS.contains(&name)
    {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}

/// Input name validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("'{0}' is not a valid identifier")]
    NotIdentifier(String),
    #[error("'{0}' is reserved")]
    Reserved(String),
}
