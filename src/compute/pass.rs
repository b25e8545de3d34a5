//! Compute pass - a program plus its typed uniform inputs.

use crate::schema::{
    GridSize, InputKind, NameError, UniformDecl, UniformValue, validate_input_name,
};

use super::PassLayout;

/// A per-cell program with the uniform inputs it reads.
///
/// Surface inputs are not part of the pass itself: the engine adds one per
/// dependency of the owning variable when it compiles the pass.
#[derive(Debug, Clone)]
pub struct ComputePass<P> {
    label: String,
    program: P,
    uniforms: Vec<UniformDecl>,
    values: Vec<UniformValue>,
}

impl<P> ComputePass<P> {
    /// Create a pass with no uniform inputs.
    pub fn new(label: impl Into<String>, program: P) -> Self {
        Self {
            label: label.into(),
            program,
            uniforms: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Declare a uniform input. Its default becomes the current value.
    pub fn with_uniform(mut self, decl: UniformDecl) -> Self {
        self.values.push(decl.default);
        self.uniforms.push(decl);
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn program(&self) -> &P {
        &self.program
    }

    /// Declared uniforms, in binding order.
    #[inline]
    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }

    /// Current uniform values, aligned with [`uniforms`](Self::uniforms).
    #[inline]
    pub fn values(&self) -> &[UniformValue] {
        &self.values
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        let i = self.uniforms.iter().position(|u| u.name == name)?;
        Some(self.values[i])
    }

    /// Whether `name` is one of this pass's uniform names.
    pub fn declares(&self, name: &str) -> bool {
        self.uniforms.iter().any(|u| u.name == name)
    }

    /// Check uniform names: valid identifiers, no duplicates.
    pub fn validate(&self) -> Result<(), PassError> {
        for (i, decl) in self.uniforms.iter().enumerate() {
            validate_input_name(&decl.name)?;
            if self.uniforms[..i].iter().any(|u| u.name == decl.name) {
                return Err(PassError::DuplicateUniform(decl.name.clone()));
            }
        }
        Ok(())
    }

    /// Update a uniform value. The kind must match the declaration.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), PassError> {
        let i = self
            .uniforms
            .iter()
            .position(|u| u.name == name)
            .ok_or_else(|| PassError::UnknownUniform(name.to_string()))?;
        let expected = self.uniforms[i].kind();
        if value.kind() != expected {
            return Err(PassError::UniformKind {
                name: name.to_string(),
                expected,
                found: value.kind(),
            });
        }
        self.values[i] = value;
        Ok(())
    }

    /// Named-input table for this pass reading the given surfaces.
    pub fn layout(&self, resolution: GridSize, surfaces: Vec<String>) -> PassLayout {
        PassLayout {
            resolution,
            surfaces,
            uniforms: self.uniforms.clone(),
        }
    }
}

/// Errors in a pass's uniform declarations or updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassError {
    #[error("Invalid uniform name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Uniform '{0}' declared twice")]
    DuplicateUniform(String),

    #[error("Unknown uniform '{0}'")]
    UnknownUniform(String),

    #[error("Uniform '{name}' is {expected:?}, got {found:?}")]
    UniformKind {
        name: String,
        expected: InputKind,
        found: InputKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> ComputePass<()> {
        ComputePass::new("ripple", ())
            .with_uniform(UniformDecl::scalar("viscosity", 0.98))
            .with_uniform(UniformDecl::vec2("mouse", [0.5, 0.5]))
    }

    #[test]
    fn test_defaults_are_current_values() {
        let p = pass();
        assert_eq!(p.uniform("viscosity"), Some(UniformValue::Scalar(0.98)));
        assert_eq!(p.values().len(), 2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_set_uniform_type_checked() {
        let mut p = pass();
        p.set_uniform("mouse", UniformValue::Vec2([0.1, 0.2])).unwrap();
        assert_eq!(p.uniform("mouse"), Some(UniformValue::Vec2([0.1, 0.2])));

        let err = p.set_uniform("mouse", UniformValue::Scalar(1.0)).unwrap_err();
        assert!(matches!(err, PassError::UniformKind { expected: InputKind::Vec2, .. }));
        assert_eq!(p.uniform("mouse"), Some(UniformValue::Vec2([0.1, 0.2])));

        assert_eq!(
            p.set_uniform("nope", UniformValue::Scalar(1.0)),
            Err(PassError::UnknownUniform("nope".into()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_declarations() {
        let dup = pass().with_uniform(UniformDecl::scalar("viscosity", 1.0));
        assert_eq!(dup.validate(), Err(PassError::DuplicateUniform("viscosity".into())));

        let reserved = ComputePass::new("p", ()).with_uniform(UniformDecl::scalar("resolution", 1.0));
        assert!(matches!(reserved.validate(), Err(PassError::InvalidName(_))));
    }

    #[test]
    fn test_layout_carries_uniforms() {
        let layout = pass().layout(GridSize::new(2, 2), vec!["heightmap".into()]);
        assert_eq!(layout.surfaces, vec!["heightmap".to_string()]);
        assert_eq!(layout.uniform_index("mouse"), Some(1));
    }
}
