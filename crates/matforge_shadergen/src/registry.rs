// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-(category, target) implementation dispatch.
//!
//! Each node category is implemented per target by a [`SourceImpl`]: a
//! descriptor of the hooks the generator invokes in a fixed order for every
//! node. The registry replaces a virtual-method hierarchy with an open
//! table, so new categories and targets register without subclassing.

use crate::graph::{ShaderGenError, ShaderGraph, ShaderNode};
use crate::stage::{Shader, ShaderStage};
use indexmap::IndexMap;
use std::sync::Arc;

/// A target-specific node implementation.
///
/// The generator invokes [`SourceImpl::create_variables`] once per node,
/// then [`SourceImpl::emit_function_call`] once per node per stage;
/// implementations decide per stage whether they contribute statements.
pub trait SourceImpl: Send + Sync {
    /// Whether nodes of this implementation sample per-pixel geometry or
    /// texture data, making their subgraph spatially varying
    fn requires_geometry(&self) -> bool {
        false
    }

    /// Declare uniforms, vertex inputs and interpolants this node needs.
    ///
    /// Declarations are idempotent per variable name; re-declaration hands
    /// back the existing port.
    fn create_variables(
        &self,
        _node: &ShaderNode,
        _graph: &ShaderGraph,
        _shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        Ok(())
    }

    /// Emit a helper function definition, at most once per stage
    fn emit_function_definition(
        &self,
        _node: &ShaderNode,
        _graph: &ShaderGraph,
        _stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        Ok(())
    }

    /// Append the statement(s) computing this node's output into the stage
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError>;
}

/// Registry mapping (category, target) to a node implementation
#[derive(Default)]
pub struct ImplRegistry {
    implementations: IndexMap<(String, String), Arc<dyn SourceImpl>>,
}

impl ImplRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation for a node category on a target
    pub fn register(
        &mut self,
        category: impl Into<String>,
        target: impl Into<String>,
        implementation: Arc<dyn SourceImpl>,
    ) {
        self.implementations
            .insert((category.into(), target.into()), implementation);
    }

    /// Resolve the implementation for a node category on a target
    pub fn source_impl(&self, category: &str, target: &str) -> Option<Arc<dyn SourceImpl>> {
        self.implementations
            .get(&(category.to_string(), target.to_string()))
            .cloned()
    }

    /// Registered (category, target) pairs in registration order
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.implementations
            .keys()
            .map(|(c, t)| (c.as_str(), t.as_str()))
    }

    /// Number of registered implementations
    pub fn len(&self) -> usize {
        self.implementations.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }
}

impl std::fmt::Debug for ImplRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImplRegistry")
            .field("implementations", &self.implementations.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl SourceImpl for Noop {
        fn emit_function_call(
            &self,
            _node: &ShaderNode,
            _graph: &ShaderGraph,
            _stage: &mut ShaderStage,
        ) -> Result<(), ShaderGenError> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_is_target_scoped() {
        let mut registry = ImplRegistry::new();
        registry.register("constant", "genglsl", Arc::new(Noop));
        assert!(registry.source_impl("constant", "genglsl").is_some());
        assert!(registry.source_impl("constant", "genmsl").is_none());
        assert!(registry.source_impl("image", "genglsl").is_none());
    }

    #[test]
    fn test_registration_order_is_stable() {
        let mut registry = ImplRegistry::new();
        registry.register("b", "t", Arc::new(Noop));
        registry.register("a", "t", Arc::new(Noop));
        let keys: Vec<_> = registry.keys().map(|(c, _)| c).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
