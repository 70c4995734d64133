// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generation context and options.

use crate::color::{ColorManagementSystem, LIN_REC709};
use crate::registry::ImplRegistry;
use matforge_document::UnitConverterRegistry;

/// Options applied while building shader graphs
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Unit length-valued inputs are rescaled to
    pub target_distance_unit: String,
    /// Color space emitted code computes in
    pub target_color_space: String,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            target_distance_unit: "meter".to_string(),
            target_color_space: LIN_REC709.to_string(),
        }
    }
}

/// Shared state for one generation run.
///
/// Built once per target, then treated as read-only: the implementation
/// registry, color system and unit registry never change after
/// construction, so independent materials can be generated against the
/// same context.
pub struct GenContext {
    target: String,
    /// Generation options
    pub options: GenOptions,
    registry: ImplRegistry,
    color_system: ColorManagementSystem,
    units: UnitConverterRegistry,
}

impl GenContext {
    /// Create a context for a target with an empty implementation registry
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            options: GenOptions::default(),
            registry: ImplRegistry::new(),
            color_system: ColorManagementSystem::new(),
            units: UnitConverterRegistry::with_standard_units(),
        }
    }

    /// Context for the GLSL target with the built-in node set registered
    pub fn for_glsl() -> Self {
        let mut context = Self::new(crate::glsl::TARGET_GLSL);
        crate::glsl::register_builtins(&mut context.registry);
        context
    }

    /// Target identity used for implementation dispatch
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Implementation registry
    pub fn registry(&self) -> &ImplRegistry {
        &self.registry
    }

    /// Implementation registry, mutable for registration at construction
    /// time
    pub fn registry_mut(&mut self) -> &mut ImplRegistry {
        &mut self.registry
    }

    /// Color management system
    pub fn color_system(&self) -> &ColorManagementSystem {
        &self.color_system
    }

    /// Unit converter registry
    pub fn units(&self) -> &UnitConverterRegistry {
        &self.units
    }
}
