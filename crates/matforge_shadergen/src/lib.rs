// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader generation for MatForge.
//!
//! Compiles a material document subtree into a [`graph::ShaderGraph`] and
//! emits it as coupled shader stage sources:
//!
//! - `graph` — post-order graph construction with type checking, constant
//!   folding and compound expansion
//! - `registry` — (category, target) implementation dispatch
//! - `glsl` — the built-in GLSL target node set
//! - `stage` — stages, variable blocks and idempotent variable emission
//! - `generator` — topological emission and stage assembly
//!
//! ## Example
//!
//! ```
//! use matforge_shadergen::{GenContext, ShaderGenerator, ShaderGraph};
//! # use matforge_document::{attr, category, Document};
//! # let mut doc = Document::new("doc");
//! # let def = doc.add_child(doc.root(), category::NODEDEF, "ND_constant").unwrap();
//! # doc.element_mut(def).unwrap().set_attribute(attr::NODE, "constant");
//! # let node = doc.add_child(doc.root(), "constant", "c1").unwrap();
//! # doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "color3");
//! # let value = doc.add_child(node, category::INPUT, "value").unwrap();
//! # doc.element_mut(value).unwrap().set_attribute(attr::TYPE, "color3");
//! # doc.element_mut(value).unwrap().set_value_string("1, 0, 0");
//! let context = GenContext::for_glsl();
//! let graph = ShaderGraph::build(&doc, node, &context)?;
//! let shader = ShaderGenerator::generate(&graph, &context)?;
//! assert!(shader.stage_source("pixel").is_some());
//! # Ok::<(), matforge_shadergen::ShaderGenError>(())
//! ```

pub mod color;
pub mod context;
pub mod generator;
pub mod glsl;
pub mod graph;
pub mod registry;
pub mod stage;

#[cfg(test)]
pub(crate) mod test_support;

pub use color::ColorManagementSystem;
pub use context::{GenContext, GenOptions};
pub use generator::{BindingEntry, BindingTable, GeneratedShader, ShaderGenerator};
pub use graph::{
    CompoundImpl, CompoundParam, GraphOutput, InputBinding, NodeImpl, NodeIndex, ShaderGenError,
    ShaderGraph, ShaderInput, ShaderNode, ShaderOutput,
};
pub use registry::{ImplRegistry, SourceImpl};
pub use stage::{block_name, stage_name, Shader, ShaderPort, ShaderStage, VariableBlock};
