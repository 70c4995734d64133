// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader stages and their variable blocks.
//!
//! A stage is an append-only source buffer plus named variable blocks.
//! Variable emission is idempotent: requesting a name that already exists in
//! a block hands back the existing port, and each port carries an `emitted`
//! flag so assignment statements are written at most once.

use indexmap::IndexMap;
use matforge_document::{Value, ValueType};

/// Well-known stage names
pub mod stage_name {
    /// Vertex stage
    pub const VERTEX: &str = "vertex";
    /// Pixel stage
    pub const PIXEL: &str = "pixel";
}

/// Well-known variable block names
pub mod block_name {
    /// Uniform parameters, populated by the host at draw time
    pub const UNIFORMS: &str = "Uniforms";
    /// Per-vertex mesh attributes
    pub const VERTEX_INPUTS: &str = "VertexInputs";
    /// Interpolated vertex-to-pixel data
    pub const VERTEX_DATA: &str = "VertexData";
    /// Pixel stage render targets
    pub const PIXEL_OUTPUTS: &str = "PixelOutputs";
}

/// Instance prefix interpolated vertex data is accessed under in both stages
pub const VERTEX_DATA_PREFIX: &str = "vertexData.";

/// A declared variable within a block
#[derive(Debug, Clone)]
pub struct ShaderPort {
    /// Variable name
    name: String,
    /// Variable type
    ty: ValueType,
    /// Default or semantic value, surfaced in the binding table
    value: Option<Value>,
    /// Whether the port's hand-off statement has been written
    emitted: bool,
}

impl ShaderPort {
    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable type
    pub fn ty(&self) -> ValueType {
        self.ty
    }

    /// Default or semantic value bound to this variable
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether the hand-off statement for this port has been written
    pub fn is_emitted(&self) -> bool {
        self.emitted
    }

    /// Mark the hand-off statement as written
    pub fn set_emitted(&mut self) {
        self.emitted = true;
    }
}

/// An ordered, idempotent collection of declared variables
#[derive(Debug, Clone, Default)]
pub struct VariableBlock {
    ports: IndexMap<String, ShaderPort>,
}

impl VariableBlock {
    /// Declare a variable, or hand back the existing declaration.
    ///
    /// Re-declaring an existing name is a no-op that preserves the original
    /// type and value.
    pub fn add(&mut self, name: impl Into<String>, ty: ValueType, value: Option<Value>) -> &mut ShaderPort {
        let name = name.into();
        self.ports.entry(name.clone()).or_insert(ShaderPort {
            name,
            ty,
            value,
            emitted: false,
        })
    }

    /// Look up a declared variable
    pub fn get(&self, name: &str) -> Option<&ShaderPort> {
        self.ports.get(name)
    }

    /// Look up a declared variable mutably
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ShaderPort> {
        self.ports.get_mut(name)
    }

    /// Declared variables in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ShaderPort> {
        self.ports.values()
    }

    /// Whether no variables are declared
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Number of declared variables
    pub fn len(&self) -> usize {
        self.ports.len()
    }
}

/// One stage of a generated shader program
#[derive(Debug)]
pub struct ShaderStage {
    name: String,
    /// Uniform parameters
    pub uniforms: VariableBlock,
    /// Stage interface consumed by this stage
    pub inputs: VariableBlock,
    /// Stage interface produced by this stage
    pub outputs: VariableBlock,
    /// Helper function definitions, emitted before `main`
    definitions: String,
    /// `main` body statements
    code: String,
    indent: usize,
}

impl ShaderStage {
    /// Create an empty stage
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uniforms: VariableBlock::default(),
            inputs: VariableBlock::default(),
            outputs: VariableBlock::default(),
            definitions: String::new(),
            code: String::new(),
            indent: 1,
        }
    }

    /// Stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one body statement at the current indentation
    pub fn emit_line(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.code.push_str("    ");
        }
        self.code.push_str(line.as_ref());
        self.code.push('\n');
    }

    /// Open a brace scope in the body
    pub fn begin_scope(&mut self, header: impl AsRef<str>) {
        self.emit_line(format!("{} {{", header.as_ref()));
        self.indent += 1;
    }

    /// Close the innermost body scope
    pub fn end_scope(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.emit_line("}");
    }

    /// Append a helper function definition
    pub fn emit_definition(&mut self, text: impl AsRef<str>) {
        self.definitions.push_str(text.as_ref());
        self.definitions.push('\n');
    }

    /// Accumulated `main` body statements
    pub fn body(&self) -> &str {
        &self.code
    }

    /// Accumulated helper definitions
    pub fn function_definitions(&self) -> &str {
        &self.definitions
    }

    /// Whether the body holds no statements
    pub fn is_body_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// The coupled stage set a shader program is generated into.
///
/// Stages are generated together so every vertex-stage interpolant consumed
/// by the pixel stage has exactly one producing declaration; the shared
/// [`block_name::VERTEX_DATA`] declarations are mirrored into both stages.
#[derive(Debug)]
pub struct Shader {
    stages: IndexMap<String, ShaderStage>,
}

impl Shader {
    /// Create a shader with the standard vertex and pixel stage pair
    pub fn new() -> Self {
        let mut stages = IndexMap::new();
        stages.insert(
            stage_name::VERTEX.to_string(),
            ShaderStage::new(stage_name::VERTEX),
        );
        stages.insert(
            stage_name::PIXEL.to_string(),
            ShaderStage::new(stage_name::PIXEL),
        );
        Self { stages }
    }

    /// Access a stage by name
    pub fn stage(&self, name: &str) -> Option<&ShaderStage> {
        self.stages.get(name)
    }

    /// Access a stage mutably by name
    pub fn stage_mut(&mut self, name: &str) -> Option<&mut ShaderStage> {
        self.stages.get_mut(name)
    }

    /// Stages in declaration order
    pub fn stages(&self) -> impl Iterator<Item = &ShaderStage> {
        self.stages.values()
    }

    /// Stages in declaration order, mutably
    pub fn stages_mut(&mut self) -> impl Iterator<Item = &mut ShaderStage> {
        self.stages.values_mut()
    }

    /// Declare a per-vertex mesh attribute in the vertex stage
    pub fn add_vertex_input(&mut self, name: &str, ty: ValueType) {
        if let Some(vs) = self.stage_mut(stage_name::VERTEX) {
            vs.inputs.add(name, ty, None);
        }
    }

    /// Declare an interpolant produced by the vertex stage and consumed by
    /// the pixel stage
    pub fn add_vertex_data(&mut self, name: &str, ty: ValueType) {
        if let Some(vs) = self.stage_mut(stage_name::VERTEX) {
            vs.outputs.add(name, ty, None);
        }
        if let Some(ps) = self.stage_mut(stage_name::PIXEL) {
            ps.inputs.add(name, ty, None);
        }
    }

    /// Declare a uniform in the given stage, recording its bound value
    pub fn add_uniform(&mut self, stage: &str, name: &str, ty: ValueType, value: Option<Value>) {
        if let Some(stage) = self.stage_mut(stage) {
            stage.uniforms.add(name, ty, value);
        }
    }
}

impl Default for Shader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_block_is_idempotent() {
        let mut block = VariableBlock::default();
        block.add("u_color", ValueType::Color3, Some(Value::Color3([1.0, 0.0, 0.0])));
        block.add("u_color", ValueType::Color4, None);
        assert_eq!(block.len(), 1);
        let port = block.get("u_color").unwrap();
        // The original declaration wins.
        assert_eq!(port.ty(), ValueType::Color3);
        assert!(port.value().is_some());
    }

    #[test]
    fn test_emitted_flag_guards_hand_off() {
        let mut block = VariableBlock::default();
        block.add("texcoord_0", ValueType::Vector2, None);
        let port = block.get_mut("texcoord_0").unwrap();
        assert!(!port.is_emitted());
        port.set_emitted();
        assert!(port.is_emitted());
    }

    #[test]
    fn test_vertex_data_mirrors_into_both_stages() {
        let mut shader = Shader::new();
        shader.add_vertex_data("texcoord_0", ValueType::Vector2);
        assert!(shader
            .stage(stage_name::VERTEX)
            .unwrap()
            .outputs
            .get("texcoord_0")
            .is_some());
        assert!(shader
            .stage(stage_name::PIXEL)
            .unwrap()
            .inputs
            .get("texcoord_0")
            .is_some());
    }

    #[test]
    fn test_scope_indentation() {
        let mut stage = ShaderStage::new(stage_name::PIXEL);
        stage.begin_scope("if (x > 0.0)");
        stage.emit_line("y = 1.0;");
        stage.end_scope();
        assert_eq!(stage.body(), "    if (x > 0.0) {\n        y = 1.0;\n    }\n");
    }
}
