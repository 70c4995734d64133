// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node implementations for the GLSL target.

use crate::graph::{InputBinding, ShaderGenError, ShaderGraph, ShaderNode};
use crate::registry::{ImplRegistry, SourceImpl};
use crate::stage::{stage_name, Shader, ShaderStage, VERTEX_DATA_PREFIX};
use matforge_document::{Value, ValueType};
use std::sync::Arc;

/// Target identity of the built-in GLSL generator
pub const TARGET_GLSL: &str = "genglsl";

/// GLSL spelling of a value type
pub fn glsl_type(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Float => "float",
        ValueType::Integer => "int",
        ValueType::Boolean => "bool",
        ValueType::Color3 | ValueType::Vector3 => "vec3",
        ValueType::Color4 | ValueType::Vector4 => "vec4",
        ValueType::Vector2 => "vec2",
        ValueType::Matrix33 => "mat3",
        ValueType::Matrix44 => "mat4",
        // Filename-typed ports surface as texture samplers.
        ValueType::Filename => "sampler2D",
        ValueType::String => "int",
    }
}

fn float_literal(v: f32) -> String {
    if v.fract() == 0.0 && v.abs() < 1.0e9 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

fn constructor(ty: &str, components: &[f32]) -> String {
    let args = components
        .iter()
        .map(|c| float_literal(*c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{ty}({args})")
}

/// GLSL literal expression for a value.
///
/// String-shaped values have no literal form; ports carrying them are
/// consumed as uniforms by their implementations, never as expressions.
pub fn glsl_literal(value: &Value) -> String {
    match value {
        Value::Float(v) => float_literal(*v),
        Value::Integer(v) => format!("{v}"),
        Value::Boolean(v) => format!("{v}"),
        Value::Color3(c) | Value::Vector3(c) => constructor("vec3", c),
        Value::Color4(c) | Value::Vector4(c) => constructor("vec4", c),
        Value::Vector2(c) => constructor("vec2", c),
        Value::Matrix33(c) => constructor("mat3", c),
        Value::Matrix44(c) => constructor("mat4", c),
        Value::String(_) | Value::Filename(_) => "0.0".to_string(),
    }
}

/// Expression reading a node input's resolved binding
pub fn input_expr(
    graph: &ShaderGraph,
    node: &ShaderNode,
    input: &str,
) -> Result<String, ShaderGenError> {
    let port = node
        .input(input)
        .ok_or_else(|| ShaderGenError::MissingInput {
            node: node.name.clone(),
            input: input.to_string(),
        })?;
    Ok(match &port.binding {
        InputBinding::Value(value) => glsl_literal(value),
        InputBinding::Connection(index) => graph.node(*index).output.variable.clone(),
        InputBinding::Interface(name) => name.clone(),
    })
}

fn emit_result(stage: &mut ShaderStage, node: &ShaderNode, expr: &str) {
    stage.emit_line(format!(
        "{} {} = {expr};",
        glsl_type(node.output.ty),
        node.output.variable
    ));
}

fn base_name(node: &ShaderNode) -> &str {
    node.output
        .variable
        .strip_suffix("_out")
        .unwrap_or(&node.output.variable)
}

/// Write the vertex-stage hand-off for an interpolant, at most once
fn emit_hand_off(stage: &mut ShaderStage, name: &str, source: &str) {
    let pending = stage
        .outputs
        .get(name)
        .is_some_and(|port| !port.is_emitted());
    if pending {
        stage.emit_line(format!("{VERTEX_DATA_PREFIX}{name} = {source};"));
        if let Some(port) = stage.outputs.get_mut(name) {
            port.set_emitted();
        }
    }
}

struct ConstantGlsl;

impl SourceImpl for ConstantGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let value = input_expr(graph, node, "value")?;
            emit_result(stage, node, &value);
        }
        Ok(())
    }
}

struct TexcoordGlsl;

const TEXCOORD_ATTRIBUTE: &str = "i_texcoord_0";
const TEXCOORD_DATA: &str = "texcoord_0";

impl SourceImpl for TexcoordGlsl {
    fn requires_geometry(&self) -> bool {
        true
    }

    fn create_variables(
        &self,
        _node: &ShaderNode,
        _graph: &ShaderGraph,
        shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        shader.add_vertex_input(TEXCOORD_ATTRIBUTE, ValueType::Vector2);
        shader.add_vertex_data(TEXCOORD_DATA, ValueType::Vector2);
        Ok(())
    }

    fn emit_function_call(
        &self,
        node: &ShaderNode,
        _graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        match stage.name() {
            stage_name::VERTEX => emit_hand_off(stage, TEXCOORD_DATA, TEXCOORD_ATTRIBUTE),
            stage_name::PIXEL => {
                emit_result(stage, node, &format!("{VERTEX_DATA_PREFIX}{TEXCOORD_DATA}"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Bind a named geometric property through a vertex input and interpolant
struct GeomPropValueGlsl;

impl GeomPropValueGlsl {
    fn geom_prop(node: &ShaderNode) -> Result<String, ShaderGenError> {
        let missing = || ShaderGenError::MissingInput {
            node: node.name.clone(),
            input: "geomprop".to_string(),
        };
        let port = node.input("geomprop").ok_or_else(missing)?;
        match &port.binding {
            InputBinding::Value(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
            _ => Err(missing()),
        }
    }
}

impl SourceImpl for GeomPropValueGlsl {
    fn requires_geometry(&self) -> bool {
        true
    }

    fn create_variables(
        &self,
        node: &ShaderNode,
        _graph: &ShaderGraph,
        shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        let geom_prop = Self::geom_prop(node)?;
        shader.add_vertex_input(&format!("i_geomprop_{geom_prop}"), node.output.ty);
        shader.add_vertex_data(&format!("geomprop_{geom_prop}"), node.output.ty);
        Ok(())
    }

    fn emit_function_call(
        &self,
        node: &ShaderNode,
        _graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        let geom_prop = Self::geom_prop(node)?;
        let variable = format!("geomprop_{geom_prop}");
        match stage.name() {
            stage_name::VERTEX => {
                emit_hand_off(stage, &variable, &format!("i_geomprop_{geom_prop}"));
            }
            stage_name::PIXEL => {
                emit_result(stage, node, &format!("{VERTEX_DATA_PREFIX}{variable}"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Pass a vertex attribute through to the pixel stage
struct AttributeGlsl {
    attribute: &'static str,
    data: &'static str,
    ty: ValueType,
    normalized: bool,
}

impl SourceImpl for AttributeGlsl {
    fn requires_geometry(&self) -> bool {
        true
    }

    fn create_variables(
        &self,
        _node: &ShaderNode,
        _graph: &ShaderGraph,
        shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        shader.add_vertex_input(self.attribute, self.ty);
        shader.add_vertex_data(self.data, self.ty);
        Ok(())
    }

    fn emit_function_call(
        &self,
        node: &ShaderNode,
        _graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        match stage.name() {
            stage_name::VERTEX => emit_hand_off(stage, self.data, self.attribute),
            stage_name::PIXEL => {
                let access = format!("{VERTEX_DATA_PREFIX}{}", self.data);
                let expr = if self.normalized {
                    format!("normalize({access})")
                } else {
                    access
                };
                emit_result(stage, node, &expr);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Sample a texture file bound as a uniform sampler
struct ImageGlsl;

impl SourceImpl for ImageGlsl {
    fn requires_geometry(&self) -> bool {
        true
    }

    fn create_variables(
        &self,
        node: &ShaderNode,
        _graph: &ShaderGraph,
        shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        let file_value = node
            .input("file")
            .and_then(|port| match &port.binding {
                InputBinding::Value(value) => Some(value.clone()),
                _ => None,
            });
        shader.add_uniform(
            stage_name::PIXEL,
            &format!("{}_file", base_name(node)),
            ValueType::Filename,
            file_value,
        );
        // The sampling coordinate defaults to the first UV set.
        shader.add_vertex_input(TEXCOORD_ATTRIBUTE, ValueType::Vector2);
        shader.add_vertex_data(TEXCOORD_DATA, ValueType::Vector2);
        Ok(())
    }

    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        match stage.name() {
            stage_name::VERTEX => emit_hand_off(stage, TEXCOORD_DATA, TEXCOORD_ATTRIBUTE),
            stage_name::PIXEL => {
                let uv = match node.input("texcoord").map(|port| &port.binding) {
                    Some(InputBinding::Connection(index)) => {
                        graph.node(*index).output.variable.clone()
                    }
                    Some(InputBinding::Interface(name)) => name.clone(),
                    _ => format!("{VERTEX_DATA_PREFIX}{TEXCOORD_DATA}"),
                };
                let base = base_name(node);
                stage.emit_line(format!("vec4 {base}_sample = texture({base}_file, {uv});"));
                let swizzle = match node.output.ty {
                    ValueType::Float => format!("{base}_sample.r"),
                    ValueType::Color3 | ValueType::Vector3 => format!("{base}_sample.rgb"),
                    _ => format!("{base}_sample"),
                };
                emit_result(stage, node, &swizzle);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Infix arithmetic over two inputs
struct BinaryOpGlsl {
    op: &'static str,
}

impl SourceImpl for BinaryOpGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let in1 = input_expr(graph, node, "in1")?;
            let in2 = input_expr(graph, node, "in2")?;
            emit_result(stage, node, &format!("{in1} {} {in2}", self.op));
        }
        Ok(())
    }
}

/// A single-expression GLSL function call
struct FunctionCallGlsl {
    function: &'static str,
    inputs: &'static [&'static str],
}

impl SourceImpl for FunctionCallGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let args = self
                .inputs
                .iter()
                .map(|input| input_expr(graph, node, input))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            emit_result(stage, node, &format!("{}({args})", self.function));
        }
        Ok(())
    }
}

struct MixGlsl;

impl SourceImpl for MixGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let fg = input_expr(graph, node, "fg")?;
            let bg = input_expr(graph, node, "bg")?;
            let mix = input_expr(graph, node, "mix")?;
            emit_result(stage, node, &format!("mix({bg}, {fg}, {mix})"));
        }
        Ok(())
    }
}

struct PowerGlsl;

impl SourceImpl for PowerGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let in1 = input_expr(graph, node, "in1")?;
            let mut in2 = input_expr(graph, node, "in2")?;
            // pow requires matching operand shapes.
            let exponent_is_scalar = node
                .input("in2")
                .is_some_and(|port| port.ty == ValueType::Float);
            if exponent_is_scalar && node.output.ty != ValueType::Float {
                in2 = format!("{}({in2})", glsl_type(node.output.ty));
            }
            emit_result(stage, node, &format!("pow({in1}, {in2})"));
        }
        Ok(())
    }
}

struct ConvertGlsl;

impl SourceImpl for ConvertGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() != stage_name::PIXEL {
            return Ok(());
        }
        let port = node
            .input("in")
            .ok_or_else(|| ShaderGenError::MissingInput {
                node: node.name.clone(),
                input: "in".to_string(),
            })?;
        let from = port.ty;
        let to = node.output.ty;
        let expr = input_expr(graph, node, "in")?;
        let converted = match (from, to) {
            _ if from == to => expr,
            (ValueType::Color3, ValueType::Vector3)
            | (ValueType::Vector3, ValueType::Color3)
            | (ValueType::Color4, ValueType::Vector4)
            | (ValueType::Vector4, ValueType::Color4) => expr,
            (ValueType::Float, ValueType::Vector2)
            | (ValueType::Float, ValueType::Vector3)
            | (ValueType::Float, ValueType::Color3)
            | (ValueType::Float, ValueType::Vector4)
            | (ValueType::Float, ValueType::Color4) => {
                format!("{}({expr})", glsl_type(to))
            }
            (ValueType::Color3, ValueType::Color4)
            | (ValueType::Vector3, ValueType::Vector4) => format!("vec4({expr}, 1.0)"),
            (ValueType::Color4, ValueType::Color3)
            | (ValueType::Vector4, ValueType::Vector3) => format!("({expr}).rgb"),
            (ValueType::Vector2, ValueType::Vector3) => format!("vec3({expr}, 0.0)"),
            _ => {
                return Err(ShaderGenError::TypeMismatch {
                    node: node.name.clone(),
                    input: "in".to_string(),
                    expected: to,
                    actual: from,
                })
            }
        };
        emit_result(stage, node, &converted);
        Ok(())
    }
}

struct CombineGlsl {
    inputs: &'static [&'static str],
}

impl SourceImpl for CombineGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let args = self
                .inputs
                .iter()
                .map(|input| input_expr(graph, node, input))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            emit_result(
                stage,
                node,
                &format!("{}({args})", glsl_type(node.output.ty)),
            );
        }
        Ok(())
    }
}

/// Simplified physically-based surface composition
struct StandardSurfaceGlsl;

impl SourceImpl for StandardSurfaceGlsl {
    fn emit_function_call(
        &self,
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        if stage.name() == stage_name::PIXEL {
            let base_color = input_expr(graph, node, "base_color")?;
            let metallic = input_expr(graph, node, "metalness")?;
            let emission = input_expr(graph, node, "emission")?;
            let emission_color = input_expr(graph, node, "emission_color")?;
            let base = base_name(node);
            stage.emit_line(format!(
                "vec3 {base}_albedo = {base_color} * (1.0 - 0.5 * {metallic});"
            ));
            emit_result(
                stage,
                node,
                &format!("{base}_albedo + {emission_color} * {emission}"),
            );
        }
        Ok(())
    }
}

/// Register the built-in GLSL node set
pub fn register_builtins(registry: &mut ImplRegistry) {
    registry.register("constant", TARGET_GLSL, Arc::new(ConstantGlsl));
    registry.register("texcoord", TARGET_GLSL, Arc::new(TexcoordGlsl));
    registry.register("geompropvalue", TARGET_GLSL, Arc::new(GeomPropValueGlsl));
    registry.register(
        "normal",
        TARGET_GLSL,
        Arc::new(AttributeGlsl {
            attribute: "i_normal",
            data: "normal_world",
            ty: ValueType::Vector3,
            normalized: true,
        }),
    );
    registry.register(
        "position",
        TARGET_GLSL,
        Arc::new(AttributeGlsl {
            attribute: "i_position",
            data: "position_world",
            ty: ValueType::Vector3,
            normalized: false,
        }),
    );
    registry.register("image", TARGET_GLSL, Arc::new(ImageGlsl));
    registry.register("add", TARGET_GLSL, Arc::new(BinaryOpGlsl { op: "+" }));
    registry.register("subtract", TARGET_GLSL, Arc::new(BinaryOpGlsl { op: "-" }));
    registry.register("multiply", TARGET_GLSL, Arc::new(BinaryOpGlsl { op: "*" }));
    registry.register("divide", TARGET_GLSL, Arc::new(BinaryOpGlsl { op: "/" }));
    registry.register("mix", TARGET_GLSL, Arc::new(MixGlsl));
    registry.register("power", TARGET_GLSL, Arc::new(PowerGlsl));
    registry.register(
        "dotproduct",
        TARGET_GLSL,
        Arc::new(FunctionCallGlsl {
            function: "dot",
            inputs: &["in1", "in2"],
        }),
    );
    registry.register(
        "normalize",
        TARGET_GLSL,
        Arc::new(FunctionCallGlsl {
            function: "normalize",
            inputs: &["in"],
        }),
    );
    registry.register(
        "clamp",
        TARGET_GLSL,
        Arc::new(FunctionCallGlsl {
            function: "clamp",
            inputs: &["in", "low", "high"],
        }),
    );
    registry.register("convert", TARGET_GLSL, Arc::new(ConvertGlsl));
    registry.register(
        "combine2",
        TARGET_GLSL,
        Arc::new(CombineGlsl {
            inputs: &["in1", "in2"],
        }),
    );
    registry.register(
        "combine3",
        TARGET_GLSL,
        Arc::new(CombineGlsl {
            inputs: &["in1", "in2", "in3"],
        }),
    );
    registry.register(
        "combine4",
        TARGET_GLSL,
        Arc::new(CombineGlsl {
            inputs: &["in1", "in2", "in3", "in4"],
        }),
    );
    registry.register(
        "standard_surface",
        TARGET_GLSL,
        Arc::new(StandardSurfaceGlsl),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_literals_keep_a_decimal_point() {
        assert_eq!(glsl_literal(&Value::Float(1.0)), "1.0");
        assert_eq!(glsl_literal(&Value::Float(0.25)), "0.25");
    }

    #[test]
    fn test_color_literal_shape() {
        assert_eq!(
            glsl_literal(&Value::Color3([1.0, 0.0, 0.5])),
            "vec3(1.0, 0.0, 0.5)"
        );
    }

    #[test]
    fn test_builtin_registration_covers_math() {
        let mut registry = ImplRegistry::new();
        register_builtins(&mut registry);
        for cat in ["add", "subtract", "multiply", "divide", "mix", "image"] {
            assert!(registry.source_impl(cat, TARGET_GLSL).is_some(), "{cat}");
        }
        assert!(registry.source_impl("geompropvalue", "genmsl").is_none());
    }
}
