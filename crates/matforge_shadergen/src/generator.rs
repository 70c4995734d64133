// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code emission: from a compiled shader graph to stage source text.
//!
//! For every node, in the graph's topological order, the generator invokes
//! the implementation's `create_variables` hook and then its
//! `emit_function_call` hook per stage. Reusable compounds contribute a
//! function definition once, then a call per node.

use crate::context::GenContext;
use crate::glsl::{glsl_type, input_expr};
use crate::graph::{NodeImpl, ShaderGenError, ShaderGraph, ShaderNode};
use crate::stage::{block_name, stage_name, Shader, ShaderStage, VERTEX_DATA_PREFIX};
use indexmap::IndexMap;
use matforge_document::{Value, ValueType};
use std::collections::HashSet;

/// One uniform the host populates at draw time
#[derive(Debug, Clone)]
pub struct BindingEntry {
    /// Variable type
    pub ty: ValueType,
    /// Semantic or default value, e.g. the texture path behind a sampler
    pub value: Option<Value>,
    /// Stage the uniform is declared in
    pub stage: String,
}

/// Uniform name to semantic value mapping for the host
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    uniforms: IndexMap<String, BindingEntry>,
}

impl BindingTable {
    /// Look up a uniform binding
    pub fn get(&self, name: &str) -> Option<&BindingEntry> {
        self.uniforms.get(name)
    }

    /// Bindings in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingEntry)> {
        self.uniforms.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }
}

/// Generated stage sources plus the uniform binding table
#[derive(Debug)]
pub struct GeneratedShader {
    /// Shader name, from the graph
    pub name: String,
    stages: IndexMap<String, String>,
    /// Uniforms the host populates at draw time
    pub bindings: BindingTable,
}

impl GeneratedShader {
    /// Source text of a stage
    pub fn stage_source(&self, stage: &str) -> Option<&str> {
        self.stages.get(stage).map(String::as_str)
    }

    /// Stage name/source pairs in declaration order
    pub fn stages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.stages.iter().map(|(n, s)| (n.as_str(), s.as_str()))
    }
}

/// Emits a compiled shader graph as coupled stage sources
pub struct ShaderGenerator;

impl ShaderGenerator {
    /// Generate stage sources and the binding table for a graph
    pub fn generate(
        graph: &ShaderGraph,
        context: &GenContext,
    ) -> Result<GeneratedShader, ShaderGenError> {
        let mut shader = Shader::new();

        for node in graph.nodes() {
            Self::create_variables(node, graph, &mut shader)?;
        }

        let needs_geometry = !graph.is_uniform();
        if needs_geometry {
            shader.add_vertex_input("i_position", ValueType::Vector3);
            shader.add_uniform(
                stage_name::VERTEX,
                "u_viewProjectionMatrix",
                ValueType::Matrix44,
                None,
            );
        }

        let mut defined = HashSet::new();
        if let Some(pixel) = shader.stage_mut(stage_name::PIXEL) {
            Self::emit_definitions(graph, pixel, &mut defined)?;
        }

        if let Some(vertex) = shader.stage_mut(stage_name::VERTEX) {
            if needs_geometry {
                vertex.emit_line("gl_Position = u_viewProjectionMatrix * vec4(i_position, 1.0);");
            }
            for node in graph.nodes() {
                Self::emit_call(node, graph, vertex)?;
            }
        }

        if let Some(pixel) = shader.stage_mut(stage_name::PIXEL) {
            for node in graph.nodes() {
                Self::emit_call(node, graph, pixel)?;
            }
            let single = graph.outputs().len() == 1;
            for (index, output) in graph.outputs().iter().enumerate() {
                let target = if single {
                    "fragColor".to_string()
                } else {
                    format!("fragColor_{index}")
                };
                pixel.outputs.add(&target, ValueType::Color4, None);
                let variable = &graph.node(output.node).output.variable;
                pixel.emit_line(format!(
                    "{target} = {};",
                    widen_to_vec4(variable, output.ty)
                ));
            }
        }

        let bindings = Self::collect_bindings(&shader);
        let mut stages = IndexMap::new();
        for stage in shader.stages() {
            stages.insert(stage.name().to_string(), Self::assemble(stage));
        }
        tracing::debug!(
            "generated {} stages for {:?} ({} nodes)",
            stages.len(),
            graph.name,
            graph.len()
        );
        Ok(GeneratedShader {
            name: graph.name.clone(),
            stages,
            bindings,
        })
    }

    fn create_variables(
        node: &ShaderNode,
        graph: &ShaderGraph,
        shader: &mut Shader,
    ) -> Result<(), ShaderGenError> {
        match &node.implementation {
            NodeImpl::Source(source) => source.create_variables(node, graph, shader),
            NodeImpl::Compound(compound) => {
                for inner in compound.graph.nodes() {
                    Self::create_variables(inner, &compound.graph, shader)?;
                }
                Ok(())
            }
        }
    }

    fn emit_definitions(
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
        defined: &mut HashSet<String>,
    ) -> Result<(), ShaderGenError> {
        for node in graph.nodes() {
            match &node.implementation {
                NodeImpl::Source(source) => {
                    source.emit_function_definition(node, graph, stage)?;
                }
                NodeImpl::Compound(compound) => {
                    // Nested compounds define their functions first.
                    Self::emit_definitions(&compound.graph, stage, defined)?;
                    if !defined.insert(compound.function_name.clone()) {
                        continue;
                    }
                    let output = compound.graph.outputs().first().ok_or_else(|| {
                        ShaderGenError::MissingInput {
                            node: node.name.clone(),
                            input: "output".to_string(),
                        }
                    })?;
                    let params = compound
                        .params
                        .iter()
                        .map(|param| format!("{} {}", glsl_type(param.ty), param.ident))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let mut body = ShaderStage::new(stage_name::PIXEL);
                    for inner in compound.graph.nodes() {
                        Self::emit_call(inner, &compound.graph, &mut body)?;
                    }
                    let result = &compound.graph.node(output.node).output.variable;
                    let mut definition = String::new();
                    definition.push_str(&format!(
                        "{} {}({params}) {{\n",
                        glsl_type(output.ty),
                        compound.function_name
                    ));
                    definition.push_str(body.body());
                    definition.push_str(&format!("    return {result};\n}}\n"));
                    stage.emit_definition(definition);
                }
            }
        }
        Ok(())
    }

    fn emit_call(
        node: &ShaderNode,
        graph: &ShaderGraph,
        stage: &mut ShaderStage,
    ) -> Result<(), ShaderGenError> {
        match &node.implementation {
            NodeImpl::Source(source) => source.emit_function_call(node, graph, stage),
            NodeImpl::Compound(compound) => {
                if stage.name() == stage_name::VERTEX {
                    // Geometry accesses inside the compound still need their
                    // vertex-stage hand-offs.
                    for inner in compound.graph.nodes() {
                        Self::emit_call(inner, &compound.graph, stage)?;
                    }
                    return Ok(());
                }
                let args = compound
                    .params
                    .iter()
                    .map(|param| input_expr(graph, node, &param.port))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", ");
                stage.emit_line(format!(
                    "{} {} = {}({args});",
                    glsl_type(node.output.ty),
                    node.output.variable,
                    compound.function_name
                ));
                Ok(())
            }
        }
    }

    fn collect_bindings(shader: &Shader) -> BindingTable {
        let mut bindings = BindingTable::default();
        for stage in shader.stages() {
            for port in stage.uniforms.iter() {
                bindings.uniforms.insert(
                    port.name().to_string(),
                    BindingEntry {
                        ty: port.ty(),
                        value: port.value().cloned(),
                        stage: stage.name().to_string(),
                    },
                );
            }
        }
        bindings
    }

    fn assemble(stage: &ShaderStage) -> String {
        let mut source = String::from("#version 400\n\n");
        for port in stage.uniforms.iter() {
            source.push_str(&format!(
                "uniform {} {};\n",
                glsl_type(port.ty()),
                port.name()
            ));
        }
        if !stage.uniforms.is_empty() {
            source.push('\n');
        }
        match stage.name() {
            stage_name::VERTEX => {
                for port in stage.inputs.iter() {
                    source.push_str(&format!("in {} {};\n", glsl_type(port.ty()), port.name()));
                }
                if !stage.inputs.is_empty() {
                    source.push('\n');
                }
                Self::push_vertex_data_block(&mut source, stage, "out");
            }
            _ => {
                Self::push_vertex_data_block(&mut source, stage, "in");
                for port in stage.outputs.iter() {
                    source.push_str(&format!("out {} {};\n", glsl_type(port.ty()), port.name()));
                }
                if !stage.outputs.is_empty() {
                    source.push('\n');
                }
            }
        }
        if !stage.function_definitions().is_empty() {
            source.push_str(stage.function_definitions());
            source.push('\n');
        }
        source.push_str("void main()\n{\n");
        source.push_str(stage.body());
        source.push_str("}\n");
        source
    }

    fn push_vertex_data_block(source: &mut String, stage: &ShaderStage, direction: &str) {
        let block = match direction {
            "out" => &stage.outputs,
            _ => &stage.inputs,
        };
        if block.is_empty() {
            return;
        }
        source.push_str(&format!("{direction} {}\n{{\n", block_name::VERTEX_DATA));
        for port in block.iter() {
            source.push_str(&format!("    {} {};\n", glsl_type(port.ty()), port.name()));
        }
        let instance = VERTEX_DATA_PREFIX.trim_end_matches('.');
        source.push_str(&format!("}} {instance};\n\n"));
    }
}

fn widen_to_vec4(variable: &str, ty: ValueType) -> String {
    match ty {
        ValueType::Color4 | ValueType::Vector4 => variable.to_string(),
        ValueType::Color3 | ValueType::Vector3 => format!("vec4({variable}, 1.0)"),
        ValueType::Vector2 => format!("vec4({variable}, 0.0, 1.0)"),
        ValueType::Float => format!("vec4(vec3({variable}), 1.0)"),
        _ => format!("vec4({variable})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{constant_multiply_doc, simple_library, textured_doc};
    use matforge_document::{attr, category};

    fn generate(doc: &matforge_document::Document, root: matforge_document::ElementId) -> GeneratedShader {
        let context = GenContext::for_glsl();
        let graph = ShaderGraph::build(doc, root, &context).unwrap();
        ShaderGenerator::generate(&graph, &context).unwrap()
    }

    #[test]
    fn test_constant_multiply_emits_pixel_only() {
        let (doc, output) = constant_multiply_doc();
        let shader = generate(&doc, output);

        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        assert!(pixel.contains("vec3 color1_out = vec3(1.0, 0.0, 0.0);"));
        assert!(pixel.contains("vec3 mult1_out = color1_out * 0.5;"));
        assert!(pixel.contains("fragColor = vec4(mult1_out, 1.0);"));

        // A spatially uniform graph contributes no vertex statements.
        let vertex = shader.stage_source(stage_name::VERTEX).unwrap();
        assert!(vertex.contains("void main()\n{\n}\n"));
    }

    #[test]
    fn test_producer_statements_precede_consumer() {
        let (doc, output) = constant_multiply_doc();
        let shader = generate(&doc, output);
        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        let producer = pixel.find("color1_out =").unwrap();
        let consumer = pixel.find("mult1_out =").unwrap();
        assert!(producer < consumer);
    }

    #[test]
    fn test_textured_graph_emits_both_stages() {
        let (doc, output) = textured_doc();
        let shader = generate(&doc, output);

        let vertex = shader.stage_source(stage_name::VERTEX).unwrap();
        assert!(vertex.contains("in vec2 i_texcoord_0;"));
        assert!(vertex.contains("vertexData.texcoord_0 = i_texcoord_0;"));
        assert!(vertex.contains("gl_Position"));

        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        assert!(pixel.contains("uniform sampler2D diffuse_file;"));
        assert!(pixel.contains("texture(diffuse_file, vertexData.texcoord_0)"));

        // The texture path lands in the binding table for the host.
        let entry = shader.bindings.get("diffuse_file").unwrap();
        assert_eq!(entry.value, Some(Value::Filename("diffuse.png".to_string())));
    }

    #[test]
    fn test_interpolant_hand_off_is_emitted_once() {
        // Two texture samples share one UV interpolant.
        let mut doc = simple_library();
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        for name in ["tex_a", "tex_b"] {
            let image = doc.add_child(graph, "image", name).unwrap();
            doc.element_mut(image).unwrap().set_attribute(attr::TYPE, "color3");
            let file = doc.add_child(image, category::INPUT, "file").unwrap();
            doc.element_mut(file).unwrap().set_attribute(attr::TYPE, "filename");
            doc.element_mut(file).unwrap().set_value_string(format!("{name}.png"));
        }
        let add = doc.add_child(graph, "add", "sum").unwrap();
        doc.element_mut(add).unwrap().set_attribute(attr::TYPE, "color3");
        for (port, src) in [("in1", "tex_a"), ("in2", "tex_b")] {
            let input = doc.add_child(add, category::INPUT, port).unwrap();
            doc.element_mut(input).unwrap().set_attribute(attr::TYPE, "color3");
            doc.element_mut(input).unwrap().set_node_name(src);
        }
        let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(output).unwrap().set_node_name("sum");

        let shader = generate(&doc, output);
        let vertex = shader.stage_source(stage_name::VERTEX).unwrap();
        let hand_offs = vertex.matches("vertexData.texcoord_0 = i_texcoord_0;").count();
        assert_eq!(hand_offs, 1);
        let declarations = vertex.matches("in vec2 i_texcoord_0;").count();
        assert_eq!(declarations, 1);
    }

    #[test]
    fn test_reusable_compound_emits_function() {
        let mut doc = simple_library();
        // doubleval: a compound nodedef implemented by a reusable graph.
        let def = doc.add_child(doc.root(), category::NODEDEF, "ND_doubleval").unwrap();
        doc.element_mut(def).unwrap().set_attribute(attr::NODE, "doubleval");
        doc.element_mut(def).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(def).unwrap().set_attribute(attr::IMPLEMENTATION, "NG_doubleval");
        let def_in = doc.add_child(def, category::INPUT, "in").unwrap();
        doc.element_mut(def_in).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(def_in).unwrap().set_value_string("0, 0, 0");

        let compound = doc.add_child(doc.root(), category::NODEGRAPH, "NG_doubleval").unwrap();
        doc.element_mut(compound).unwrap().set_attribute(attr::REUSABLE, "true");
        let mult = doc.add_child(compound, "multiply", "scale").unwrap();
        doc.element_mut(mult).unwrap().set_attribute(attr::TYPE, "color3");
        let in1 = doc.add_child(mult, category::INPUT, "in1").unwrap();
        doc.element_mut(in1).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(in1).unwrap().set_attribute(attr::INTERFACE_NAME, "in");
        let in2 = doc.add_child(mult, category::INPUT, "in2").unwrap();
        doc.element_mut(in2).unwrap().set_attribute(attr::TYPE, "float");
        doc.element_mut(in2).unwrap().set_value_string("2.0");
        let comp_out = doc.add_child(compound, category::OUTPUT, "out").unwrap();
        doc.element_mut(comp_out).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(comp_out).unwrap().set_node_name("scale");

        // Caller graph: constant -> doubleval -> output.
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let color = doc.add_child(graph, "constant", "c1").unwrap();
        doc.element_mut(color).unwrap().set_attribute(attr::TYPE, "color3");
        let value = doc.add_child(color, category::INPUT, "value").unwrap();
        doc.element_mut(value).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(value).unwrap().set_value_string("0.25, 0.5, 1");
        let node = doc.add_child(graph, "doubleval", "dbl").unwrap();
        doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "color3");
        let node_in = doc.add_child(node, category::INPUT, "in").unwrap();
        doc.element_mut(node_in).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(node_in).unwrap().set_node_name("c1");
        let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(output).unwrap().set_node_name("dbl");

        let shader = generate(&doc, output);
        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        // The "in" port is renamed away from the GLSL keyword.
        assert!(pixel.contains("vec3 NG_doubleval(vec3 in1)"));
        assert!(pixel.contains("vec3 scale_out = in1 * 2.0;"));
        assert!(pixel.contains("return scale_out;"));
        assert!(pixel.contains("vec3 dbl_out = NG_doubleval(c1_out);"));
        // Definition precedes main.
        assert!(pixel.find("vec3 NG_doubleval").unwrap() < pixel.find("void main()").unwrap());
    }

    #[test]
    fn test_flattened_compound_inlines_nodes() {
        let mut doc = simple_library();
        let def = doc.add_child(doc.root(), category::NODEDEF, "ND_halve").unwrap();
        doc.element_mut(def).unwrap().set_attribute(attr::NODE, "halve");
        doc.element_mut(def).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(def).unwrap().set_attribute(attr::IMPLEMENTATION, "NG_halve");
        let def_in = doc.add_child(def, category::INPUT, "in").unwrap();
        doc.element_mut(def_in).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(def_in).unwrap().set_value_string("0, 0, 0");

        // Not marked reusable, so the graph flattens at the call site.
        let compound = doc.add_child(doc.root(), category::NODEGRAPH, "NG_halve").unwrap();
        let mult = doc.add_child(compound, "multiply", "scale").unwrap();
        doc.element_mut(mult).unwrap().set_attribute(attr::TYPE, "color3");
        let in1 = doc.add_child(mult, category::INPUT, "in1").unwrap();
        doc.element_mut(in1).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(in1).unwrap().set_attribute(attr::INTERFACE_NAME, "in");
        let in2 = doc.add_child(mult, category::INPUT, "in2").unwrap();
        doc.element_mut(in2).unwrap().set_attribute(attr::TYPE, "float");
        doc.element_mut(in2).unwrap().set_value_string("0.5");
        let comp_out = doc.add_child(compound, category::OUTPUT, "out").unwrap();
        doc.element_mut(comp_out).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(comp_out).unwrap().set_node_name("scale");

        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let color = doc.add_child(graph, "constant", "c1").unwrap();
        doc.element_mut(color).unwrap().set_attribute(attr::TYPE, "color3");
        let value = doc.add_child(color, category::INPUT, "value").unwrap();
        doc.element_mut(value).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(value).unwrap().set_value_string("1, 1, 1");
        let node = doc.add_child(graph, "halve", "half1").unwrap();
        doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "color3");
        let node_in = doc.add_child(node, category::INPUT, "in").unwrap();
        doc.element_mut(node_in).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(node_in).unwrap().set_node_name("c1");
        let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "color3");
        doc.element_mut(output).unwrap().set_node_name("half1");

        let shader = generate(&doc, output);
        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        // No function, just the namespaced inline node.
        assert!(!pixel.contains("NG_halve("));
        assert!(pixel.contains("vec3 half1_scale_out = c1_out * 0.5;"));
        assert!(pixel.contains("fragColor = vec4(half1_scale_out, 1.0);"));
    }

    #[test]
    fn test_geompropvalue_missing_target_implementation() {
        let mut doc = simple_library();
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let node = doc.add_child(graph, "geompropvalue", "gp1").unwrap();
        doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "vector3");
        let geomprop = doc.add_child(node, category::INPUT, "geomprop").unwrap();
        doc.element_mut(geomprop).unwrap().set_attribute(attr::TYPE, "string");
        doc.element_mut(geomprop).unwrap().set_value_string("tangent");
        let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "vector3");
        doc.element_mut(output).unwrap().set_node_name("gp1");

        let context = GenContext::new("genmsl");
        match ShaderGraph::build(&doc, output, &context) {
            Err(ShaderGenError::NoImplementationForTarget { node, category, target }) => {
                assert_eq!(node, "gp1");
                assert_eq!(category, "geompropvalue");
                assert_eq!(target, "genmsl");
            }
            other => panic!("expected missing implementation, got {other:?}"),
        }
    }

    #[test]
    fn test_geompropvalue_binds_interpolant() {
        let mut doc = simple_library();
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let node = doc.add_child(graph, "geompropvalue", "gp1").unwrap();
        doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "vector3");
        let geomprop = doc.add_child(node, category::INPUT, "geomprop").unwrap();
        doc.element_mut(geomprop).unwrap().set_attribute(attr::TYPE, "string");
        doc.element_mut(geomprop).unwrap().set_value_string("tangent");
        let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "vector3");
        doc.element_mut(output).unwrap().set_node_name("gp1");

        let shader = generate(&doc, output);
        let vertex = shader.stage_source(stage_name::VERTEX).unwrap();
        assert!(vertex.contains("in vec3 i_geomprop_tangent;"));
        assert!(vertex.contains("vertexData.geomprop_tangent = i_geomprop_tangent;"));
        let pixel = shader.stage_source(stage_name::PIXEL).unwrap();
        assert!(pixel.contains("vec3 gp1_out = vertexData.geomprop_tangent;"));
    }
}
