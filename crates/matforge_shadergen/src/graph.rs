// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader graph construction from a document subtree.
//!
//! Building walks the document's dependency graph post-order, so producers
//! are appended before their consumers and the node list doubles as the
//! topological emission order. Ties between independent nodes follow
//! document declaration order, keeping generated code diff-stable.

use crate::context::GenContext;
use crate::registry::SourceImpl;
use indexmap::IndexMap;
use matforge_document::{
    attr, category, Document, DocumentError, ElementId, Implementation, TraversalError, Value,
    ValueType,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a node within its owning [`ShaderGraph`]
pub type NodeIndex = usize;

/// What an input reads from
#[derive(Debug, Clone)]
pub enum InputBinding {
    /// Constant-folded literal or default value
    Value(Value),
    /// Output of an upstream node in the same graph
    Connection(NodeIndex),
    /// Parameter of the enclosing compound subroutine
    Interface(String),
}

/// A resolved input port of a shader node
#[derive(Debug, Clone)]
pub struct ShaderInput {
    /// Port name
    pub name: String,
    /// Declared type
    pub ty: ValueType,
    /// Resolved binding
    pub binding: InputBinding,
}

/// The output port of a shader node
#[derive(Debug, Clone)]
pub struct ShaderOutput {
    /// Output type
    pub ty: ValueType,
    /// Variable name the node's result is bound to
    pub variable: String,
}

/// How a node is implemented for the active target
pub enum NodeImpl {
    /// Target-specific source emitter from the registry
    Source(Arc<dyn SourceImpl>),
    /// Nested graph emitted as a callable subroutine
    Compound(CompoundImpl),
}

impl std::fmt::Debug for NodeImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(_) => f.write_str("Source"),
            Self::Compound(compound) => f
                .debug_struct("Compound")
                .field("function_name", &compound.function_name)
                .finish(),
        }
    }
}

/// One parameter of a compound subroutine
#[derive(Debug, Clone)]
pub struct CompoundParam {
    /// Port name on the calling node
    pub port: String,
    /// Identifier emitted in the function signature
    pub ident: String,
    /// Parameter type
    pub ty: ValueType,
}

/// A reusable compound: a nested shader graph behind a function interface
#[derive(Debug)]
pub struct CompoundImpl {
    /// The compiled inner graph
    pub graph: Box<ShaderGraph>,
    /// Emitted function name
    pub function_name: String,
    /// Function parameters in interface order
    pub params: Vec<CompoundParam>,
}

/// One operation in a compiled shader graph
#[derive(Debug)]
pub struct ShaderNode {
    /// Unique node name within the graph
    pub name: String,
    /// Source node category
    pub category: String,
    /// Resolved implementation
    pub implementation: NodeImpl,
    /// Resolved input ports
    pub inputs: Vec<ShaderInput>,
    /// Output port
    pub output: ShaderOutput,
    requires_geometry: bool,
}

impl ShaderNode {
    /// Look up an input port by name
    pub fn input(&self, name: &str) -> Option<&ShaderInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Whether this node samples per-pixel geometry or texture data
    pub fn requires_geometry(&self) -> bool {
        self.requires_geometry
    }
}

/// A graph-level output: the node whose result feeds the graph interface
#[derive(Debug, Clone)]
pub struct GraphOutput {
    /// Output name
    pub name: String,
    /// Output type
    pub ty: ValueType,
    /// Producing node
    pub node: NodeIndex,
}

/// A compiled, topologically-ordered shader graph
#[derive(Debug)]
pub struct ShaderGraph {
    /// Graph name, from the root element
    pub name: String,
    nodes: Vec<ShaderNode>,
    outputs: Vec<GraphOutput>,
}

impl ShaderGraph {
    /// Compile the subtree rooted at an output, material or node element.
    ///
    /// The source document is not mutated; on error no partial graph is
    /// observable.
    pub fn build(
        doc: &Document,
        root: ElementId,
        context: &GenContext,
    ) -> Result<Self, ShaderGenError> {
        check_acyclic(doc, root)?;
        let root_elem = doc
            .element(root)
            .ok_or(DocumentError::StaleElement(root))?;
        let name = root_elem.name().to_string();
        let mut builder = GraphBuilder::new(doc, context);
        let scope = Scope::root();
        let mut outputs = Vec::new();
        match root_elem.category() {
            category::OUTPUT => {
                outputs.push(builder.build_output(root, &scope)?);
            }
            category::MATERIAL => {
                for shader in doc.shader_nodes(root) {
                    let index = builder.build_node(shader, &scope)?;
                    let node = &builder.nodes[index];
                    outputs.push(GraphOutput {
                        name: node.name.clone(),
                        ty: node.output.ty,
                        node: index,
                    });
                }
            }
            category::NODEGRAPH => {
                let graph_outputs: Vec<ElementId> = doc.outputs_of(root).collect();
                for output in graph_outputs {
                    outputs.push(builder.build_output(output, &scope)?);
                }
            }
            _ => {
                let index = builder.build_node(root, &scope)?;
                let node = &builder.nodes[index];
                outputs.push(GraphOutput {
                    name: node.name.clone(),
                    ty: node.output.ty,
                    node: index,
                });
            }
        }
        Ok(Self {
            name,
            nodes: builder.nodes,
            outputs,
        })
    }

    /// Nodes in topological order
    pub fn nodes(&self) -> impl Iterator<Item = &ShaderNode> {
        self.nodes.iter()
    }

    /// Node by index
    pub fn node(&self, index: NodeIndex) -> &ShaderNode {
        &self.nodes[index]
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Graph-level outputs
    pub fn outputs(&self) -> &[GraphOutput] {
        &self.outputs
    }

    /// Whether the graph is spatially uniform: no reachable node samples
    /// geometry or texture data, so every pixel evaluates to the same value
    pub fn is_uniform(&self) -> bool {
        !self.nodes.iter().any(ShaderNode::requires_geometry)
    }
}

/// Reject document-level connection cycles before descending
fn check_acyclic(doc: &Document, root: ElementId) -> Result<(), ShaderGenError> {
    for edge in doc.traverse_graph(root) {
        edge?;
    }
    Ok(())
}

/// Per-recursion naming and interface bindings
struct Scope {
    prefix: String,
    interface: IndexMap<String, InputBinding>,
}

impl Scope {
    fn root() -> Self {
        Self {
            prefix: String::new(),
            interface: IndexMap::new(),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Identifiers shading languages reserve; port names colliding with these
/// get a numeric suffix when emitted as function parameters
const RESERVED_WORDS: &[&str] = &[
    "in", "out", "inout", "default", "sample", "texture", "filter", "uniform",
];

fn param_ident(name: &str, taken: &mut std::collections::HashSet<String>) -> String {
    let base = sanitize(name);
    let mut ident = base.clone();
    let mut suffix = 1;
    while RESERVED_WORDS.contains(&ident.as_str()) || taken.contains(&ident) {
        ident = format!("{base}{suffix}");
        suffix += 1;
    }
    taken.insert(ident.clone());
    ident
}

struct GraphBuilder<'a> {
    doc: &'a Document,
    context: &'a GenContext,
    nodes: Vec<ShaderNode>,
    /// Built nodes keyed by (element, scope prefix); flattened compounds
    /// instantiate the same elements once per call site
    memo: HashMap<(ElementId, String), NodeIndex>,
    /// Nodedefs on the active expansion path, for compound recursion guard
    active_defs: Vec<ElementId>,
}

impl<'a> GraphBuilder<'a> {
    fn new(doc: &'a Document, context: &'a GenContext) -> Self {
        Self {
            doc,
            context,
            nodes: Vec::new(),
            memo: HashMap::new(),
            active_defs: Vec::new(),
        }
    }

    fn element_name(&self, id: ElementId) -> String {
        self.doc
            .element(id)
            .map(|e| e.name().to_string())
            .unwrap_or_default()
    }

    /// Build the producer of an output element and record the graph output
    fn build_output(&mut self, output: ElementId, scope: &Scope) -> Result<GraphOutput, ShaderGenError> {
        let name = self.element_name(output);
        let upstream = self
            .doc
            .upstream_of(output)?
            .ok_or_else(|| ShaderGenError::MissingInput {
                node: name.clone(),
                input: attr::NODE_NAME.to_string(),
            })?;
        let index = self.build_node(upstream, scope)?;
        let node = &self.nodes[index];
        Ok(GraphOutput {
            name,
            ty: node.output.ty,
            node: index,
        })
    }

    fn build_node(&mut self, node_id: ElementId, scope: &Scope) -> Result<NodeIndex, ShaderGenError> {
        if let Some(&index) = self.memo.get(&(node_id, scope.prefix.clone())) {
            return Ok(index);
        }
        let elem = self
            .doc
            .element(node_id)
            .ok_or(DocumentError::StaleElement(node_id))?;
        let node_name = elem.name().to_string();
        let node_category = elem.category().to_string();

        let node_def = self
            .doc
            .node_def_for(node_id)
            .ok_or_else(|| ShaderGenError::UnresolvedNodeDefinition {
                node: node_name.clone(),
            })?;
        let out_ty = self.output_type(node_id, node_def)?;
        let inputs = self.build_inputs(node_id, node_def, scope)?;

        let (implementation, requires_geometry) = match self.doc.implementation_of(node_def) {
            Some(Implementation::Graph(graph_elem)) => {
                if self.active_defs.contains(&node_def) {
                    return Err(ShaderGenError::CyclicGraph {
                        node: node_name.clone(),
                    });
                }
                let reusable = self
                    .doc
                    .element(graph_elem)
                    .and_then(|g| g.attribute(attr::REUSABLE))
                    == Some("true");
                if reusable {
                    self.active_defs.push(node_def);
                    let compound = self.build_compound(graph_elem, node_def);
                    self.active_defs.pop();
                    let compound = compound?;
                    let geometry = !compound.graph.is_uniform();
                    (NodeImpl::Compound(compound), geometry)
                } else {
                    // Inline expansion: the compound node dissolves into the
                    // caller's graph and its interface inputs bind directly
                    // to the call-site bindings.
                    self.active_defs.push(node_def);
                    let index = self.flatten_compound(graph_elem, &node_name, &inputs);
                    self.active_defs.pop();
                    let index = index?;
                    self.memo.insert((node_id, scope.prefix.clone()), index);
                    return Ok(index);
                }
            }
            _ => {
                let source = self
                    .context
                    .registry()
                    .source_impl(&node_category, self.context.target())
                    .ok_or_else(|| ShaderGenError::NoImplementationForTarget {
                        node: node_name.clone(),
                        category: node_category.clone(),
                        target: self.context.target().to_string(),
                    })?;
                let geometry = source.requires_geometry();
                (NodeImpl::Source(source), geometry)
            }
        };

        let qualified = format!("{}{}", scope.prefix, node_name);
        let variable = format!("{}_out", sanitize(&qualified));
        let index = self.nodes.len();
        self.nodes.push(ShaderNode {
            name: qualified,
            category: node_category,
            implementation,
            inputs,
            output: ShaderOutput {
                ty: out_ty,
                variable,
            },
            requires_geometry,
        });
        self.memo.insert((node_id, scope.prefix.clone()), index);
        Ok(index)
    }

    /// Resolve a node's output type: node, then nodedef, then the nodedef's
    /// declared output port
    fn output_type(&self, node_id: ElementId, node_def: ElementId) -> Result<ValueType, ShaderGenError> {
        let ty_string = self
            .doc
            .element(node_id)
            .and_then(|e| e.type_string().map(str::to_string))
            .or_else(|| {
                self.doc
                    .element(node_def)
                    .and_then(|d| d.type_string().map(str::to_string))
            })
            .or_else(|| {
                self.doc.outputs_of(node_def).next().and_then(|out| {
                    self.doc
                        .element(out)
                        .and_then(|e| e.type_string().map(str::to_string))
                })
            })
            .ok_or_else(|| ShaderGenError::MissingType {
                element: self.element_name(node_id),
            })?;
        Ok(ValueType::from_type_string(&ty_string).map_err(DocumentError::from)?)
    }

    fn input_type(
        &self,
        input_id: ElementId,
        node_def: ElementId,
        input_name: &str,
    ) -> Result<ValueType, ShaderGenError> {
        let ty_string = self
            .doc
            .element(input_id)
            .and_then(|e| e.type_string().map(str::to_string))
            .or_else(|| {
                let def_input = self.doc.child_by_name(node_def, input_name)?;
                self.doc
                    .element(def_input)
                    .and_then(|e| e.type_string().map(str::to_string))
            })
            .ok_or_else(|| ShaderGenError::MissingType {
                element: format!("{}.{input_name}", self.element_name(node_def)),
            })?;
        Ok(ValueType::from_type_string(&ty_string).map_err(DocumentError::from)?)
    }

    /// Resolve every input of a node: explicit ports first in document
    /// order, then nodedef-declared ports the instance omits, bound to
    /// their defaults
    fn build_inputs(
        &mut self,
        node_id: ElementId,
        node_def: ElementId,
        scope: &Scope,
    ) -> Result<Vec<ShaderInput>, ShaderGenError> {
        let node_name = self.element_name(node_id);
        let mut inputs = Vec::new();
        let explicit: Vec<ElementId> = self.doc.inputs_of(node_id).collect();
        for input_id in explicit {
            let input_elem = self
                .doc
                .element(input_id)
                .ok_or(DocumentError::StaleElement(input_id))?;
            let input_name = input_elem.name().to_string();
            let interface_name = input_elem
                .attribute(attr::INTERFACE_NAME)
                .map(str::to_string);
            let connected = input_elem.is_connected();
            let ty = self.input_type(input_id, node_def, &input_name)?;

            let binding = if let Some(interface) = interface_name {
                scope
                    .interface
                    .get(&interface)
                    .cloned()
                    .ok_or_else(|| ShaderGenError::MissingInput {
                        node: node_name.clone(),
                        input: interface,
                    })?
            } else if connected {
                let producer = self.resolve_producer(input_id)?;
                let index = self.build_node(producer, scope)?;
                let actual = self.nodes[index].output.ty;
                if actual != ty {
                    return Err(ShaderGenError::TypeMismatch {
                        node: node_name.clone(),
                        input: input_name.clone(),
                        expected: ty,
                        actual,
                    });
                }
                InputBinding::Connection(index)
            } else if let Some(value) = self.doc.typed_value(input_id)? {
                InputBinding::Value(self.adjust_value(input_id, value)?)
            } else {
                InputBinding::Value(self.default_value(node_def, &input_name, ty)?)
            };
            inputs.push(ShaderInput {
                name: input_name,
                ty,
                binding,
            });
        }

        // Ports declared by the nodedef but omitted on the instance fall
        // back to their declared defaults.
        let declared: Vec<ElementId> = self.doc.inputs_of(node_def).collect();
        for def_input in declared {
            let Some(def_elem) = self.doc.element(def_input) else {
                continue;
            };
            let input_name = def_elem.name().to_string();
            if inputs.iter().any(|i| i.name == input_name) {
                continue;
            }
            let ty = self.input_type(def_input, node_def, &input_name)?;
            let value = self.default_value(node_def, &input_name, ty)?;
            inputs.push(ShaderInput {
                name: input_name,
                ty,
                binding: InputBinding::Value(value),
            });
        }
        Ok(inputs)
    }

    /// The node that produces a connected input's value. A nodegraph
    /// reference resolves through the graph's output element to the node
    /// feeding it.
    fn resolve_producer(&self, input_id: ElementId) -> Result<ElementId, ShaderGenError> {
        let upstream = self
            .doc
            .upstream_of(input_id)?
            .ok_or(DocumentError::StaleElement(input_id))?;
        let upstream_elem = self
            .doc
            .element(upstream)
            .ok_or(DocumentError::StaleElement(upstream))?;
        if upstream_elem.category() == category::OUTPUT {
            return self
                .doc
                .upstream_of(upstream)?
                .ok_or_else(|| ShaderGenError::MissingInput {
                    node: upstream_elem.name().to_string(),
                    input: attr::NODE_NAME.to_string(),
                });
        }
        Ok(upstream)
    }

    /// Apply unit and color space conversion to a literal input value
    fn adjust_value(&self, input_id: ElementId, value: Value) -> Result<Value, ShaderGenError> {
        let Some(elem) = self.doc.element(input_id) else {
            return Ok(value);
        };
        let mut value = value;
        if let Some(unit) = elem.attribute(attr::UNIT) {
            if let Some(converter) = self.context.units().converter_for_unit(unit) {
                let target = &self.context.options.target_distance_unit;
                if converter.unit_scales().contains_key(target.as_str()) {
                    value = converter
                        .convert_value(&value, unit, target)
                        .map_err(|e| ShaderGenError::MissingInput {
                            node: elem.name().to_string(),
                            input: e.to_string(),
                        })?;
                }
            }
        }
        if let Some(space) = elem.attribute(attr::COLOR_SPACE) {
            value = self.context.color_system().transform(
                &value,
                space,
                &self.context.options.target_color_space,
            );
        }
        Ok(value)
    }

    /// The nodedef-declared default for a port, or the type's zero value
    fn default_value(
        &self,
        node_def: ElementId,
        input_name: &str,
        ty: ValueType,
    ) -> Result<Value, ShaderGenError> {
        if let Some(def_input) = self.doc.child_by_name(node_def, input_name) {
            if let Some(value) = self.doc.typed_value(def_input)? {
                return Ok(value);
            }
        }
        Ok(Value::zero(ty))
    }

    /// Inline a compound node's inner graph into this builder
    fn flatten_compound(
        &mut self,
        graph_elem: ElementId,
        node_name: &str,
        inputs: &[ShaderInput],
    ) -> Result<NodeIndex, ShaderGenError> {
        let output = self
            .doc
            .outputs_of(graph_elem)
            .next()
            .ok_or_else(|| ShaderGenError::MissingInput {
                node: self.element_name(graph_elem),
                input: "output".to_string(),
            })?;
        check_acyclic(self.doc, output)?;
        let interface: IndexMap<String, InputBinding> = inputs
            .iter()
            .map(|i| (i.name.clone(), i.binding.clone()))
            .collect();
        let inner_scope = Scope {
            prefix: format!("{}_", sanitize(node_name)),
            interface,
        };
        let producer = self.resolve_producer_of_output(output)?;
        self.build_node(producer, &inner_scope)
    }

    fn resolve_producer_of_output(&self, output: ElementId) -> Result<ElementId, ShaderGenError> {
        self.doc
            .upstream_of(output)?
            .ok_or_else(|| ShaderGenError::MissingInput {
                node: self.element_name(output),
                input: attr::NODE_NAME.to_string(),
            })
    }

    /// Build a reusable compound's inner graph behind a function interface
    fn build_compound(
        &mut self,
        graph_elem: ElementId,
        node_def: ElementId,
    ) -> Result<CompoundImpl, ShaderGenError> {
        let graph_name = self.element_name(graph_elem);
        let mut params = Vec::new();
        let mut interface = IndexMap::new();
        let declared: Vec<ElementId> = self.doc.inputs_of(node_def).collect();
        let mut taken: std::collections::HashSet<String> = declared
            .iter()
            .filter_map(|&id| self.doc.element(id))
            .map(|e| sanitize(e.name()))
            .collect();
        for def_input in declared {
            let Some(def_elem) = self.doc.element(def_input) else {
                continue;
            };
            let name = def_elem.name().to_string();
            taken.remove(&sanitize(&name));
            let ty = self.input_type(def_input, node_def, &name)?;
            let ident = param_ident(&name, &mut taken);
            interface.insert(name.clone(), InputBinding::Interface(ident.clone()));
            params.push(CompoundParam {
                port: name,
                ident,
                ty,
            });
        }

        let mut inner_builder = GraphBuilder::new(self.doc, self.context);
        inner_builder.active_defs = self.active_defs.clone();
        let scope = Scope {
            prefix: String::new(),
            interface,
        };
        let outputs: Vec<ElementId> = self.doc.outputs_of(graph_elem).collect();
        let mut graph_outputs = Vec::new();
        for output in outputs {
            check_acyclic(self.doc, output)?;
            graph_outputs.push(inner_builder.build_output(output, &scope)?);
        }
        Ok(CompoundImpl {
            function_name: sanitize(&graph_name),
            graph: Box::new(ShaderGraph {
                name: graph_name,
                nodes: inner_builder.nodes,
                outputs: graph_outputs,
            }),
            params,
        })
    }
}

/// Error raised while building or emitting a shader graph.
///
/// Every variant aborts generation for the current material only; shared
/// context state is never corrupted, so sibling materials can still be
/// processed.
#[derive(Debug, thiserror::Error)]
pub enum ShaderGenError {
    /// No nodedef matches the node's category and type
    #[error("No nodedef resolves for node {node:?}")]
    UnresolvedNodeDefinition {
        /// Offending node name
        node: String,
    },

    /// A connected input's type differs from its source output's type
    #[error("Type mismatch on {node:?}.{input}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Consuming node name
        node: String,
        /// Input port name
        input: String,
        /// Declared input type
        expected: ValueType,
        /// Source output type
        actual: ValueType,
    },

    /// The connection graph loops back on itself
    #[error("Cyclic connection through {node:?}")]
    CyclicGraph {
        /// Node closing the cycle
        node: String,
    },

    /// No implementation is registered for (category, target)
    #[error("No {target} implementation for {category:?} node {node:?}")]
    NoImplementationForTarget {
        /// Offending node name
        node: String,
        /// Node category
        category: String,
        /// Generation target
        target: String,
    },

    /// A required input or interface binding is absent
    #[error("Node {node:?} is missing required input {input:?}")]
    MissingInput {
        /// Offending node name
        node: String,
        /// Missing port or binding name
        input: String,
    },

    /// No type is declared for an element that needs one
    #[error("No type declared for {element:?}")]
    MissingType {
        /// Offending element name
        element: String,
    },

    /// Underlying document failure
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl From<TraversalError> for ShaderGenError {
    fn from(err: TraversalError) -> Self {
        match err {
            TraversalError::CyclicGraph { element } => Self::CyclicGraph { node: element },
            TraversalError::Document(err) => Self::Document(err),
        }
    }
}
