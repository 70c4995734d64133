// SPDX-License-Identifier: MIT OR Apache-2.0
//! CPU evaluation of compiled shader graphs.
//!
//! The baker executes the same graphs the code emitter consumes, one
//! geometry sample at a time: nodes evaluate in topological order with
//! their outputs cached, mirroring the value semantics of the GLSL node
//! set.

use image::Rgba32FImage;
use indexmap::IndexMap;
use matforge_document::{Value, ValueType};
use matforge_shadergen::{InputBinding, NodeImpl, ShaderGraph, ShaderNode};
use std::collections::HashMap;

/// Geometry state for one evaluated sample
#[derive(Debug, Clone, Copy)]
pub struct GeomSample {
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Surface normal
    pub normal: [f32; 3],
    /// Surface position
    pub position: [f32; 3],
}

impl GeomSample {
    /// Sample at a texture coordinate on the bake plane
    pub fn at_uv(u: f32, v: f32) -> Self {
        Self {
            uv: [u, v],
            normal: [0.0, 0.0, 1.0],
            position: [u, v, 0.0],
        }
    }
}

impl Default for GeomSample {
    fn default() -> Self {
        Self::at_uv(0.5, 0.5)
    }
}

/// Loaded source images keyed by their document file reference
#[derive(Debug, Default)]
pub struct ImageCache {
    images: HashMap<String, Rgba32FImage>,
}

impl ImageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded image under its file reference
    pub fn insert(&mut self, file: impl Into<String>, image: Rgba32FImage) {
        self.images.insert(file.into(), image);
    }

    /// Look up a loaded image
    pub fn get(&self, file: &str) -> Option<&Rgba32FImage> {
        self.images.get(file)
    }

    /// Largest dimensions over all loaded images
    pub fn max_dimensions(&self) -> Option<(u32, u32)> {
        self.images
            .values()
            .map(|img| (img.width(), img.height()))
            .reduce(|(w1, h1), (w2, h2)| (w1.max(w2), h1.max(h2)))
    }
}

/// Evaluates a shader graph on the CPU
pub struct Evaluator<'a> {
    graph: &'a ShaderGraph,
    images: &'a ImageCache,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over a graph and its referenced images
    pub fn new(graph: &'a ShaderGraph, images: &'a ImageCache) -> Self {
        Self { graph, images }
    }

    /// Evaluate every graph output for one geometry sample
    pub fn evaluate(&self, sample: &GeomSample) -> Result<Vec<Value>, EvalError> {
        let env = IndexMap::new();
        let outputs = self.evaluate_nodes(self.graph, sample, &env)?;
        self.graph
            .outputs()
            .iter()
            .map(|output| {
                outputs
                    .get(output.node)
                    .and_then(|v| v.clone())
                    .ok_or_else(|| EvalError::Internal {
                        node: output.name.clone(),
                    })
            })
            .collect()
    }

    fn evaluate_nodes(
        &self,
        graph: &ShaderGraph,
        sample: &GeomSample,
        env: &IndexMap<String, Value>,
    ) -> Result<Vec<Option<Value>>, EvalError> {
        let mut cache: Vec<Option<Value>> = vec![None; graph.len()];
        for (index, node) in graph.nodes().enumerate() {
            let value = self.evaluate_node(graph, node, sample, env, &cache)?;
            cache[index] = Some(value);
        }
        Ok(cache)
    }

    fn input_value(
        &self,
        graph: &ShaderGraph,
        node: &ShaderNode,
        name: &str,
        env: &IndexMap<String, Value>,
        cache: &[Option<Value>],
    ) -> Result<Value, EvalError> {
        let port = node.input(name).ok_or_else(|| EvalError::MissingInput {
            node: node.name.clone(),
            input: name.to_string(),
        })?;
        match &port.binding {
            InputBinding::Value(value) => Ok(value.clone()),
            InputBinding::Connection(index) => {
                cache
                    .get(*index)
                    .and_then(|v| v.clone())
                    .ok_or_else(|| EvalError::Internal {
                        node: node.name.clone(),
                    })
            }
            InputBinding::Interface(ident) => {
                env.get(ident).cloned().ok_or_else(|| EvalError::MissingInput {
                    node: node.name.clone(),
                    input: ident.clone(),
                })
            }
        }
    }

    fn evaluate_node(
        &self,
        graph: &ShaderGraph,
        node: &ShaderNode,
        sample: &GeomSample,
        env: &IndexMap<String, Value>,
        cache: &[Option<Value>],
    ) -> Result<Value, EvalError> {
        if let NodeImpl::Compound(compound) = &node.implementation {
            let mut inner_env = IndexMap::new();
            for param in &compound.params {
                let value = self.input_value(graph, node, &param.port, env, cache)?;
                inner_env.insert(param.ident.clone(), value);
            }
            let inner = self.evaluate_nodes(&compound.graph, sample, &inner_env)?;
            let output = compound
                .graph
                .outputs()
                .first()
                .ok_or_else(|| EvalError::Internal {
                    node: node.name.clone(),
                })?;
            return inner
                .get(output.node)
                .and_then(|v| v.clone())
                .ok_or_else(|| EvalError::Internal {
                    node: node.name.clone(),
                });
        }

        let get = |name: &str| self.input_value(graph, node, name, env, cache);
        match node.category.as_str() {
            "constant" => get("value"),
            "texcoord" => Ok(Value::Vector2(sample.uv)),
            "normal" => Ok(Value::Vector3(sample.normal)),
            "position" => Ok(Value::Vector3(sample.position)),
            // Custom geometric properties are absent on the bake plane and
            // evaluate to their type's zero.
            "geompropvalue" => Ok(Value::zero(node.output.ty)),
            "image" => self.sample_image(graph, node, sample, env, cache),
            "add" => broadcast_op(&get("in1")?, &get("in2")?, |a, b| a + b),
            "subtract" => broadcast_op(&get("in1")?, &get("in2")?, |a, b| a - b),
            "multiply" => broadcast_op(&get("in1")?, &get("in2")?, |a, b| a * b),
            "divide" => broadcast_op(&get("in1")?, &get("in2")?, |a, b| {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }),
            "power" => broadcast_op(&get("in1")?, &get("in2")?, f32::powf),
            "mix" => {
                let fg = get("fg")?;
                let bg = get("bg")?;
                let mix = get("mix")?;
                let blended = broadcast_op(&fg, &bg, |a, b| a - b)?;
                let scaled = broadcast_op(&blended, &mix, |a, b| a * b)?;
                broadcast_op(&bg, &scaled, |a, b| a + b)
            }
            "clamp" => {
                let clamped = broadcast_op(&get("in")?, &get("low")?, f32::max)?;
                broadcast_op(&clamped, &get("high")?, f32::min)
            }
            "dotproduct" => {
                let a = components(&get("in1")?)?;
                let b = components(&get("in2")?)?;
                Ok(Value::Float(
                    a.iter().zip(&b).map(|(x, y)| x * y).sum(),
                ))
            }
            "normalize" => {
                let v = get("in")?;
                let comps = components(&v)?;
                let len = comps.iter().map(|c| c * c).sum::<f32>().sqrt();
                if len == 0.0 {
                    Ok(v)
                } else {
                    reshape(&comps.iter().map(|c| c / len).collect::<Vec<_>>(), v.value_type())
                }
            }
            "convert" => {
                let v = get("in")?;
                convert(&v, node.output.ty)
            }
            "combine2" | "combine3" | "combine4" => {
                let names = ["in1", "in2", "in3", "in4"];
                let count = node.output.ty.component_count().unwrap_or(0);
                let mut comps = Vec::with_capacity(count);
                for name in names.iter().take(count) {
                    comps.push(
                        get(name)?
                            .as_float()
                            .ok_or_else(|| EvalError::MissingInput {
                                node: node.name.clone(),
                                input: (*name).to_string(),
                            })?,
                    );
                }
                reshape(&comps, node.output.ty)
            }
            "standard_surface" => {
                let base_color = get("base_color")?;
                let metallic = get("metalness")?;
                let emission = get("emission")?;
                let emission_color = get("emission_color")?;
                let dimmed = broadcast_op(
                    &base_color,
                    &broadcast_op(&metallic, &Value::Float(0.0), |m, _| 1.0 - 0.5 * m)?,
                    |a, b| a * b,
                )?;
                let emitted = broadcast_op(&emission_color, &emission, |a, b| a * b)?;
                broadcast_op(&dimmed, &emitted, |a, b| a + b)
            }
            other => Err(EvalError::UnsupportedCategory {
                category: other.to_string(),
            }),
        }
    }

    fn sample_image(
        &self,
        graph: &ShaderGraph,
        node: &ShaderNode,
        sample: &GeomSample,
        env: &IndexMap<String, Value>,
        cache: &[Option<Value>],
    ) -> Result<Value, EvalError> {
        let file = match node.input("file").map(|p| &p.binding) {
            Some(InputBinding::Value(Value::Filename(file))) => file.clone(),
            _ => {
                return Err(EvalError::MissingInput {
                    node: node.name.clone(),
                    input: "file".to_string(),
                })
            }
        };
        let image = self
            .images
            .get(&file)
            .ok_or(EvalError::MissingImage { file })?;
        // A value-bound texcoord is the nodedef default, which stands in
        // for the geometric UV set; only a real connection overrides it.
        let uv = match node.input("texcoord").map(|p| &p.binding) {
            Some(InputBinding::Connection(_) | InputBinding::Interface(_)) => {
                match self.input_value(graph, node, "texcoord", env, cache)? {
                    Value::Vector2(uv) => uv,
                    _ => sample.uv,
                }
            }
            _ => sample.uv,
        };
        let x = (uv[0].rem_euclid(1.0) * image.width() as f32) as u32 % image.width();
        let y = ((1.0 - uv[1]).rem_euclid(1.0) * image.height() as f32) as u32 % image.height();
        let pixel = image.get_pixel(x, y).0;
        match node.output.ty {
            ValueType::Float => Ok(Value::Float(pixel[0])),
            ValueType::Color4 | ValueType::Vector4 => Ok(Value::Color4(pixel)),
            _ => Ok(Value::Color3([pixel[0], pixel[1], pixel[2]])),
        }
    }
}

fn components(value: &Value) -> Result<Vec<f32>, EvalError> {
    value
        .components()
        .map(<[f32]>::to_vec)
        .ok_or_else(|| EvalError::NonNumeric {
            ty: value.value_type(),
        })
}

fn reshape(comps: &[f32], ty: ValueType) -> Result<Value, EvalError> {
    let value = match (ty, comps.len()) {
        (ValueType::Float, 1) => Value::Float(comps[0]),
        (ValueType::Vector2, 2) => Value::Vector2([comps[0], comps[1]]),
        (ValueType::Color3, 3) => Value::Color3([comps[0], comps[1], comps[2]]),
        (ValueType::Vector3, 3) => Value::Vector3([comps[0], comps[1], comps[2]]),
        (ValueType::Color4, 4) => Value::Color4([comps[0], comps[1], comps[2], comps[3]]),
        (ValueType::Vector4, 4) => Value::Vector4([comps[0], comps[1], comps[2], comps[3]]),
        _ => return Err(EvalError::NonNumeric { ty }),
    };
    Ok(value)
}

/// Componentwise arithmetic with scalar broadcasting on either side
fn broadcast_op(a: &Value, b: &Value, op: fn(f32, f32) -> f32) -> Result<Value, EvalError> {
    let lhs = components(a)?;
    let rhs = components(b)?;
    match (lhs.len(), rhs.len()) {
        (n, m) if n == m => {
            let comps: Vec<f32> = lhs.iter().zip(&rhs).map(|(x, y)| op(*x, *y)).collect();
            reshape(&comps, a.value_type())
        }
        (_, 1) => {
            let comps: Vec<f32> = lhs.iter().map(|x| op(*x, rhs[0])).collect();
            reshape(&comps, a.value_type())
        }
        (1, _) => {
            let comps: Vec<f32> = rhs.iter().map(|y| op(lhs[0], *y)).collect();
            reshape(&comps, b.value_type())
        }
        _ => Err(EvalError::ShapeMismatch {
            lhs: a.value_type(),
            rhs: b.value_type(),
        }),
    }
}

fn convert(value: &Value, to: ValueType) -> Result<Value, EvalError> {
    if value.value_type() == to {
        return Ok(value.clone());
    }
    let comps = components(value)?;
    let target = to.component_count().ok_or(EvalError::NonNumeric { ty: to })?;
    let mut out = comps.clone();
    match (comps.len(), target) {
        (n, m) if n == m => {}
        (1, m) => out = vec![comps[0]; m],
        (3, 4) => out.push(1.0),
        (2, 3) => out.push(0.0),
        (4, 3) | (3, 2) => out.truncate(target),
        _ => {
            return Err(EvalError::ShapeMismatch {
                lhs: value.value_type(),
                rhs: to,
            })
        }
    }
    reshape(&out, to)
}

/// Error raised during CPU graph evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A node category has no CPU semantics
    #[error("No CPU evaluation for category {category:?}")]
    UnsupportedCategory {
        /// Offending category
        category: String,
    },

    /// A required input is absent or mistyped
    #[error("Node {node:?} is missing evaluatable input {input:?}")]
    MissingInput {
        /// Offending node name
        node: String,
        /// Input port name
        input: String,
    },

    /// An image reference has not been loaded
    #[error("Image {file:?} is not loaded")]
    MissingImage {
        /// File reference text
        file: String,
    },

    /// Arithmetic over a non-numeric value
    #[error("Value of type {ty:?} has no numeric components")]
    NonNumeric {
        /// Offending type
        ty: ValueType,
    },

    /// Componentwise arithmetic over incompatible shapes
    #[error("Cannot combine {lhs:?} with {rhs:?}")]
    ShapeMismatch {
        /// Left-hand type
        lhs: ValueType,
        /// Right-hand type
        rhs: ValueType,
    },

    /// Evaluation order invariant broken
    #[error("Evaluation order violated at node {node:?}")]
    Internal {
        /// Offending node name
        node: String,
    },
}
