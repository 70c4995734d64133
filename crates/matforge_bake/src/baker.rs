// SPDX-License-Identifier: MIT OR Apache-2.0
//! Texture baking: rasterize or constant-fold material subgraphs.
//!
//! For every renderable material, each connected shader input's subgraph is
//! compiled and either folded to a constant (when it is provably spatially
//! uniform) or rasterized into an image file. The source document is never
//! mutated; a rewritten clone referencing the baked results is returned,
//! and nothing durable is written for a material unless its whole bake
//! succeeded. One material's failure never aborts its siblings.

use crate::eval::{EvalError, Evaluator, GeomSample, ImageCache};
use image::codecs::hdr::HdrEncoder;
use image::{Rgb, RgbaImage};
use matforge_document::{
    attr, category, Document, DocumentError, ElementId, SearchPath, Value, ValueType,
};
use matforge_shadergen::{GenContext, InputBinding, ShaderGenError, ShaderGraph};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Smallest rasterization dimension
const MIN_BAKE_DIM: u32 = 4;

/// Pixel storage of baked images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// 8-bit unsigned normalized, written as PNG
    Unorm8,
    /// 32-bit float, written as Radiance HDR
    Float,
}

impl BaseType {
    fn extension(self) -> &'static str {
        match self {
            Self::Unorm8 => "png",
            Self::Float => "hdr",
        }
    }
}

/// One material that failed to bake
#[derive(Debug)]
pub struct BakeFailure {
    /// Material name
    pub material: String,
    /// Failure description
    pub error: String,
}

/// Outcome of a whole-document bake
#[derive(Debug)]
pub struct BakeReport {
    /// Rewritten document referencing baked images and folded constants
    pub document: Document,
    /// Image files written, in bake order
    pub written: Vec<PathBuf>,
    /// Materials skipped with their failure causes
    pub failures: Vec<BakeFailure>,
}

/// Bakes the procedural subgraphs of a document's materials
#[derive(Debug, Clone)]
pub struct TextureBaker {
    width: Option<u32>,
    height: Option<u32>,
    base_type: BaseType,
    average_images: bool,
    optimize_constants: bool,
    distance_unit: String,
}

impl TextureBaker {
    /// Baker with automatic resolution, PNG output and constant folding on
    pub fn new() -> Self {
        Self {
            width: None,
            height: None,
            base_type: BaseType::Unorm8,
            average_images: false,
            optimize_constants: true,
            distance_unit: "meter".to_string(),
        }
    }

    /// Force a fixed rasterization resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Select the pixel storage of written images
    pub fn with_base_type(mut self, base_type: BaseType) -> Self {
        self.base_type = base_type;
        self
    }

    /// Reduce every baked image to its average color
    pub fn with_average_images(mut self, average: bool) -> Self {
        self.average_images = average;
        self
    }

    /// Fold spatially uniform subgraphs to constants instead of images
    pub fn with_optimize_constants(mut self, optimize: bool) -> Self {
        self.optimize_constants = optimize;
        self
    }

    /// Distance unit length-valued inputs are rescaled to
    pub fn with_distance_unit(mut self, unit: impl Into<String>) -> Self {
        self.distance_unit = unit.into();
        self
    }

    /// Bake every renderable material of a document.
    ///
    /// Image files land under `output_dir`, honoring each source graph's
    /// file prefix. Per-material failures are accumulated in the report.
    pub fn bake_all_materials(
        &self,
        doc: &Document,
        search_path: &SearchPath,
        output_dir: &Path,
    ) -> Result<BakeReport, BakeError> {
        let mut context = GenContext::for_glsl();
        context.options.target_distance_unit = self.distance_unit.clone();
        std::fs::create_dir_all(output_dir)?;

        let mut baked = doc.clone();
        let mut written = Vec::new();
        let mut failures = Vec::new();

        let materials: Vec<ElementId> = doc.materials().collect();
        for material in materials {
            let material_name = doc
                .element(material)
                .map(|e| e.name().to_string())
                .unwrap_or_default();
            match self.bake_material(doc, material, &material_name, &context, search_path) {
                Ok(outcome) => {
                    match self.commit(&mut baked, &material_name, outcome, output_dir, &mut written)
                    {
                        Ok(()) => {
                            tracing::info!("baked material {material_name:?}");
                        }
                        Err(err) => {
                            tracing::warn!("failed to commit bake of {material_name:?}: {err}");
                            failures.push(BakeFailure {
                                material: material_name,
                                error: err.to_string(),
                            });
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("skipping material {material_name:?}: {err}");
                    failures.push(BakeFailure {
                        material: material_name,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(BakeReport {
            document: baked,
            written,
            failures,
        })
    }

    /// Rasterize or fold every connected shader input of one material,
    /// without touching the output document or the file system
    fn bake_material(
        &self,
        doc: &Document,
        material: ElementId,
        material_name: &str,
        context: &GenContext,
        search_path: &SearchPath,
    ) -> Result<MaterialOutcome, BakeError> {
        let mut outcome = MaterialOutcome::default();
        for shader in doc.shader_nodes(material) {
            let inputs: Vec<ElementId> = doc.inputs_of(shader).collect();
            for input in inputs {
                let Some(input_elem) = doc.element(input) else {
                    continue;
                };
                if !input_elem.is_connected() {
                    continue;
                }
                let input_name = input_elem.name().to_string();
                let root = doc
                    .upstream_of(input)?
                    .ok_or(DocumentError::StaleElement(input))?;
                let graph = ShaderGraph::build(doc, root, context)?;
                let images = load_referenced_images(&graph, search_path)?;
                let evaluator = Evaluator::new(&graph, &images);

                if self.optimize_constants && graph.is_uniform() {
                    let values = evaluator.evaluate(&GeomSample::default())?;
                    let value = values
                        .into_iter()
                        .next()
                        .ok_or(BakeError::EmptyGraph)?;
                    outcome.rewrites.push(Rewrite::Constant { input, value });
                    continue;
                }

                let (width, height) = self.resolution(&images);
                let mut pixels = Vec::with_capacity((width * height) as usize);
                for y in 0..height {
                    for x in 0..width {
                        let u = (x as f32 + 0.5) / width as f32;
                        let v = 1.0 - (y as f32 + 0.5) / height as f32;
                        let values = evaluator.evaluate(&GeomSample::at_uv(u, v))?;
                        let value = values.first().ok_or(BakeError::EmptyGraph)?;
                        pixels.push(value_to_rgba(value)?);
                    }
                }
                if self.average_images {
                    let inverse = 1.0 / pixels.len() as f32;
                    let mut average = [0.0f32; 4];
                    for pixel in &pixels {
                        for (slot, component) in average.iter_mut().zip(pixel) {
                            *slot += component * inverse;
                        }
                    }
                    pixels.fill(average);
                }

                let file_prefix = doc.file_prefix(root).unwrap_or_default();
                let relative = format!(
                    "{file_prefix}{material_name}_{input_name}.{}",
                    self.base_type.extension()
                );
                let ty = graph
                    .outputs()
                    .first()
                    .map(|o| o.ty)
                    .unwrap_or(ValueType::Color3);
                outcome.writes.push(PendingWrite {
                    relative: relative.clone(),
                    width,
                    height,
                    pixels,
                });
                outcome.rewrites.push(Rewrite::Image {
                    input,
                    input_name,
                    ty,
                    relative,
                });
            }
        }
        Ok(outcome)
    }

    /// Baked image resolution: configured, else the largest referenced
    /// source image, floored at 4x4
    fn resolution(&self, images: &ImageCache) -> (u32, u32) {
        let (width, height) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            _ => images.max_dimensions().unwrap_or((MIN_BAKE_DIM, MIN_BAKE_DIM)),
        };
        (width.max(MIN_BAKE_DIM), height.max(MIN_BAKE_DIM))
    }

    /// Write a successful material's images and apply its document rewrites
    fn commit(
        &self,
        baked: &mut Document,
        material_name: &str,
        outcome: MaterialOutcome,
        output_dir: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<(), BakeError> {
        for write in &outcome.writes {
            let path = output_dir.join(&write.relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.write_image(&path, write)?;
            written.push(path);
        }
        for rewrite in outcome.rewrites {
            apply_rewrite(baked, material_name, rewrite)?;
        }
        Ok(())
    }

    fn write_image(&self, path: &Path, write: &PendingWrite) -> Result<(), BakeError> {
        match self.base_type {
            BaseType::Unorm8 => {
                let mut img = RgbaImage::new(write.width, write.height);
                for (pixel, rgba) in img.pixels_mut().zip(&write.pixels) {
                    pixel.0 = rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8);
                }
                img.save(path)?;
            }
            BaseType::Float => {
                let data: Vec<Rgb<f32>> = write
                    .pixels
                    .iter()
                    .map(|rgba| Rgb([rgba[0], rgba[1], rgba[2]]))
                    .collect();
                let file = std::fs::File::create(path)?;
                HdrEncoder::new(BufWriter::new(file)).encode(
                    &data,
                    write.width as usize,
                    write.height as usize,
                )?;
            }
        }
        Ok(())
    }
}

impl Default for TextureBaker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct MaterialOutcome {
    writes: Vec<PendingWrite>,
    rewrites: Vec<Rewrite>,
}

#[derive(Debug)]
struct PendingWrite {
    relative: String,
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

#[derive(Debug)]
enum Rewrite {
    /// Replace a connected input with a folded literal
    Constant { input: ElementId, value: Value },
    /// Replace a connected input with a baked image reference
    Image {
        input: ElementId,
        input_name: String,
        ty: ValueType,
        relative: String,
    },
}

/// Load every image file a graph references, first match on the search path
fn load_referenced_images(
    graph: &ShaderGraph,
    search_path: &SearchPath,
) -> Result<ImageCache, BakeError> {
    let mut images = ImageCache::new();
    for node in graph.nodes() {
        if node.category != "image" {
            continue;
        }
        let Some(InputBinding::Value(Value::Filename(file))) =
            node.input("file").map(|p| &p.binding)
        else {
            continue;
        };
        if images.get(file).is_some() {
            continue;
        }
        let path = search_path
            .find(file)
            .ok_or_else(|| BakeError::MissingResource { path: file.clone() })?;
        let img = image::open(&path)?.to_rgba32f();
        images.insert(file.clone(), img);
    }
    Ok(images)
}

fn value_to_rgba(value: &Value) -> Result<[f32; 4], BakeError> {
    let comps = value
        .components()
        .ok_or_else(|| BakeError::UnsupportedOutput {
            ty: value.value_type(),
        })?;
    Ok(match comps {
        [c] => [*c, *c, *c, 1.0],
        [x, y] => [*x, *y, 0.0, 1.0],
        [r, g, b] => [*r, *g, *b, 1.0],
        [r, g, b, a] => [*r, *g, *b, *a],
        _ => {
            return Err(BakeError::UnsupportedOutput {
                ty: value.value_type(),
            })
        }
    })
}

/// Rewrite one baked input in the output document
fn apply_rewrite(
    baked: &mut Document,
    material_name: &str,
    rewrite: Rewrite,
) -> Result<(), BakeError> {
    match rewrite {
        Rewrite::Constant { input, value } => {
            let elem = baked
                .element_mut(input)
                .ok_or(DocumentError::StaleElement(input))?;
            elem.set_value_string(value.to_string());
        }
        Rewrite::Image {
            input,
            input_name,
            ty,
            relative,
        } => {
            let graph_name = format!("NG_baked_{material_name}");
            let graph = match baked.node_graph(&graph_name) {
                Some(graph) => graph,
                None => baked.add_child(baked.root(), category::NODEGRAPH, &graph_name)?,
            };
            let node_name = format!("{input_name}_baked");
            let image_node = baked.add_child(graph, "image", &node_name)?;
            let elem = baked
                .element_mut(image_node)
                .ok_or(DocumentError::StaleElement(image_node))?;
            elem.set_attribute(attr::TYPE, ty.type_string());
            let file_input = baked.add_child(image_node, category::INPUT, "file")?;
            let elem = baked
                .element_mut(file_input)
                .ok_or(DocumentError::StaleElement(file_input))?;
            elem.set_attribute(attr::TYPE, "filename");
            elem.set_value_string(&relative);

            let output_name = format!("{input_name}_output");
            let output = baked.add_child(graph, category::OUTPUT, &output_name)?;
            let elem = baked
                .element_mut(output)
                .ok_or(DocumentError::StaleElement(output))?;
            elem.set_attribute(attr::TYPE, ty.type_string());
            elem.set_node_name(&node_name);

            let elem = baked
                .element_mut(input)
                .ok_or(DocumentError::StaleElement(input))?;
            elem.set_node_graph(&graph_name, &output_name);
        }
    }
    Ok(())
}

/// Error raised by the baking pipeline
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    /// Graph construction or emission failed for the current material
    #[error(transparent)]
    Generation(#[from] ShaderGenError),

    /// CPU evaluation failed
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// A referenced file did not resolve on the search path
    #[error("Could not resolve {path:?} on the search path")]
    MissingResource {
        /// Unresolved file reference
        path: String,
    },

    /// A graph output type has no image representation
    #[error("Cannot bake a {ty:?} output to an image")]
    UnsupportedOutput {
        /// Offending type
        ty: ValueType,
    },

    /// The compiled graph has no outputs
    #[error("Shader graph has no outputs to bake")]
    EmptyGraph,

    /// Underlying document failure
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// File system failure, bubbled verbatim
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Image encode/decode failure
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
