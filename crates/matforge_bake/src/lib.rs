// SPDX-License-Identifier: MIT OR Apache-2.0
//! Texture baking for MatForge.
//!
//! Drives the shader graph builder over every renderable material of a
//! document and flattens each connected shader input into either a folded
//! constant (when the subgraph is spatially uniform) or a rasterized image
//! file, returning a rewritten document that references the baked results:
//!
//! - `eval` — CPU execution of compiled shader graphs, one geometry sample
//!   at a time
//! - `baker` — the per-material bake loop, resolution rules, image output
//!   and document rewriting

pub mod baker;
pub mod eval;

pub use baker::{BakeError, BakeFailure, BakeReport, BaseType, TextureBaker};
pub use eval::{EvalError, Evaluator, GeomSample, ImageCache};
