// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material document model for MatForge.
//!
//! This crate owns the in-memory form of a material-graph document: a tree
//! of named, typed elements (nodes, nodedefs, inputs, outputs, nodegraphs,
//! materials) with free-form attributes, plus the traversal primitives the
//! shader generator and texture baker are built on:
//!
//! - Typed attribute values with textual round-tripping
//! - An arena-owned element tree with parent back-references
//! - Depth-first tree and dependency-graph iterators with subtree pruning
//!   and cycle detection
//! - Post-load document modifier passes
//! - Search paths and real-world unit conversion

pub mod document;
pub mod element;
pub mod modifiers;
pub mod search_path;
pub mod traversal;
pub mod units;
pub mod value;

pub use document::{Document, DocumentError, Implementation};
pub use element::{attr, category, Element, ElementId};
pub use modifiers::DocumentModifiers;
pub use search_path::SearchPath;
pub use traversal::{Edge, GraphIterator, TraversalError, TreeIterator};
pub use units::{LinearUnitConverter, UnitConverterRegistry, UnitError, UnitTypeDef};
pub use value::{Value, ValueError, ValueType};
