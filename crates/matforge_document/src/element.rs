// SPDX-License-Identifier: MIT OR Apache-2.0
//! Elements of the document tree.
//!
//! An element is a named, typed node in the document hierarchy. The
//! [`crate::document::Document`] owns all elements in an arena; elements
//! refer to their parent and children through [`ElementId`] indices, so the
//! tree carries no ownership cycles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Well-known element categories
pub mod category {
    /// Operation node in a material graph
    pub const NODE: &str = "node";
    /// Schema declaring a node category's ports and implementation
    pub const NODEDEF: &str = "nodedef";
    /// Container of nodes and outputs
    pub const NODEGRAPH: &str = "nodegraph";
    /// Input port element
    pub const INPUT: &str = "input";
    /// Output port element
    pub const OUTPUT: &str = "output";
    /// Renderable material element
    pub const MATERIAL: &str = "material";
    /// Document root
    pub const DOCUMENT: &str = "document";
}

/// Well-known attribute names
pub mod attr {
    /// Declared value type-string
    pub const TYPE: &str = "type";
    /// Literal value text
    pub const VALUE: &str = "value";
    /// Connection to a sibling node
    pub const NODE_NAME: &str = "nodename";
    /// Connection to a node graph
    pub const NODE_GRAPH: &str = "nodegraph";
    /// Output selector for a graph or multi-output connection
    pub const OUTPUT: &str = "output";
    /// Explicit nodedef reference on a node
    pub const NODE_DEF: &str = "nodedef";
    /// Node category a nodedef declares ports for
    pub const NODE: &str = "node";
    /// Implementation reference on a nodedef
    pub const IMPLEMENTATION: &str = "implementation";
    /// Relative path prefix for file-valued inputs in this scope
    pub const FILE_PREFIX: &str = "fileprefix";
    /// Real-world unit of a length-valued input
    pub const UNIT: &str = "unit";
    /// Source color space of a color-valued input
    pub const COLOR_SPACE: &str = "colorspace";
    /// Marks a compound nodegraph as an emittable subroutine
    pub const REUSABLE: &str = "reusable";
    /// Binds an input inside a compound graph to the interface port of the
    /// enclosing nodedef
    pub const INTERFACE_NAME: &str = "interfacename";
}

/// Index of an element within its owning document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// Arena slot index
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named, typed element in the document tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Name, unique among siblings
    name: String,
    /// Category tag, immutable semantics bound at creation
    category: String,
    /// Free-form string attributes in declaration order
    attributes: IndexMap<String, String>,
    /// Parent back-reference
    pub(crate) parent: Option<ElementId>,
    /// Owned children in declaration order
    pub(crate) children: Vec<ElementId>,
}

impl Element {
    pub(crate) fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            attributes: IndexMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Element name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element category tag
    pub fn category(&self) -> &str {
        &self.category
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
    }

    /// Parent element, if any
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Child elements in declaration order
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    /// Get an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the attribute is present
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Set an attribute value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Remove an attribute
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    /// Attribute names in declaration order
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Declared type-string, for port-like elements
    pub fn type_string(&self) -> Option<&str> {
        self.attribute(attr::TYPE)
    }

    /// Whether this element is a connection-bearing port (has a
    /// `nodename` or `nodegraph` reference)
    pub fn is_connected(&self) -> bool {
        self.has_attribute(attr::NODE_NAME) || self.has_attribute(attr::NODE_GRAPH)
    }

    /// Literal value text, mutually exclusive with a connection
    pub fn value_string(&self) -> Option<&str> {
        if self.is_connected() {
            None
        } else {
            self.attribute(attr::VALUE)
        }
    }

    /// Set a literal value, clearing any connection reference
    pub fn set_value_string(&mut self, value: impl Into<String>) {
        self.remove_attribute(attr::NODE_NAME);
        self.remove_attribute(attr::NODE_GRAPH);
        self.remove_attribute(attr::OUTPUT);
        self.set_attribute(attr::VALUE, value);
    }

    /// Connect to a sibling node, clearing any literal value
    pub fn set_node_name(&mut self, node: impl Into<String>) {
        self.remove_attribute(attr::VALUE);
        self.remove_attribute(attr::NODE_GRAPH);
        self.set_attribute(attr::NODE_NAME, node);
    }

    /// Connect to a node graph output, clearing any literal value
    pub fn set_node_graph(&mut self, graph: impl Into<String>, output: impl Into<String>) {
        self.remove_attribute(attr::VALUE);
        self.remove_attribute(attr::NODE_NAME);
        self.set_attribute(attr::NODE_GRAPH, graph);
        self.set_attribute(attr::OUTPUT, output);
    }
}
