// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document ownership and element queries.

use crate::element::{attr, category, Element, ElementId};
use crate::value::{Value, ValueError, ValueType};
use serde::{Deserialize, Serialize};

/// How a nodedef is implemented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Implementation {
    /// Implemented by a nodegraph element (a compound node)
    Graph(ElementId),
    /// Implemented by a target-specific generator, keyed by tag
    Generator(String),
}

/// A material document: the exclusive owner of an element tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name
    pub name: String,
    /// Element arena; removed elements leave tombstone slots
    elements: Vec<Option<Element>>,
    /// Root element
    root: ElementId,
}

impl Document {
    /// Create a new document with an empty root element
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = Element::new(name.clone(), category::DOCUMENT);
        Self {
            name,
            elements: vec![Some(root)],
            root: ElementId(0),
        }
    }

    /// The root element
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Look up an element by id
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0).and_then(Option::as_ref)
    }

    /// Look up an element mutably by id
    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id.0).and_then(Option::as_mut)
    }

    fn expect(&self, id: ElementId) -> Result<&Element, DocumentError> {
        self.element(id).ok_or(DocumentError::StaleElement(id))
    }

    /// Add a child element under a parent.
    ///
    /// Names must be unique within the parent scope.
    pub fn add_child(
        &mut self,
        parent: ElementId,
        child_category: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<ElementId, DocumentError> {
        let name = name.into();
        let parent_elem = self.expect(parent)?;
        if self.child_by_name(parent, &name).is_some() {
            return Err(DocumentError::DuplicateName {
                parent: parent_elem.name().to_string(),
                name,
            });
        }
        let mut elem = Element::new(name, child_category);
        elem.parent = Some(parent);
        let id = ElementId(self.elements.len());
        self.elements.push(Some(elem));
        if let Some(parent_elem) = self.element_mut(parent) {
            parent_elem.children.push(id);
        }
        Ok(id)
    }

    /// Remove a child by name, dropping its whole subtree
    pub fn remove_child(&mut self, parent: ElementId, name: &str) -> Option<ElementId> {
        let child = self.child_by_name(parent, name)?;
        if let Some(parent_elem) = self.element_mut(parent) {
            parent_elem.children.retain(|c| *c != child);
        }
        self.drop_subtree(child);
        Some(child)
    }

    fn drop_subtree(&mut self, id: ElementId) {
        let children = match self.element(id) {
            Some(elem) => elem.children.clone(),
            None => return,
        };
        for child in children {
            self.drop_subtree(child);
        }
        self.elements[id.0] = None;
    }

    /// Find a direct child by name
    pub fn child_by_name(&self, parent: ElementId, name: &str) -> Option<ElementId> {
        self.element(parent)?
            .children()
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some_and(|e| e.name() == name))
    }

    /// Direct children of the given category
    pub fn children_of_category<'a>(
        &'a self,
        parent: ElementId,
        cat: &'a str,
    ) -> impl Iterator<Item = ElementId> + 'a {
        self.element(parent)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |&c| self.element(c).is_some_and(|e| e.category() == cat))
    }

    /// Rename an element, enforcing sibling uniqueness
    pub fn rename(&mut self, id: ElementId, name: impl Into<String>) -> Result<(), DocumentError> {
        let name = name.into();
        let elem = self.expect(id)?;
        if let Some(parent) = elem.parent() {
            if let Some(existing) = self.child_by_name(parent, &name) {
                if existing != id {
                    return Err(DocumentError::DuplicateName {
                        parent: self.expect(parent)?.name().to_string(),
                        name,
                    });
                }
            }
        }
        if let Some(elem) = self.element_mut(id) {
            elem.set_name(name);
        }
        Ok(())
    }

    /// Top-level nodegraph elements
    pub fn node_graphs(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.children_of_category(self.root, category::NODEGRAPH)
    }

    /// Top-level nodedef elements
    pub fn node_defs(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.children_of_category(self.root, category::NODEDEF)
    }

    /// Top-level renderable material elements
    pub fn materials(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.children_of_category(self.root, category::MATERIAL)
    }

    /// Find a top-level nodegraph by name
    pub fn node_graph(&self, name: &str) -> Option<ElementId> {
        self.node_graphs()
            .find(|&id| self.element(id).is_some_and(|e| e.name() == name))
    }

    /// Nodedefs declaring ports for the given node category
    pub fn matching_node_defs<'a>(
        &'a self,
        node_string: &'a str,
    ) -> impl Iterator<Item = ElementId> + 'a {
        self.node_defs().filter(move |&id| {
            self.element(id)
                .is_some_and(|e| e.attribute(attr::NODE) == Some(node_string))
        })
    }

    /// Resolve the nodedef governing a node.
    ///
    /// An explicit `nodedef` attribute wins; otherwise the first nodedef
    /// matching the node's category and declared type is used.
    pub fn node_def_for(&self, node: ElementId) -> Option<ElementId> {
        let elem = self.element(node)?;
        if let Some(def_name) = elem.attribute(attr::NODE_DEF) {
            return self.child_by_name(self.root, def_name);
        }
        let node_type = elem.type_string();
        let mut fallback = None;
        for def in self.matching_node_defs(elem.category()) {
            let def_elem = self.element(def)?;
            match node_type {
                Some(ty) => {
                    if def_elem.type_string() == Some(ty) {
                        return Some(def);
                    }
                    fallback.get_or_insert(def);
                }
                None => return Some(def),
            }
        }
        fallback
    }

    /// Resolve a nodedef's implementation reference, if it has one
    pub fn implementation_of(&self, node_def: ElementId) -> Option<Implementation> {
        let def = self.element(node_def)?;
        let reference = def.attribute(attr::IMPLEMENTATION)?;
        match self.node_graph(reference) {
            Some(graph) => Some(Implementation::Graph(graph)),
            None => Some(Implementation::Generator(reference.to_string())),
        }
    }

    /// Input ports of a node-like element
    pub fn inputs_of(&self, node: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.children_of_category(node, category::INPUT)
    }

    /// Output ports of a node-like element
    pub fn outputs_of(&self, node: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.children_of_category(node, category::OUTPUT)
    }

    /// Shader nodes connected to a material's inputs
    pub fn shader_nodes(&self, material: ElementId) -> Vec<ElementId> {
        let mut shaders = Vec::new();
        for input in self.inputs_of(material) {
            if let Ok(Some(upstream)) = self.upstream_of(input) {
                shaders.push(upstream);
            }
        }
        shaders
    }

    /// Resolve the element a port connects to.
    ///
    /// A `nodegraph` reference resolves to the named output element inside
    /// that graph; a `nodename` reference resolves to the named node in the
    /// port's enclosing scope. Returns `Ok(None)` for unconnected ports.
    pub fn upstream_of(&self, port: ElementId) -> Result<Option<ElementId>, DocumentError> {
        let elem = self.expect(port)?;
        if let Some(graph_name) = elem.attribute(attr::NODE_GRAPH) {
            let graph = self.node_graph(graph_name).ok_or_else(|| {
                DocumentError::InvalidReference {
                    element: elem.name().to_string(),
                    reference: graph_name.to_string(),
                }
            })?;
            let output = match elem.attribute(attr::OUTPUT) {
                Some(output_name) => self.child_by_name(graph, output_name),
                None => self.outputs_of(graph).next(),
            };
            return match output {
                Some(output) => Ok(Some(output)),
                None => Err(DocumentError::InvalidReference {
                    element: elem.name().to_string(),
                    reference: format!("{graph_name} output"),
                }),
            };
        }
        if let Some(node_name) = elem.attribute(attr::NODE_NAME) {
            let scope = self.connection_scope(port)?;
            return match self.child_by_name(scope, node_name) {
                Some(node) => Ok(Some(node)),
                None => Err(DocumentError::InvalidReference {
                    element: elem.name().to_string(),
                    reference: node_name.to_string(),
                }),
            };
        }
        Ok(None)
    }

    /// The scope a port's `nodename` references resolve in: siblings of the
    /// owning node for inputs, the enclosing graph for outputs.
    fn connection_scope(&self, port: ElementId) -> Result<ElementId, DocumentError> {
        let elem = self.expect(port)?;
        let parent = elem.parent().ok_or(DocumentError::StaleElement(port))?;
        if elem.category() == category::OUTPUT {
            return Ok(parent);
        }
        self.expect(parent)?
            .parent()
            .ok_or(DocumentError::StaleElement(parent))
    }

    /// Parse a port's literal value against its declared type
    pub fn typed_value(&self, port: ElementId) -> Result<Option<Value>, DocumentError> {
        let elem = self.expect(port)?;
        let Some(text) = elem.value_string() else {
            return Ok(None);
        };
        let ty_string = elem.type_string().ok_or_else(|| {
            DocumentError::InvalidReference {
                element: elem.name().to_string(),
                reference: attr::TYPE.to_string(),
            }
        })?;
        let ty = ValueType::from_type_string(ty_string)?;
        Ok(Some(Value::parse(ty, text)?))
    }

    /// File prefix in effect for an element, inherited from enclosing scopes
    pub fn file_prefix(&self, id: ElementId) -> Option<String> {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let elem = self.element(cursor)?;
            if let Some(prefix) = elem.attribute(attr::FILE_PREFIX) {
                return Some(prefix.to_string());
            }
            current = elem.parent();
        }
        None
    }

    /// Deep-copy the top-level elements of a library document into this one.
    ///
    /// Elements whose names collide with existing top-level children are
    /// skipped, so application documents shadow the library.
    pub fn import_library(&mut self, library: &Document) {
        let lib_children: Vec<ElementId> = library
            .element(library.root())
            .map(|e| e.children.clone())
            .unwrap_or_default();
        for child in lib_children {
            let Some(elem) = library.element(child) else {
                continue;
            };
            if self.child_by_name(self.root, elem.name()).is_some() {
                continue;
            }
            self.copy_subtree(library, child, self.root);
        }
    }

    fn copy_subtree(&mut self, source: &Document, id: ElementId, target_parent: ElementId) {
        let Some(elem) = source.element(id) else {
            return;
        };
        let Ok(copy) = self.add_child(target_parent, elem.category(), elem.name()) else {
            return;
        };
        let attrs: Vec<(String, String)> = elem
            .attribute_names()
            .filter_map(|name| elem.attribute(name).map(|v| (name.to_string(), v.to_string())))
            .collect();
        if let Some(copy_elem) = self.element_mut(copy) {
            for (name, value) in attrs {
                copy_elem.set_attribute(name, value);
            }
        }
        for &child in elem.children() {
            self.copy_subtree(source, child, copy);
        }
    }

    /// Validate the document, accumulating human-readable warnings.
    ///
    /// Checks dangling connection references, literal values that fail to
    /// parse against their declared type, and nodes without a resolvable
    /// nodedef. Warnings do not abort loading.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (index, slot) in self.elements.iter().enumerate() {
            let Some(elem) = slot else { continue };
            let id = ElementId(index);
            match elem.category() {
                category::INPUT | category::OUTPUT => {
                    if let Err(err) = self.upstream_of(id) {
                        warnings.push(format!("{}: {err}", elem.name()));
                    }
                    if let Err(err) = self.typed_value(id) {
                        warnings.push(format!("{}: {err}", elem.name()));
                    }
                }
                category::NODEDEF | category::NODEGRAPH | category::MATERIAL
                | category::DOCUMENT => {}
                // Anything else is an operation node, whose category names
                // the operation itself.
                _ => match self.node_def_for(id) {
                    None => {
                        warnings.push(format!(
                            "{}: no nodedef matches category {:?}",
                            elem.name(),
                            elem.category()
                        ));
                    }
                    Some(def) => {
                        // A node's runtime ports must be a subset of the
                        // nodedef's declared ports.
                        for input in self.inputs_of(id) {
                            let Some(input_elem) = self.element(input) else {
                                continue;
                            };
                            if self.child_by_name(def, input_elem.name()).is_none() {
                                warnings.push(format!(
                                    "{}: input {:?} is not declared by its nodedef",
                                    elem.name(),
                                    input_elem.name()
                                ));
                            }
                        }
                    }
                },
            }
        }
        if !warnings.is_empty() {
            tracing::warn!("document {:?}: {} validation warnings", self.name, warnings.len());
        }
        warnings
    }

    /// Serialize to RON text
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON text
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }
}

/// Error raised by document mutation and queries
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Name collides within the parent scope
    #[error("Duplicate name {name:?} under {parent:?}")]
    DuplicateName {
        /// Parent element name
        parent: String,
        /// Colliding child name
        name: String,
    },

    /// Element id points at a removed arena slot
    #[error("Element {0:?} no longer exists")]
    StaleElement(ElementId),

    /// A connection or nodedef reference does not resolve
    #[error("Element {element:?} references unknown {reference:?}")]
    InvalidReference {
        /// Referencing element name
        element: String,
        /// Unresolved reference text
        reference: String,
    },

    /// Value text failed to parse
    #[error(transparent)]
    Value(#[from] ValueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_graph() -> (Document, ElementId, ElementId) {
        let mut doc = Document::new("test");
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng1").unwrap();
        let node = doc.add_child(graph, category::NODE, "image1").unwrap();
        doc.element_mut(node)
            .unwrap()
            .set_attribute(attr::TYPE, "color3");
        let out = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(out).unwrap().set_node_name("image1");
        (doc, graph, node)
    }

    #[test]
    fn test_sibling_names_are_unique() {
        let mut doc = Document::new("test");
        doc.add_child(doc.root(), category::NODE, "a").unwrap();
        assert!(matches!(
            doc.add_child(doc.root(), category::NODE, "a"),
            Err(DocumentError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_output_resolves_to_node() {
        let (doc, graph, node) = doc_with_graph();
        let out = doc.child_by_name(graph, "out").unwrap();
        assert_eq!(doc.upstream_of(out).unwrap(), Some(node));
    }

    #[test]
    fn test_nodegraph_connection_resolves_to_output() {
        let (mut doc, graph, _) = doc_with_graph();
        let material = doc
            .add_child(doc.root(), category::MATERIAL, "mat1")
            .unwrap();
        let input = doc.add_child(material, category::INPUT, "base_color").unwrap();
        doc.element_mut(input).unwrap().set_node_graph("ng1", "out");
        let out = doc.child_by_name(graph, "out").unwrap();
        assert_eq!(doc.upstream_of(input).unwrap(), Some(out));
    }

    #[test]
    fn test_dangling_reference_is_error() {
        let mut doc = Document::new("test");
        let node = doc.add_child(doc.root(), category::NODE, "n").unwrap();
        let input = doc.add_child(node, category::INPUT, "in").unwrap();
        doc.element_mut(input).unwrap().set_node_name("missing");
        assert!(matches!(
            doc.upstream_of(input),
            Err(DocumentError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_remove_child_drops_subtree() {
        let (mut doc, graph, node) = doc_with_graph();
        doc.remove_child(doc.root(), "ng1");
        assert!(doc.element(graph).is_none());
        assert!(doc.element(node).is_none());
    }

    #[test]
    fn test_node_def_resolution_prefers_matching_type() {
        let mut doc = Document::new("test");
        let def_f = doc.add_child(doc.root(), category::NODEDEF, "ND_mult_float").unwrap();
        doc.element_mut(def_f).unwrap().set_attribute(attr::NODE, "multiply");
        doc.element_mut(def_f).unwrap().set_attribute(attr::TYPE, "float");
        let def_c = doc.add_child(doc.root(), category::NODEDEF, "ND_mult_color3").unwrap();
        doc.element_mut(def_c).unwrap().set_attribute(attr::NODE, "multiply");
        doc.element_mut(def_c).unwrap().set_attribute(attr::TYPE, "color3");

        let node = doc.add_child(doc.root(), category::NODE, "m1").unwrap();
        doc.element_mut(node).unwrap().set_category("multiply");
        doc.element_mut(node).unwrap().set_attribute(attr::TYPE, "color3");
        assert_eq!(doc.node_def_for(node), Some(def_c));
    }

    #[test]
    fn test_import_library_shadows_existing() {
        let mut lib = Document::new("lib");
        let def = lib.add_child(lib.root(), category::NODEDEF, "ND_a").unwrap();
        lib.element_mut(def).unwrap().set_attribute(attr::NODE, "a");

        let mut doc = Document::new("doc");
        doc.add_child(doc.root(), category::NODEDEF, "ND_a").unwrap();
        doc.import_library(&lib);
        // Only the pre-existing nodedef remains; the import was shadowed.
        assert_eq!(doc.node_defs().count(), 1);
        let kept = doc.node_defs().next().unwrap();
        assert_eq!(doc.element(kept).unwrap().attribute(attr::NODE), None);
    }

    #[test]
    fn test_validate_flags_undeclared_ports_and_dangling_refs() {
        let mut doc = Document::new("test");
        let def = doc.add_child(doc.root(), category::NODEDEF, "ND_mult").unwrap();
        doc.element_mut(def).unwrap().set_attribute(attr::NODE, "multiply");
        let def_in = doc.add_child(def, category::INPUT, "in1").unwrap();
        doc.element_mut(def_in).unwrap().set_attribute(attr::TYPE, "color3");

        let node = doc.add_child(doc.root(), category::NODE, "m1").unwrap();
        doc.element_mut(node).unwrap().set_category("multiply");
        let bogus = doc.add_child(node, category::INPUT, "bogus").unwrap();
        doc.element_mut(bogus).unwrap().set_node_name("nowhere");

        let warnings = doc.validate();
        assert!(warnings.iter().any(|w| w.contains("bogus")));
        assert!(warnings.iter().any(|w| w.contains("nowhere")));
    }

    #[test]
    fn test_ron_round_trip() {
        let (doc, ..) = doc_with_graph();
        let text = doc.to_ron().unwrap();
        let loaded = Document::from_ron(&text).unwrap();
        assert_eq!(loaded.node_graphs().count(), 1);
        let graph = loaded.node_graph("ng1").unwrap();
        assert!(loaded.child_by_name(graph, "out").is_some());
    }

    #[test]
    fn test_file_prefix_inherits() {
        let (mut doc, graph, node) = doc_with_graph();
        doc.element_mut(graph)
            .unwrap()
            .set_attribute(attr::FILE_PREFIX, "textures/");
        assert_eq!(doc.file_prefix(node), Some("textures/".to_string()));
    }
}
