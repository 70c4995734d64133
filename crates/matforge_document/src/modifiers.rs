// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document modifier passes applied after load.

use crate::document::Document;
use crate::element::{attr, ElementId};
use indexmap::{IndexMap, IndexSet};

/// Declarative remapping applied over a loaded document.
///
/// Categories, names and attribute values matching a remap key are
/// rewritten; children matching a skip key are removed; scopes carrying a
/// file prefix get the terminator appended when missing. After the tree
/// pass, shader nodes whose nodedef has no implementation are remapped to a
/// matching nodedef that has one.
#[derive(Debug, Clone, Default)]
pub struct DocumentModifiers {
    /// Category/name/attribute-value remapping table
    pub remap_elements: IndexMap<String, String>,
    /// Categories or names of children to remove
    pub skip_elements: IndexSet<String>,
    /// Suffix enforced on every file prefix, e.g. "/"
    pub file_prefix_terminator: String,
}

impl DocumentModifiers {
    /// Apply this modifier set to a document
    pub fn apply(&self, doc: &mut Document) {
        let ids: Vec<ElementId> = doc.traverse_tree(doc.root()).map(|(id, _)| id).collect();
        for id in ids {
            self.apply_to_element(doc, id);
        }
        self.remap_unimplemented_shaders(doc);
    }

    fn apply_to_element(&self, doc: &mut Document, id: ElementId) {
        let Some(elem) = doc.element(id) else { return };

        if let Some(remapped) = self.remap_elements.get(elem.category()) {
            let remapped = remapped.clone();
            if let Some(elem) = doc.element_mut(id) {
                elem.set_category(remapped);
            }
        }
        if let Some(elem) = doc.element(id) {
            if let Some(remapped) = self.remap_elements.get(elem.name()) {
                let _ = doc.rename(id, remapped.clone());
            }
        }

        let Some(elem) = doc.element(id) else { return };
        let remaps: Vec<(String, String)> = elem
            .attribute_names()
            .filter_map(|name| {
                let value = elem.attribute(name)?;
                self.remap_elements
                    .get(value)
                    .map(|new| (name.to_string(), new.clone()))
            })
            .collect();
        let prefix = elem.attribute(attr::FILE_PREFIX).map(str::to_string);
        if let Some(elem) = doc.element_mut(id) {
            for (name, value) in remaps {
                elem.set_attribute(name, value);
            }
            if let Some(prefix) = prefix {
                if !self.file_prefix_terminator.is_empty()
                    && !prefix.ends_with(&self.file_prefix_terminator)
                {
                    elem.set_attribute(
                        attr::FILE_PREFIX,
                        format!("{prefix}{}", self.file_prefix_terminator),
                    );
                }
            }
        }

        let skipped: Vec<String> = doc
            .element(id)
            .map(|elem| {
                elem.children()
                    .iter()
                    .filter_map(|&child| doc.element(child))
                    .filter(|child| {
                        self.skip_elements.contains(child.category())
                            || self.skip_elements.contains(child.name())
                    })
                    .map(|child| child.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        for name in skipped {
            doc.remove_child(id, &name);
        }
    }

    /// Point shader nodes at an alternative nodedef when theirs has no
    /// implementation.
    fn remap_unimplemented_shaders(&self, doc: &mut Document) {
        let materials: Vec<ElementId> = doc.materials().collect();
        for material in materials {
            for shader in doc.shader_nodes(material) {
                let Some(def) = doc.node_def_for(shader) else {
                    continue;
                };
                if doc.implementation_of(def).is_some() {
                    continue;
                }
                let Some(node_string) = doc
                    .element(def)
                    .and_then(|d| d.attribute(attr::NODE))
                    .map(str::to_string)
                else {
                    continue;
                };
                let alternative = doc
                    .matching_node_defs(&node_string)
                    .find(|&alt| doc.implementation_of(alt).is_some());
                if let Some(alt) = alternative {
                    let alt_name = doc
                        .element(alt)
                        .map(|e| e.name().to_string())
                        .unwrap_or_default();
                    tracing::debug!("remapping shader nodedef to {alt_name}");
                    if let Some(shader_elem) = doc.element_mut(shader) {
                        shader_elem.set_attribute(attr::NODE_DEF, alt_name);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::category;

    #[test]
    fn test_category_and_attribute_remap() {
        let mut doc = Document::new("test");
        let node = doc.add_child(doc.root(), category::NODE, "tex").unwrap();
        doc.element_mut(node).unwrap().set_category("texture2d");
        doc.element_mut(node)
            .unwrap()
            .set_attribute("kind", "texture2d");

        let mut modifiers = DocumentModifiers::default();
        modifiers
            .remap_elements
            .insert("texture2d".to_string(), "image".to_string());
        modifiers.apply(&mut doc);

        let elem = doc.element(node).unwrap();
        assert_eq!(elem.category(), "image");
        assert_eq!(elem.attribute("kind"), Some("image"));
    }

    #[test]
    fn test_skip_elements_removes_children() {
        let mut doc = Document::new("test");
        doc.add_child(doc.root(), "look", "look1").unwrap();
        doc.add_child(doc.root(), category::NODE, "keep").unwrap();

        let mut modifiers = DocumentModifiers::default();
        modifiers.skip_elements.insert("look".to_string());
        modifiers.apply(&mut doc);

        assert!(doc.child_by_name(doc.root(), "look1").is_none());
        assert!(doc.child_by_name(doc.root(), "keep").is_some());
    }

    #[test]
    fn test_file_prefix_terminator_appended_once() {
        let mut doc = Document::new("test");
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        doc.element_mut(graph)
            .unwrap()
            .set_attribute(attr::FILE_PREFIX, "textures");

        let modifiers = DocumentModifiers {
            file_prefix_terminator: "/".to_string(),
            ..Default::default()
        };
        modifiers.apply(&mut doc);
        assert_eq!(
            doc.element(graph).unwrap().attribute(attr::FILE_PREFIX),
            Some("textures/")
        );

        modifiers.apply(&mut doc);
        assert_eq!(
            doc.element(graph).unwrap().attribute(attr::FILE_PREFIX),
            Some("textures/")
        );
    }

    #[test]
    fn test_unimplemented_shader_nodedef_remap() {
        let mut doc = Document::new("test");
        let bare = doc
            .add_child(doc.root(), category::NODEDEF, "ND_surface_bare")
            .unwrap();
        doc.element_mut(bare)
            .unwrap()
            .set_attribute(attr::NODE, "standard_surface");
        let implemented = doc
            .add_child(doc.root(), category::NODEDEF, "ND_surface_impl")
            .unwrap();
        doc.element_mut(implemented)
            .unwrap()
            .set_attribute(attr::NODE, "standard_surface");
        doc.element_mut(implemented)
            .unwrap()
            .set_attribute(attr::IMPLEMENTATION, "IM_surface_glsl");

        let shader = doc.add_child(doc.root(), category::NODE, "surf1").unwrap();
        doc.element_mut(shader).unwrap().set_category("standard_surface");
        doc.element_mut(shader)
            .unwrap()
            .set_attribute(attr::NODE_DEF, "ND_surface_bare");
        let material = doc
            .add_child(doc.root(), category::MATERIAL, "mat1")
            .unwrap();
        let input = doc
            .add_child(material, category::INPUT, "surfaceshader")
            .unwrap();
        doc.element_mut(input).unwrap().set_node_name("surf1");

        DocumentModifiers::default().apply(&mut doc);
        assert_eq!(
            doc.element(shader).unwrap().attribute(attr::NODE_DEF),
            Some("ND_surface_impl")
        );
    }
}
