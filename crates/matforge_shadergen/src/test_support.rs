// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for shader generation tests.

use matforge_document::{attr, category, Document, ElementId};

fn add_node_def(doc: &mut Document, name: &str, node: &str, inputs: &[(&str, &str, &str)]) {
    let def = doc.add_child(doc.root(), category::NODEDEF, name).unwrap();
    doc.element_mut(def).unwrap().set_attribute(attr::NODE, node);
    for (input_name, ty, default) in inputs {
        let input = doc.add_child(def, category::INPUT, *input_name).unwrap();
        let elem = doc.element_mut(input).unwrap();
        elem.set_attribute(attr::TYPE, *ty);
        if !default.is_empty() {
            elem.set_value_string(*default);
        }
    }
}

/// A document seeded with nodedefs for the built-in node set
pub fn simple_library() -> Document {
    let mut doc = Document::new("test");
    add_node_def(&mut doc, "ND_constant", "constant", &[("value", "color3", "0, 0, 0")]);
    add_node_def(
        &mut doc,
        "ND_multiply",
        "multiply",
        &[("in1", "color3", "0, 0, 0"), ("in2", "float", "1")],
    );
    add_node_def(
        &mut doc,
        "ND_add",
        "add",
        &[("in1", "color3", "0, 0, 0"), ("in2", "color3", "0, 0, 0")],
    );
    add_node_def(
        &mut doc,
        "ND_mix",
        "mix",
        &[
            ("fg", "color3", "0, 0, 0"),
            ("bg", "color3", "0, 0, 0"),
            ("mix", "float", "0"),
        ],
    );
    add_node_def(&mut doc, "ND_texcoord", "texcoord", &[("index", "integer", "0")]);
    add_node_def(
        &mut doc,
        "ND_image",
        "image",
        &[("file", "filename", ""), ("texcoord", "vector2", "0, 0")],
    );
    add_node_def(
        &mut doc,
        "ND_geompropvalue",
        "geompropvalue",
        &[("geomprop", "string", "")],
    );
    add_node_def(
        &mut doc,
        "ND_standard_surface",
        "standard_surface",
        &[
            ("base_color", "color3", "0.8, 0.8, 0.8"),
            ("metalness", "float", "0"),
            ("roughness", "float", "0.5"),
            ("emission", "float", "0"),
            ("emission_color", "color3", "1, 1, 1"),
        ],
    );
    doc
}

/// A two-node graph: constant color (1, 0, 0) scaled by 0.5, behind an
/// output. Returns the document and the output element.
pub fn constant_multiply_doc() -> (Document, ElementId) {
    let mut doc = simple_library();
    let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng1").unwrap();

    let color = doc.add_child(graph, "constant", "color1").unwrap();
    doc.element_mut(color).unwrap().set_attribute(attr::TYPE, "color3");
    let value = doc.add_child(color, category::INPUT, "value").unwrap();
    doc.element_mut(value).unwrap().set_attribute(attr::TYPE, "color3");
    doc.element_mut(value).unwrap().set_value_string("1, 0, 0");

    let mult = doc.add_child(graph, "multiply", "mult1").unwrap();
    doc.element_mut(mult).unwrap().set_attribute(attr::TYPE, "color3");
    let in1 = doc.add_child(mult, category::INPUT, "in1").unwrap();
    doc.element_mut(in1).unwrap().set_attribute(attr::TYPE, "color3");
    doc.element_mut(in1).unwrap().set_node_name("color1");
    let in2 = doc.add_child(mult, category::INPUT, "in2").unwrap();
    doc.element_mut(in2).unwrap().set_attribute(attr::TYPE, "float");
    doc.element_mut(in2).unwrap().set_value_string("0.5");

    let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
    doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "color3");
    doc.element_mut(output).unwrap().set_node_name("mult1");
    (doc, output)
}

/// A graph whose root samples a texture through UV coordinates: geometry
/// dependent, so it cannot fold to a constant.
pub fn textured_doc() -> (Document, ElementId) {
    let mut doc = simple_library();
    let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng_tex").unwrap();

    let image = doc.add_child(graph, "image", "diffuse").unwrap();
    doc.element_mut(image).unwrap().set_attribute(attr::TYPE, "color3");
    let file = doc.add_child(image, category::INPUT, "file").unwrap();
    doc.element_mut(file).unwrap().set_attribute(attr::TYPE, "filename");
    doc.element_mut(file).unwrap().set_value_string("diffuse.png");

    let output = doc.add_child(graph, category::OUTPUT, "out").unwrap();
    doc.element_mut(output).unwrap().set_attribute(attr::TYPE, "color3");
    doc.element_mut(output).unwrap().set_node_name("diffuse");
    (doc, output)
}
