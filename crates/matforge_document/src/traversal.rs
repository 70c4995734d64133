// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tree and dependency-graph traversal.
//!
//! Both iterators are explicit cursor objects: single-pass, forward-only,
//! restartable by obtaining a fresh iterator from the same root. Advancing
//! past the end keeps returning `None`.

use crate::document::{Document, DocumentError};
use crate::element::{category, Element, ElementId};
use std::collections::HashSet;

/// One traversed dependency link.
///
/// Transient and non-owning; never persisted. Two edges are equal iff all
/// three element references are equal, and the derived ordering is a total
/// order over the tuple for use in deduplication sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    /// Element consuming the dependency
    pub downstream: ElementId,
    /// Port element carrying the connection, when one exists
    pub connecting: Option<ElementId>,
    /// Element producing the dependency
    pub upstream: ElementId,
}

/// Error raised during dependency traversal
#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    /// The dependency graph loops back on itself
    #[error("Cyclic connection through {element:?}")]
    CyclicGraph {
        /// Name of the element closing the cycle
        element: String,
    },

    /// A connection failed to resolve mid-walk
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Depth-first iterator over an element subtree.
///
/// Yields `(element, depth)` pairs, the root at depth 0. Calling
/// [`TreeIterator::set_prune_subtree`] skips the children of the most
/// recently yielded element on the next advance.
pub struct TreeIterator<'a> {
    doc: &'a Document,
    root: ElementId,
    stack: Vec<(ElementId, usize)>,
    prune: bool,
    started: bool,
}

impl<'a> TreeIterator<'a> {
    /// Begin a traversal rooted at the given element
    pub fn new(doc: &'a Document, root: ElementId) -> Self {
        Self {
            doc,
            root,
            stack: Vec::new(),
            prune: false,
            started: false,
        }
    }

    /// Skip the current element's subtree on the next advance
    pub fn set_prune_subtree(&mut self, prune: bool) {
        self.prune = prune;
    }

    /// Whether the current subtree is marked for pruning
    pub fn prune_subtree(&self) -> bool {
        self.prune
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = (ElementId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.doc.element(self.root)?;
            self.stack.push((self.root, 0));
            return Some((self.root, 0));
        }
        if self.prune {
            self.prune = false;
            self.stack.pop();
        }
        loop {
            let (id, index) = self.stack.last_mut()?;
            let children = self
                .doc
                .element(*id)
                .map(Element::children)
                .unwrap_or(&[]);
            if *index < children.len() {
                let child = children[*index];
                *index += 1;
                self.stack.push((child, 0));
                return Some((child, self.stack.len() - 1));
            }
            self.stack.pop();
        }
    }
}

/// Depth-first iterator over upstream dependency edges.
///
/// Walks from a root port or node toward its producers, yielding one
/// [`Edge`] per connection. Upstream subgraphs already walked are not
/// expanded again, and a connection looping back onto the active path
/// terminates the walk with [`TraversalError::CyclicGraph`].
pub struct GraphIterator<'a> {
    doc: &'a Document,
    stack: Vec<Frame>,
    /// Active downstream chain, for cycle detection
    path: Vec<ElementId>,
    /// Upstream elements whose dependencies were already expanded
    visited: HashSet<ElementId>,
    /// Upstream of the last yielded edge, expanded on the next advance
    pending: Option<ElementId>,
    /// Resolution failure discovered while seeding the walk
    pending_error: Option<TraversalError>,
    prune: bool,
    done: bool,
}

struct Frame {
    element: ElementId,
    ports: Vec<(Option<ElementId>, ElementId)>,
    index: usize,
}

impl<'a> GraphIterator<'a> {
    /// Begin an upstream walk rooted at the given element
    pub fn new(doc: &'a Document, root: ElementId) -> Self {
        let mut iter = Self {
            doc,
            stack: Vec::new(),
            path: vec![root],
            visited: HashSet::new(),
            pending: None,
            pending_error: None,
            prune: false,
            done: false,
        };
        match upstream_ports(doc, root) {
            Ok(ports) => iter.stack.push(Frame {
                element: root,
                ports,
                index: 0,
            }),
            Err(err) => iter.pending_error = Some(err.into()),
        }
        iter
    }

    /// Skip the upstream subgraph of the last yielded edge on the next advance
    pub fn set_prune_subgraph(&mut self, prune: bool) {
        self.prune = prune;
    }

    /// Whether the pending subgraph is marked for pruning
    pub fn prune_subgraph(&self) -> bool {
        self.prune
    }

    fn element_name(&self, id: ElementId) -> String {
        self.doc
            .element(id)
            .map(|e| e.name().to_string())
            .unwrap_or_default()
    }
}

/// Connected upstream ports of an element: `(connecting, upstream)` pairs.
fn upstream_ports(
    doc: &Document,
    element: ElementId,
) -> Result<Vec<(Option<ElementId>, ElementId)>, DocumentError> {
    let Some(elem) = doc.element(element) else {
        return Ok(Vec::new());
    };
    let mut ports = Vec::new();
    match elem.category() {
        category::INPUT | category::OUTPUT => {
            if let Some(upstream) = doc.upstream_of(element)? {
                ports.push((None, upstream));
            }
        }
        category::NODEGRAPH => {
            for output in doc.outputs_of(element) {
                if let Some(upstream) = doc.upstream_of(output)? {
                    ports.push((Some(output), upstream));
                }
            }
        }
        _ => {
            for input in doc.inputs_of(element) {
                if let Some(upstream) = doc.upstream_of(input)? {
                    ports.push((Some(input), upstream));
                }
            }
        }
    }
    Ok(ports)
}

impl Iterator for GraphIterator<'_> {
    type Item = Result<Edge, TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            self.done = true;
            return Some(Err(err));
        }
        if let Some(upstream) = self.pending.take() {
            let expand = !self.prune && !self.visited.contains(&upstream);
            self.prune = false;
            if expand {
                self.visited.insert(upstream);
                match upstream_ports(self.doc, upstream) {
                    Ok(ports) => {
                        self.path.push(upstream);
                        self.stack.push(Frame {
                            element: upstream,
                            ports,
                            index: 0,
                        });
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                }
            }
        }
        loop {
            let frame = self.stack.last_mut()?;
            if frame.index >= frame.ports.len() {
                self.stack.pop();
                self.path.pop();
                if self.stack.is_empty() {
                    self.done = true;
                    return None;
                }
                continue;
            }
            let (connecting, upstream) = frame.ports[frame.index];
            frame.index += 1;
            let downstream = frame.element;
            if self.path.contains(&upstream) {
                self.done = true;
                return Some(Err(TraversalError::CyclicGraph {
                    element: self.element_name(upstream),
                }));
            }
            self.pending = Some(upstream);
            return Some(Ok(Edge {
                downstream,
                connecting,
                upstream,
            }));
        }
    }
}

impl Document {
    /// Depth-first traversal of the subtree rooted at `root`
    pub fn traverse_tree(&self, root: ElementId) -> TreeIterator<'_> {
        TreeIterator::new(self, root)
    }

    /// Depth-first traversal of upstream dependencies of `root`
    pub fn traverse_graph(&self, root: ElementId) -> GraphIterator<'_> {
        GraphIterator::new(self, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::attr;

    fn chain_doc() -> (Document, ElementId) {
        // out -> multiply -> image
        let mut doc = Document::new("test");
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let image = doc.add_child(graph, category::NODE, "image1").unwrap();
        doc.element_mut(image).unwrap().set_category("image");
        let mult = doc.add_child(graph, category::NODE, "mult1").unwrap();
        doc.element_mut(mult).unwrap().set_category("multiply");
        let mult_in = doc.add_child(mult, category::INPUT, "in1").unwrap();
        doc.element_mut(mult_in).unwrap().set_node_name("image1");
        let out = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(out).unwrap().set_node_name("mult1");
        (doc, graph)
    }

    #[test]
    fn test_tree_iterator_depth_first() {
        let (doc, graph) = chain_doc();
        let names: Vec<(String, usize)> = doc
            .traverse_tree(graph)
            .map(|(id, depth)| (doc.element(id).unwrap().name().to_string(), depth))
            .collect();
        assert_eq!(
            names,
            [
                ("ng".to_string(), 0),
                ("image1".to_string(), 1),
                ("mult1".to_string(), 1),
                ("in1".to_string(), 2),
                ("out".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_tree_iterator_prune_skips_children() {
        let (doc, graph) = chain_doc();
        let mut iter = doc.traverse_tree(graph);
        let mut names = Vec::new();
        while let Some((id, _)) = iter.next() {
            let name = doc.element(id).unwrap().name().to_string();
            if name == "mult1" {
                iter.set_prune_subtree(true);
            }
            names.push(name);
        }
        assert_eq!(names, ["ng", "image1", "mult1", "out"]);
    }

    #[test]
    fn test_tree_iterator_exhaustion_is_idempotent() {
        let (doc, graph) = chain_doc();
        let mut iter = doc.traverse_tree(graph);
        while iter.next().is_some() {}
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_graph_iterator_walks_upstream() {
        let (doc, graph) = chain_doc();
        let out = doc.child_by_name(graph, "out").unwrap();
        let edges: Vec<Edge> = doc
            .traverse_graph(out)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(edges.len(), 2);
        let mult = doc.child_by_name(graph, "mult1").unwrap();
        let image = doc.child_by_name(graph, "image1").unwrap();
        assert_eq!(edges[0].downstream, out);
        assert_eq!(edges[0].upstream, mult);
        assert_eq!(edges[1].downstream, mult);
        assert_eq!(edges[1].upstream, image);
        assert_eq!(edges[1].connecting, doc.child_by_name(mult, "in1"));
    }

    #[test]
    fn test_graph_iterator_detects_cycle() {
        let mut doc = Document::new("test");
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let a = doc.add_child(graph, category::NODE, "a").unwrap();
        let b = doc.add_child(graph, category::NODE, "b").unwrap();
        let a_in = doc.add_child(a, category::INPUT, "in").unwrap();
        doc.element_mut(a_in).unwrap().set_node_name("b");
        let b_in = doc.add_child(b, category::INPUT, "in").unwrap();
        doc.element_mut(b_in).unwrap().set_node_name("a");
        let out = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(out).unwrap().set_node_name("a");

        let result: Result<Vec<Edge>, TraversalError> = doc.traverse_graph(out).collect();
        assert!(matches!(result, Err(TraversalError::CyclicGraph { .. })));
    }

    #[test]
    fn test_graph_iterator_prune_subgraph() {
        let (doc, graph) = chain_doc();
        let out = doc.child_by_name(graph, "out").unwrap();
        let mut iter = doc.traverse_graph(out);
        // Prune after the first edge; the image node is never reached.
        let first = iter.next().unwrap().unwrap();
        let mult = doc.child_by_name(graph, "mult1").unwrap();
        assert_eq!(first.upstream, mult);
        iter.set_prune_subgraph(true);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // out -> mix, mix.fg -> image, mix.bg -> image
        let mut doc = Document::new("test");
        let graph = doc.add_child(doc.root(), category::NODEGRAPH, "ng").unwrap();
        let image = doc.add_child(graph, category::NODE, "image1").unwrap();
        doc.element_mut(image).unwrap().set_category("image");
        let mix = doc.add_child(graph, category::NODE, "mix1").unwrap();
        for port in ["fg", "bg"] {
            let input = doc.add_child(mix, category::INPUT, port).unwrap();
            doc.element_mut(input).unwrap().set_node_name("image1");
        }
        let out = doc.add_child(graph, category::OUTPUT, "out").unwrap();
        doc.element_mut(out).unwrap().set_node_name("mix1");

        let edges: Vec<Edge> = doc
            .traverse_graph(out)
            .collect::<Result<_, _>>()
            .unwrap();
        // out->mix, mix->image (fg), mix->image (bg); the image subgraph is
        // expanded once.
        assert_eq!(edges.len(), 3);
        let unique: std::collections::BTreeSet<Edge> = edges.iter().copied().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_edge_ordering_is_total() {
        let (doc, graph) = chain_doc();
        let out = doc.child_by_name(graph, "out").unwrap();
        let mut edges: Vec<Edge> = doc
            .traverse_graph(out)
            .collect::<Result<_, _>>()
            .unwrap();
        let copy = edges.clone();
        edges.sort();
        edges.dedup();
        assert_eq!(edges.len(), copy.len());
    }
}
