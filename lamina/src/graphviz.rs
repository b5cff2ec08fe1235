// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Export of render expression graphs in the Graphviz `dot` language.
//!
//! ```text
//! dot -Tsvg graph.dot > graph.svg
//! ```

use std::fmt::Write as _;
use std::io;

use crate::rendexpr::graph::RenderGraph;
use crate::rendexpr::{Node, Rendexpr};

/// Layer ids longer than this are shortened in node labels.
const MAX_LAYER_ID_LEN: usize = 12;
const SHORTENED_LAYER_ID_LEN: usize = 8;

/// Render the graph below `root` as a `dot` digraph.
///
/// Nodes appear in breadth-first order, labelled with their kind, the id of the layer they draw
/// and their breadth-first index. Edges carry the name of the child slot they come from.
pub fn to_dot(root: Option<&Rendexpr>) -> String {
    let graph = RenderGraph::new(root.cloned());
    let mut out = String::from("digraph rendexpr {\n");
    out.push_str("  node [shape=box, fontname=\"monospace\"];\n");
    for (index, node) in graph.nodes().iter().enumerate() {
        let _ = writeln!(
            out,
            "  {} [label=\"{}\"];",
            name(node),
            escape(&label(node, index))
        );
    }
    for node in graph.nodes() {
        for (slot, child) in node.children() {
            let Some(child) = child else { continue };
            let _ = writeln!(out, "  {} -> {} [label=\"{slot}\"];", name(node), name(child));
        }
    }
    out.push_str("}\n");
    out
}

/// Write [`to_dot`] output to `writer`.
pub fn write_dot(root: Option<&Rendexpr>, mut writer: impl io::Write) -> io::Result<()> {
    writer.write_all(to_dot(root).as_bytes())
}

fn name(node: &Rendexpr) -> String {
    format!("E{:x}", std::sync::Arc::as_ptr(node) as usize)
}

fn label(node: &Node, index: usize) -> String {
    let mut label = node.short_name().to_owned();
    if let Some(layer) = node.layer() {
        label.push(' ');
        label.push_str(&shorten(&layer.id));
    }
    match node {
        Node::DrawLayerStroke { index: i, .. }
        | Node::DrawLayerFill { index: i, .. }
        | Node::DrawLayerStrokeFill { index: i, .. }
        | Node::DrawLayerEffect { index: i, .. } => {
            let _ = write!(label, "#{i}");
        }
        _ => {}
    }
    let _ = write!(label, " [{index}]");
    label
}

fn shorten(id: &str) -> String {
    if id.chars().count() > MAX_LAYER_ID_LEN {
        let mut short: String = id.chars().take(SHORTENED_LAYER_ID_LEN).collect();
        short.push_str("...");
        short
    } else {
        id.to_owned()
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
