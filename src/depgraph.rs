//! The string-operation dependency graph.
//!
//! Nodes describe how an untrusted input flows through string operations to
//! a sink. The graph is produced upstream by a taint analyzer; this module
//! holds the in-memory form the evaluator walks, plus a loader for the plain
//! text exchange format.
//!
//! # Text format
//!
//! One declaration per line; `#` starts a comment. Nodes first, then edges.
//! Edge order determines argument order of the target operation.
//!
//! ```text
//! node 0 uninit x
//! node 1 op htmlspecialchars ENT_QUOTES
//! node 2 sink
//! edge 0 1
//! edge 1 2
//! ```
//!
//! Literals are double-quoted with `\"`, `\\`, `\n`, `\r`, `\t` and `\xHH`
//! escapes: `node 3 literal "a\x00b"`.

use std::collections::HashMap;

use crate::error::{AnalysisError, Result};
use crate::transducer::HtmlSpecialCharsMode;

pub type NodeId = usize;

/// A string operation a graph node may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringOp {
    /// Concatenation of all arguments in order.
    Concat,
    /// PHP `str_replace(search, replacement, subject)`; the three arguments
    /// arrive in that order.
    Replace,
    HtmlSpecialChars(HtmlSpecialCharsMode),
    EscapeHtmlTags,
    EncodeUriComponent,
    AddSlashes,
    ToLowerCase,
    ToUpperCase,
    Trim,
    Substring { start: usize, len: Option<usize> },
    /// Restriction to the strings matching a regex (full-match extraction).
    RegexMatch { pattern: String },
    /// A sanitizer the evaluator has no model for. Kept so the graph loads;
    /// evaluation aborts with `UnsupportedOperation`.
    Custom(String),
}

impl StringOp {
    /// Number of arguments the operation requires, if fixed.
    fn arity(&self) -> Option<usize> {
        match self {
            StringOp::Concat => None, // two or more
            StringOp::Replace => Some(3),
            _ => Some(1),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StringOp::Concat => "concat",
            StringOp::Replace => "replace",
            StringOp::HtmlSpecialChars(_) => "htmlspecialchars",
            StringOp::EscapeHtmlTags => "escape_html_tags",
            StringOp::EncodeUriComponent => "encodeuricomponent",
            StringOp::AddSlashes => "addslashes",
            StringOp::ToLowerCase => "strtolower",
            StringOp::ToUpperCase => "strtoupper",
            StringOp::Trim => "trim",
            StringOp::Substring { .. } => "substr",
            StringOp::RegexMatch { .. } => "match",
            StringOp::Custom(name) => name,
        }
    }
}

/// What a graph node denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An untrusted input position for a named field.
    Uninit { field: String },
    /// A constant string.
    Literal { value: Vec<u8> },
    /// A program variable: the join of everything assigned to it. Cycles in
    /// the graph (loop-carried assignments) always pass through one of
    /// these.
    Var { name: String },
    /// A string operation applied to the argument nodes.
    Op(StringOp),
    /// The observable output.
    Sink,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Ordered argument nodes (predecessors).
    pub args: Vec<NodeId>,
}

/// A validated dependency graph.
#[derive(Debug, Clone)]
pub struct DepGraph {
    nodes: Vec<Node>,
    successors: Vec<Vec<NodeId>>,
}

/// Mutable graph under construction; [`DepGraphBuilder::build`] validates.
#[derive(Debug, Default)]
pub struct DepGraphBuilder {
    nodes: Vec<Node>,
}

impl DepGraphBuilder {
    pub fn new() -> Self {
        DepGraphBuilder::default()
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            kind,
            args: Vec::new(),
        });
        id
    }

    pub fn uninit(&mut self, field: impl Into<String>) -> NodeId {
        self.add_node(NodeKind::Uninit { field: field.into() })
    }

    pub fn literal(&mut self, value: impl Into<Vec<u8>>) -> NodeId {
        self.add_node(NodeKind::Literal { value: value.into() })
    }

    pub fn var(&mut self, name: impl Into<String>, args: impl Into<Vec<NodeId>>) -> NodeId {
        let id = self.add_node(NodeKind::Var { name: name.into() });
        self.nodes[id].args = args.into();
        id
    }

    pub fn op(&mut self, op: StringOp, args: impl Into<Vec<NodeId>>) -> NodeId {
        let id = self.add_node(NodeKind::Op(op));
        self.nodes[id].args = args.into();
        id
    }

    pub fn sink(&mut self, arg: NodeId) -> NodeId {
        let id = self.add_node(NodeKind::Sink);
        self.nodes[id].args = vec![arg];
        id
    }

    /// Appends an argument edge `from -> to`.
    pub fn edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[to].args.push(from);
    }

    pub fn build(self) -> Result<DepGraph> {
        let n = self.nodes.len();
        let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        let mut sinks = 0usize;

        for node in &self.nodes {
            for &arg in &node.args {
                if arg >= n {
                    return Err(AnalysisError::GraphInconsistent(format!(
                        "node {} references missing node {}",
                        node.id, arg
                    )));
                }
                successors[arg].push(node.id);
            }
            match &node.kind {
                NodeKind::Uninit { .. } | NodeKind::Literal { .. } => {
                    if !node.args.is_empty() {
                        return Err(AnalysisError::GraphInconsistent(format!(
                            "source node {} must not have arguments",
                            node.id
                        )));
                    }
                }
                NodeKind::Var { name } => {
                    if node.args.is_empty() {
                        return Err(AnalysisError::GraphInconsistent(format!(
                            "variable node {} ({:?}) has no incoming edge",
                            node.id, name
                        )));
                    }
                }
                NodeKind::Op(op) => {
                    match op.arity() {
                        Some(arity) if node.args.len() != arity => {
                            return Err(AnalysisError::GraphInconsistent(format!(
                                "operation {} at node {} takes {} arguments, got {}",
                                op.name(),
                                node.id,
                                arity,
                                node.args.len()
                            )));
                        }
                        None if node.args.len() < 2 => {
                            return Err(AnalysisError::GraphInconsistent(format!(
                                "operation {} at node {} takes at least 2 arguments, got {}",
                                op.name(),
                                node.id,
                                node.args.len()
                            )));
                        }
                        _ => {}
                    }
                }
                NodeKind::Sink => {
                    sinks += 1;
                    if node.args.is_empty() {
                        return Err(AnalysisError::GraphInconsistent(format!(
                            "sink node {} has no incoming edge",
                            node.id
                        )));
                    }
                }
            }
        }

        if sinks != 1 {
            return Err(AnalysisError::GraphInconsistent(format!(
                "expected exactly one sink node, found {}",
                sinks
            )));
        }

        Ok(DepGraph {
            nodes: self.nodes,
            successors,
        })
    }
}

impl DepGraph {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Argument nodes, in operation order.
    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].args
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.successors[id]
    }

    pub fn sink(&self) -> NodeId {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Sink))
            .map(|n| n.id)
            .expect("validated graph has a sink")
    }

    /// The uninit node for a field, if the graph has one.
    pub fn uninit_for_field(&self, field: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| matches!(&n.kind, NodeKind::Uninit { field: f } if f == field))
            .map(|n| n.id)
    }

    /// Reverse post-order over the dataflow direction: arguments before
    /// consumers where possible. The forward worklist seed.
    pub fn reverse_post_order(&self) -> Vec<NodeId> {
        let mut order = self.post_order();
        order.reverse();
        order
    }

    /// Post-order of a depth-first walk along dataflow edges: everything
    /// downstream of a node comes before it. The backward worklist seed.
    pub fn post_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut state = vec![0u8; n]; // 0 unvisited, 1 on stack, 2 done
        let mut order = Vec::with_capacity(n);

        for root in 0..n {
            if state[root] != 0 {
                continue;
            }
            // Iterative DFS along successor edges.
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            state[root] = 1;
            while let Some(&(node, next)) = stack.last() {
                let succs = &self.successors[node];
                if next < succs.len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let succ = succs[next];
                    if state[succ] == 0 {
                        state[succ] = 1;
                        stack.push((succ, 0));
                    }
                } else {
                    state[node] = 2;
                    order.push(node);
                    stack.pop();
                }
            }
        }
        order
    }
}

// ---------------------------------------------------------------------------
// Text format
// ---------------------------------------------------------------------------

/// Parses the plain text dependency-graph format.
pub fn parse(text: &str) -> Result<DepGraph> {
    let mut builder = DepGraphBuilder::new();
    // Declared ids may be sparse or out of order; remap to dense ids.
    let mut ids: HashMap<usize, NodeId> = HashMap::new();
    let mut edges: Vec<(usize, usize, usize)> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        let bad = |msg: &str| AnalysisError::GraphInconsistent(format!("line {}: {}", lineno, msg));

        match words.next() {
            Some("node") => {
                let id: usize = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| bad("expected a node id"))?;
                if ids.contains_key(&id) {
                    return Err(bad(&format!("duplicate node id {}", id)));
                }
                let kind = words.next().ok_or_else(|| bad("expected a node kind"))?;
                let node = match kind {
                    "uninit" => {
                        let field = words.next().ok_or_else(|| bad("uninit needs a field name"))?;
                        builder.uninit(field)
                    }
                    "literal" => {
                        let rest = line
                            .split_once("literal")
                            .map(|(_, r)| r.trim())
                            .ok_or_else(|| bad("literal needs a quoted value"))?;
                        builder.literal(parse_quoted(rest).map_err(|m| bad(&m))?)
                    }
                    "var" => {
                        let name = words.next().ok_or_else(|| bad("var needs a name"))?;
                        builder.var(name, Vec::new())
                    }
                    "op" => {
                        let name = words.next().ok_or_else(|| bad("op needs a name"))?;
                        let params: Vec<&str> = words.collect();
                        builder.op(parse_op(name, &params).map_err(|m| bad(&m))?, Vec::new())
                    }
                    "sink" => builder.add_node(NodeKind::Sink),
                    other => return Err(bad(&format!("unknown node kind {:?}", other))),
                };
                ids.insert(id, node);
            }
            Some("edge") => {
                let from: usize = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| bad("expected an edge source"))?;
                let to: usize = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| bad("expected an edge target"))?;
                edges.push((lineno, from, to));
            }
            Some(other) => {
                return Err(bad(&format!("unknown declaration {:?}", other)));
            }
            None => {}
        }
    }

    for (lineno, from, to) in edges {
        let bad = |msg: String| AnalysisError::GraphInconsistent(format!("line {}: {}", lineno, msg));
        let &from = ids.get(&from).ok_or_else(|| bad(format!("edge from undeclared node {}", from)))?;
        let &to = ids.get(&to).ok_or_else(|| bad(format!("edge to undeclared node {}", to)))?;
        builder.edge(from, to);
    }

    builder.build()
}

fn parse_op(name: &str, params: &[&str]) -> std::result::Result<StringOp, String> {
    match name {
        "concat" => Ok(StringOp::Concat),
        "replace" | "str_replace" => Ok(StringOp::Replace),
        "htmlspecialchars" => {
            let mode = match params.first().copied().unwrap_or("ENT_COMPAT") {
                "ENT_NOQUOTES" => HtmlSpecialCharsMode::NoQuotes,
                "ENT_COMPAT" => HtmlSpecialCharsMode::Compat,
                "ENT_QUOTES" => HtmlSpecialCharsMode::Quotes,
                "ENT_SLASH" => HtmlSpecialCharsMode::Slash,
                other => return Err(format!("unknown htmlspecialchars mode {:?}", other)),
            };
            Ok(StringOp::HtmlSpecialChars(mode))
        }
        "escape_html_tags" => Ok(StringOp::EscapeHtmlTags),
        "encodeuricomponent" | "encodeURIComponent" => Ok(StringOp::EncodeUriComponent),
        "addslashes" => Ok(StringOp::AddSlashes),
        "strtolower" | "tolower" => Ok(StringOp::ToLowerCase),
        "strtoupper" | "toupper" => Ok(StringOp::ToUpperCase),
        "trim" => Ok(StringOp::Trim),
        "substr" => {
            let start = params
                .first()
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| "substr needs a start offset".to_string())?;
            let len = match params.get(1) {
                None => None,
                Some(w) => Some(w.parse().map_err(|_| format!("bad substr length {:?}", w))?),
            };
            Ok(StringOp::Substring { start, len })
        }
        "match" | "preg_match" => {
            let pattern = params.first().ok_or_else(|| "match needs a pattern".to_string())?;
            Ok(StringOp::RegexMatch {
                pattern: (*pattern).to_string(),
            })
        }
        other => Ok(StringOp::Custom(other.to_string())),
    }
}

fn parse_quoted(text: &str) -> std::result::Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'"' || bytes[bytes.len() - 1] != b'"' {
        return Err("literal value must be double-quoted".to_string());
    }
    let inner = &bytes[1..bytes.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        if c != b'\\' {
            out.push(c);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = inner.get(i) else {
            return Err("dangling backslash in literal".to_string());
        };
        i += 1;
        match esc {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'x' => {
                let hex = inner
                    .get(i..i + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| "bad \\x escape in literal".to_string())?;
                out.push(hex);
                i += 2;
            }
            other => return Err(format!("unknown escape '\\{}' in literal", other as char)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_simple() {
        let mut b = DepGraphBuilder::new();
        let x = b.uninit("x");
        let enc = b.op(StringOp::HtmlSpecialChars(HtmlSpecialCharsMode::Quotes), [x]);
        let sink = b.sink(enc);
        let g = b.build().expect("valid graph");

        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.sink(), sink);
        assert_eq!(g.uninit_for_field("x"), Some(x));
        assert_eq!(g.uninit_for_field("y"), None);
        assert_eq!(g.predecessors(enc), &[x]);
        assert_eq!(g.successors(x), &[enc]);
    }

    #[test]
    fn test_orders() {
        let mut b = DepGraphBuilder::new();
        let x = b.uninit("x");
        let lit = b.literal(*b"-");
        let cat = b.op(StringOp::Concat, [x, lit]);
        let sink = b.sink(cat);
        let g = b.build().expect("valid graph");

        let rpo = g.reverse_post_order();
        let pos = |id: NodeId| rpo.iter().position(|&n| n == id).expect("in order");
        // Arguments come before consumers.
        assert!(pos(x) < pos(cat));
        assert!(pos(lit) < pos(cat));
        assert!(pos(cat) < pos(sink));
    }

    #[test]
    fn test_validation_errors() {
        // Dangling edge target.
        let mut b = DepGraphBuilder::new();
        let x = b.uninit("x");
        let sink = b.sink(x);
        b.nodes[sink].args.push(99);
        assert!(matches!(b.build(), Err(AnalysisError::GraphInconsistent(_))));

        // No sink.
        let mut b = DepGraphBuilder::new();
        b.uninit("x");
        assert!(matches!(b.build(), Err(AnalysisError::GraphInconsistent(_))));

        // Wrong arity.
        let mut b = DepGraphBuilder::new();
        let x = b.uninit("x");
        let bad = b.op(StringOp::Replace, [x]);
        b.sink(bad);
        assert!(matches!(b.build(), Err(AnalysisError::GraphInconsistent(_))));
    }

    #[test]
    fn test_parse_round_trip() {
        let text = r#"
            # a sanitized flow
            node 0 uninit x
            node 1 op htmlspecialchars ENT_QUOTES
            node 2 sink
            edge 0 1
            edge 1 2
        "#;
        let g = parse(text).expect("parses");
        assert_eq!(g.num_nodes(), 3);
        let x = g.uninit_for_field("x").expect("has x");
        assert_eq!(
            g.node(g.successors(x)[0]).kind,
            NodeKind::Op(StringOp::HtmlSpecialChars(HtmlSpecialCharsMode::Quotes))
        );
    }

    #[test]
    fn test_parse_literal_escapes() {
        let text = r#"
            node 0 uninit x
            node 1 literal "a\"b\\c\n\x00"
            node 2 op concat
            node 3 sink
            edge 0 2
            edge 1 2
            edge 2 3
        "#;
        let g = parse(text).expect("parses");
        let lit = g
            .nodes()
            .find_map(|n| match &n.kind {
                NodeKind::Literal { value } => Some(value.clone()),
                _ => None,
            })
            .expect("has literal");
        assert_eq!(lit, b"a\"b\\c\n\x00".to_vec());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("node 0 uninit").is_err());
        assert!(parse("bogus 1 2").is_err());
        assert!(parse("node 0 uninit x\nnode 0 sink").is_err());
        assert!(parse("node 0 sink\nedge 5 0").is_err());
    }

    #[test]
    fn test_custom_op_loads() {
        let text = r#"
            node 0 uninit x
            node 1 op my_sanitizer
            node 2 sink
            edge 0 1
            edge 1 2
        "#;
        let g = parse(text).expect("parses");
        let op = g
            .nodes()
            .find_map(|n| match &n.kind {
                NodeKind::Op(op) => Some(op.clone()),
                _ => None,
            })
            .expect("has op");
        assert_eq!(op, StringOp::Custom("my_sanitizer".to_string()));
    }
}
