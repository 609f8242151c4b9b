//! Fixpoint evaluation over the dependency graph.
//!
//! Two passes, both worklist-driven over the [`StringDomain`] lattice:
//!
//! - The **forward pass** assigns every node the language of strings it can
//!   hold, starting from the input language at the field of interest and Σ*
//!   at every other untrusted input. Values only grow; cycles are forced to
//!   converge by widening after a per-node threshold, with ⊤ as the last
//!   resort.
//! - The **backward pass** starts from a constraint at the sink (typically
//!   post-image ∩ attack pattern) and computes, for every node, the forward
//!   value refined to what can actually reach the constrained sink. Values
//!   only shrink; after the threshold a node is frozen, which keeps the
//!   result a sound over-approximation.
//!
//! Nodes move `Unvisited → Pending → Stable` and return to `Pending`
//! whenever a neighbor on the relevant side changes. The cancellation token
//! is tested between worklist pops and at widening points.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::automaton::Automaton;
use crate::depgraph::{DepGraph, NodeId, NodeKind, StringOp};
use crate::domain::{AbstractDomain, StringDomain};
use crate::error::{AnalysisError, Result};
use crate::regex;
use crate::transducer::{self, Transducer};

/// Tuning knobs for the fixpoint passes.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Updates of a node before widening kicks in.
    pub widening_threshold: usize,
    /// Updates of a node before the pass gives up and jumps to ⊤ (forward)
    /// or freezes the node (backward).
    pub max_node_iterations: usize,
    /// Largest automaton any node may carry before `ResourceExhausted`.
    pub max_states: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            widening_threshold: 3,
            max_node_iterations: 16,
            max_states: 100_000,
        }
    }
}

/// Cooperative cancellation shared between a driver and its passes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Pending,
    Stable,
}

/// A fixpoint assignment of automata to graph nodes.
///
/// The result owns its automata; nodes the pass never constrained are
/// absent.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    values: HashMap<NodeId, Automaton>,
}

impl AnalysisResult {
    pub fn get(&self, id: NodeId) -> Option<&Automaton> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Automaton)> {
        self.values.iter().map(|(&id, a)| (id, a))
    }
}

fn check_size(auto: &Automaton, config: &EvalConfig) -> Result<()> {
    if auto.num_states() > config.max_states {
        Err(AnalysisError::ResourceExhausted {
            states: auto.num_states(),
            limit: config.max_states,
        })
    } else {
        Ok(())
    }
}

/// Shared worklist state for one pass.
struct Worklist {
    queue: VecDeque<NodeId>,
    queued: Vec<bool>,
    visit: Vec<VisitState>,
}

impl Worklist {
    fn seeded(order: &[NodeId], n: usize) -> Self {
        let mut wl = Worklist {
            queue: VecDeque::with_capacity(n),
            queued: vec![false; n],
            visit: vec![VisitState::Unvisited; n],
        };
        for &node in order {
            wl.push(node);
        }
        wl
    }

    fn push(&mut self, node: NodeId) {
        self.visit[node] = VisitState::Pending;
        if !self.queued[node] {
            self.queued[node] = true;
            self.queue.push_back(node);
        }
    }

    fn pop(&mut self) -> Option<NodeId> {
        let node = self.queue.pop_front()?;
        self.queued[node] = false;
        Some(node)
    }

    fn settle(&mut self, node: NodeId) {
        if !self.queued[node] {
            self.visit[node] = VisitState::Stable;
        }
    }

    fn stable_count(&self) -> usize {
        self.visit.iter().filter(|&&s| s == VisitState::Stable).count()
    }
}

// ---------------------------------------------------------------------------
// Forward pass
// ---------------------------------------------------------------------------

/// Computes the post-image fixpoint: the language every node can hold when
/// the `field` input ranges over `input`.
pub fn forward_analysis(
    graph: &DepGraph,
    field: &str,
    input: &Automaton,
    config: &EvalConfig,
    token: &CancellationToken,
) -> Result<AnalysisResult> {
    let domain = StringDomain;
    let n = graph.num_nodes();
    let order = graph.reverse_post_order();
    let mut wl = Worklist::seeded(&order, n);
    let mut values: HashMap<NodeId, Automaton> = HashMap::new();
    let mut updates = vec![0usize; n];

    info!("forward: {} nodes, field {:?}", n, field);

    while let Some(node) = wl.pop() {
        token.check()?;

        let computed = forward_transfer(graph, node, &values, field, input)?;
        let old = values.get(&node);
        let mut next = match old {
            Some(old) => domain.join(old, &computed),
            None => computed,
        };

        let changed = match old {
            Some(old) => !domain.le(&next, old),
            None => true,
        };
        if !changed {
            wl.settle(node);
            continue;
        }

        updates[node] += 1;
        if let Some(old) = old {
            if updates[node] > config.widening_threshold {
                token.check()?;
                next = domain.widen(old, &next);
            }
            if updates[node] > config.max_node_iterations {
                warn!("forward: node {} did not converge, jumping to ⊤", node);
                next = domain.top();
            }
        }
        check_size(&next, config)?;
        debug!("forward: node {} -> {} states", node, next.num_states());

        values.insert(node, next);
        wl.settle(node);
        for &succ in graph.successors(node) {
            wl.push(succ);
        }
    }

    info!("forward: fixpoint over {} nodes, {} stable", values.len(), wl.stable_count());
    Ok(AnalysisResult { values })
}

fn forward_transfer(
    graph: &DepGraph,
    id: NodeId,
    values: &HashMap<NodeId, Automaton>,
    field: &str,
    input: &Automaton,
) -> Result<Automaton> {
    let node = graph.node(id);
    let arg = |i: usize| -> Automaton {
        values
            .get(&node.args[i])
            .cloned()
            .unwrap_or_else(Automaton::empty)
    };
    let join_args = || -> Automaton {
        node.args
            .iter()
            .map(|a| values.get(a).cloned().unwrap_or_else(Automaton::empty))
            .fold(Automaton::empty(), |acc, v| acc.union(&v))
    };

    let out = match &node.kind {
        NodeKind::Uninit { field: f } => {
            if f == field {
                input.clone()
            } else {
                // Inputs outside the field of interest stay unconstrained.
                Automaton::any_string()
            }
        }
        NodeKind::Literal { value } => Automaton::literal(value),
        NodeKind::Var { .. } => join_args(),
        NodeKind::Sink => join_args(),
        NodeKind::Op(op) => match op {
            StringOp::Concat => {
                let mut acc = arg(0);
                for i in 1..node.args.len() {
                    acc = acc.concat(&arg(i));
                }
                acc
            }
            StringOp::Replace => transducer::replace(&arg(2), &arg(0), &arg(1))?,
            StringOp::HtmlSpecialChars(mode) => Transducer::html_special_chars(*mode).apply(&join_args()),
            StringOp::EscapeHtmlTags => Transducer::escape_html_tags().apply(&join_args()),
            StringOp::EncodeUriComponent => Transducer::encode_uri_component().apply(&join_args()),
            StringOp::AddSlashes => Transducer::add_slashes().apply(&join_args()),
            StringOp::ToLowerCase => Transducer::to_lower_case().apply(&join_args()),
            StringOp::ToUpperCase => Transducer::to_upper_case().apply(&join_args()),
            StringOp::Trim => transducer::trim(&join_args()),
            StringOp::Substring { start, len } => transducer::substring(&join_args(), *start, *len),
            StringOp::RegexMatch { pattern } => regex::compile(pattern)?.intersect(&join_args()),
            StringOp::Custom(name) => {
                return Err(AnalysisError::UnsupportedOperation(format!(
                    "no transducer for {:?} at node {}",
                    name, id
                )));
            }
        },
    };
    Ok(out)
}

// ---------------------------------------------------------------------------
// Backward pass
// ---------------------------------------------------------------------------

/// Computes the pre-image fixpoint: refines the forward result to the
/// strings consistent with `constraint` at the sink.
pub fn backward_analysis(
    graph: &DepGraph,
    forward: &AnalysisResult,
    constraint: &Automaton,
    config: &EvalConfig,
    token: &CancellationToken,
) -> Result<AnalysisResult> {
    let domain = StringDomain;
    let n = graph.num_nodes();
    let sink = graph.sink();
    let order = graph.post_order();
    let mut wl = Worklist::seeded(&order, n);
    let mut values: HashMap<NodeId, Automaton> = HashMap::new();
    let mut updates = vec![0usize; n];

    info!("backward: {} nodes, {} constraint states", n, constraint.num_states());

    while let Some(node) = wl.pop() {
        token.check()?;

        let next = if node == sink {
            let fwd = forward.get(sink).cloned().unwrap_or_else(Automaton::empty);
            Some(domain.meet(&fwd, constraint))
        } else {
            backward_value(graph, node, forward, &values)?
        };
        let Some(next) = next else {
            // No constrained consumer yet.
            wl.settle(node);
            continue;
        };

        let changed = match values.get(&node) {
            Some(old) => !domain.eq(old, &next),
            None => true,
        };
        if !changed {
            wl.settle(node);
            continue;
        }

        updates[node] += 1;
        if updates[node] > config.widening_threshold && values.contains_key(&node) {
            // Descending chain: freezing the node keeps the result a sound
            // over-approximation of the pre-image.
            debug!("backward: node {} frozen after {} updates", node, updates[node]);
            wl.settle(node);
            continue;
        }
        check_size(&next, config)?;
        debug!("backward: node {} -> {} states", node, next.num_states());

        values.insert(node, next);
        wl.settle(node);
        for &arg in graph.predecessors(node) {
            wl.push(arg);
        }
    }

    info!(
        "backward: fixpoint over {} constrained nodes, {} stable",
        values.len(),
        wl.stable_count()
    );
    Ok(AnalysisResult { values })
}

/// The constraint for `node`: its forward value met with the inverse image
/// of every constrained consumer. `None` when no consumer is constrained.
fn backward_value(
    graph: &DepGraph,
    node: NodeId,
    forward: &AnalysisResult,
    values: &HashMap<NodeId, Automaton>,
) -> Result<Option<Automaton>> {
    let domain = StringDomain;
    let mut acc: Option<Automaton> = None;
    for &consumer in graph.successors(node) {
        let Some(out_constraint) = values.get(&consumer) else {
            continue;
        };
        for (pos, &arg) in graph.predecessors(consumer).iter().enumerate() {
            if arg != node {
                continue;
            }
            let pre = backward_transfer(graph, consumer, pos, out_constraint, forward)?;
            acc = Some(match acc {
                Some(prev) => domain.meet(&prev, &pre),
                None => pre,
            });
        }
    }
    let Some(acc) = acc else {
        return Ok(None);
    };
    let fwd = forward.get(node).cloned().unwrap_or_else(Automaton::empty);
    Ok(Some(domain.meet(&fwd, &acc)))
}

/// Inverse image of `constraint` through argument `pos` of `consumer`.
fn backward_transfer(
    graph: &DepGraph,
    consumer: NodeId,
    pos: usize,
    constraint: &Automaton,
    forward: &AnalysisResult,
) -> Result<Automaton> {
    let node = graph.node(consumer);
    let fwd = |id: NodeId| -> Automaton {
        forward.get(id).cloned().unwrap_or_else(Automaton::empty)
    };

    let out = match &node.kind {
        NodeKind::Sink => constraint.clone(),
        NodeKind::Var { .. } => constraint.clone(),
        NodeKind::Op(op) => match op {
            StringOp::Concat => {
                // u · x · v ∈ C with u from the earlier arguments and v from
                // the later ones: strip the suffix, then the prefix.
                let mut prefix = Automaton::epsilon();
                for &a in &node.args[..pos] {
                    prefix = prefix.concat(&fwd(a));
                }
                let mut suffix = Automaton::epsilon();
                for &a in &node.args[pos + 1..] {
                    suffix = suffix.concat(&fwd(a));
                }
                constraint.right_quotient(&suffix).left_quotient(&prefix)
            }
            StringOp::Replace => {
                if pos == 2 {
                    transducer::replace_inverse(constraint, &fwd(node.args[0]), &fwd(node.args[1]))?
                } else {
                    // The search and replacement arguments are not
                    // constrained by the output language.
                    Automaton::any_string()
                }
            }
            StringOp::HtmlSpecialChars(mode) => Transducer::html_special_chars(*mode).inverse(constraint),
            StringOp::EscapeHtmlTags => Transducer::escape_html_tags().inverse(constraint),
            StringOp::EncodeUriComponent => Transducer::encode_uri_component().inverse(constraint),
            StringOp::AddSlashes => Transducer::add_slashes().inverse(constraint),
            StringOp::ToLowerCase => Transducer::to_lower_case().inverse(constraint),
            StringOp::ToUpperCase => Transducer::to_upper_case().inverse(constraint),
            StringOp::Trim => transducer::trim_inverse(constraint),
            StringOp::Substring { start, len } => transducer::substring_inverse(constraint, *start, *len),
            StringOp::RegexMatch { pattern } => regex::compile(pattern)?.intersect(constraint),
            StringOp::Custom(name) => {
                return Err(AnalysisError::UnsupportedOperation(format!(
                    "no inverse transducer for {:?} at node {}",
                    name, consumer
                )));
            }
        },
        NodeKind::Uninit { .. } | NodeKind::Literal { .. } => {
            return Err(AnalysisError::GraphInconsistent(format!(
                "source node {} has an incoming edge",
                consumer
            )));
        }
    };
    Ok(out)
}
