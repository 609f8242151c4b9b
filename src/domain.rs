//! The string lattice the fixpoint passes compute over.
//!
//! Elements are automata, ordered by language inclusion:
//! - `bottom` (`⊥`): the empty language.
//! - `top` (`⊤`): Σ*.
//! - `join` (`⊔`): union.
//! - `meet` (`⊓`): intersection.
//! - `le` (`⊑`): subset inclusion.
//!
//! The lattice has infinite ascending chains (`a`, `a|aa`, `a|aa|aaa`, ...),
//! so loops in the dependency graph need a widening operator. [`widen`]
//! over-approximates by collapsing states with the same acceptance and
//! outgoing-label signature into one: the quotient automaton accepts a
//! superset of the union and its size is bounded by the number of distinct
//! signatures, which stabilizes growing iterates quickly.

use std::collections::BTreeSet;
use std::fmt::Debug;

use log::debug;

use crate::automaton::{Automaton, Nfa};

/// Abstract domain interface.
///
/// # Lattice properties
///
/// - Reflexivity: `∀a. a ⊑ a`
/// - Transitivity: `∀a,b,c. a ⊑ b ∧ b ⊑ c ⇒ a ⊑ c`
/// - Antisymmetry: `∀a,b. a ⊑ b ∧ b ⊑ a ⇒ a = b`
/// - Widening preserves order: `a ⊑ (a ∇ b)` and `b ⊑ (a ∇ b)`
pub trait AbstractDomain: Clone + Debug {
    type Element: Clone + Debug + PartialEq;

    fn bottom(&self) -> Self::Element;
    fn top(&self) -> Self::Element;
    fn is_bottom(&self, elem: &Self::Element) -> bool;

    /// Partial order: `elem1 ⊑ elem2`.
    fn le(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool;

    /// Least upper bound.
    fn join(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Greatest lower bound.
    fn meet(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Widening: an upper bound of both arguments that forces convergence.
    fn widen(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    fn eq(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool {
        self.le(elem1, elem2) && self.le(elem2, elem1)
    }
}

/// The automata domain over byte strings.
#[derive(Clone, Debug, Default)]
pub struct StringDomain;

impl AbstractDomain for StringDomain {
    type Element = Automaton;

    fn bottom(&self) -> Automaton {
        Automaton::empty()
    }

    fn top(&self) -> Automaton {
        Automaton::any_string()
    }

    fn is_bottom(&self, elem: &Automaton) -> bool {
        elem.is_empty()
    }

    fn le(&self, elem1: &Automaton, elem2: &Automaton) -> bool {
        elem1.subset_of(elem2)
    }

    fn join(&self, elem1: &Automaton, elem2: &Automaton) -> Automaton {
        elem1.union(elem2)
    }

    fn meet(&self, elem1: &Automaton, elem2: &Automaton) -> Automaton {
        elem1.intersect(elem2)
    }

    fn widen(&self, elem1: &Automaton, elem2: &Automaton) -> Automaton {
        let union = elem1.union(elem2);
        if union.subset_of(elem1) {
            // Already stable.
            return union;
        }
        let widened = collapse_by_signature(&union);
        debug!(
            "widen: {} ∇ {} states -> {}",
            elem1.num_states(),
            elem2.num_states(),
            widened.num_states()
        );
        widened
    }
}

/// Merges all states with identical acceptance and outgoing-label sets.
///
/// The quotient is read as an NFA, so its language contains the original.
fn collapse_by_signature(a: &Automaton) -> Automaton {
    let n = a.num_states();
    let mut signatures: Vec<(bool, BTreeSet<crate::alphabet::CharSet>)> = Vec::with_capacity(n);
    for s in 0..n {
        let labels: BTreeSet<_> = a.transitions_from(s).iter().map(|tr| tr.label).collect();
        signatures.push((a.is_accepting(s), labels));
    }

    let mut classes: Vec<(bool, BTreeSet<crate::alphabet::CharSet>)> = Vec::new();
    let mut class_of = vec![0usize; n];
    for s in 0..n {
        match classes.iter().position(|sig| *sig == signatures[s]) {
            Some(i) => class_of[s] = i,
            None => {
                class_of[s] = classes.len();
                classes.push(signatures[s].clone());
            }
        }
    }

    if classes.len() == n {
        // Nothing to merge.
        return a.clone();
    }

    let mut nfa = Nfa::new();
    let offset = nfa.states;
    for (accepting, _) in &classes {
        nfa.add_state(*accepting);
    }
    nfa.add_epsilon(0, offset + class_of[0]);
    for s in 0..n {
        for tr in a.transitions_from(s) {
            nfa.add_move(offset + class_of[s], tr.label, offset + class_of[tr.target]);
        }
    }
    nfa.determinize()
}
