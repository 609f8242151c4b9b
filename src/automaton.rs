//! Symbolic finite automata over the 8-bit alphabet.
//!
//! An [`Automaton`] is a deterministic automaton whose transitions are
//! labeled with [`CharSet`] predicates instead of single bytes. State 0 is
//! always the initial state. The automaton may be partial: a byte with no
//! matching transition falls off into an implicit non-accepting sink.
//!
//! Every construction ends in [`normalize`]: unreachable and dead states are
//! trimmed, the state partition is refined to the coarsest congruence
//! (Hopcroft-style refinement over label minterms), parallel edges to the
//! same target are merged, and states are renumbered in a breadth-first
//! byte order. The result is a canonical form: two automata accept the same
//! language iff they are structurally equal, and the automaton for the empty
//! language is always the single non-accepting state.
//!
//! Automata are immutable values. Operations never alias their inputs into
//! the output.

use std::collections::{BTreeSet, HashMap, VecDeque};

use log::trace;

use crate::alphabet::CharSet;

pub type StateId = usize;

/// A transition guarded by a character predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub label: CharSet,
    pub target: StateId,
}

/// A deterministic symbolic automaton in canonical form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Automaton {
    states: usize,
    accepting: Vec<bool>,
    transitions: Vec<Vec<Transition>>,
}

/// Splits the given labels into a disjoint partition of their union.
///
/// Exact on the 8-bit alphabet: bytes are grouped by their membership
/// signature across all labels, so every original label is a union of
/// minterms. Groups come back ordered by their smallest byte.
pub(crate) fn minterms(labels: &[CharSet]) -> Vec<CharSet> {
    let mut groups: HashMap<Vec<bool>, Vec<u8>> = HashMap::new();
    for c in 0..=255u8 {
        let sig: Vec<bool> = labels.iter().map(|l| l.contains(c)).collect();
        if sig.iter().any(|&b| b) {
            groups.entry(sig).or_default().push(c);
        }
    }
    let mut out: Vec<CharSet> = groups.values().map(|bytes| CharSet::from_bytes(bytes)).collect();
    out.sort_by_key(|m| m.min_byte());
    out
}

// ---------------------------------------------------------------------------
// Nondeterministic builder
// ---------------------------------------------------------------------------

/// Nondeterministic automaton with epsilon moves; the builder behind every
/// composite construction (regex compilation, union, concatenation,
/// transducer images).
#[derive(Clone, Debug)]
pub(crate) struct Nfa {
    pub states: usize,
    pub start: StateId,
    pub accepting: Vec<bool>,
    pub moves: Vec<Vec<Transition>>,
    pub epsilons: Vec<Vec<StateId>>,
}

impl Nfa {
    /// A single non-accepting start state.
    pub fn new() -> Self {
        Nfa {
            states: 1,
            start: 0,
            accepting: vec![false],
            moves: vec![Vec::new()],
            epsilons: vec![Vec::new()],
        }
    }

    pub fn add_state(&mut self, accepting: bool) -> StateId {
        let id = self.states;
        self.states += 1;
        self.accepting.push(accepting);
        self.moves.push(Vec::new());
        self.epsilons.push(Vec::new());
        id
    }

    pub fn add_move(&mut self, from: StateId, label: CharSet, to: StateId) {
        if !label.is_empty() {
            self.moves[from].push(Transition { label, target: to });
        }
    }

    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.epsilons[from].push(to);
    }

    /// Copies all states and transitions of `a` into this NFA.
    ///
    /// Returns the offset of `a`'s state 0; acceptance is *not* imported, the
    /// caller wires it up as needed.
    pub fn embed(&mut self, a: &Automaton) -> usize {
        let offset = self.states;
        for _ in 0..a.num_states() {
            self.add_state(false);
        }
        for s in 0..a.num_states() {
            for tr in a.transitions_from(s) {
                self.add_move(offset + s, tr.label, offset + tr.target);
            }
        }
        offset
    }

    fn eps_closure(&self, set: &BTreeSet<StateId>) -> BTreeSet<StateId> {
        let mut closure = set.clone();
        let mut stack: Vec<StateId> = set.iter().copied().collect();
        while let Some(s) = stack.pop() {
            for &t in &self.epsilons[s] {
                if closure.insert(t) {
                    stack.push(t);
                }
            }
        }
        closure
    }

    /// Subset construction over label minterms, followed by normalization.
    pub fn determinize(&self) -> Automaton {
        let mut labels: Vec<CharSet> = Vec::new();
        for trs in &self.moves {
            for tr in trs {
                if !labels.contains(&tr.label) {
                    labels.push(tr.label);
                }
            }
        }
        let atoms = minterms(&labels);

        let start: BTreeSet<StateId> = self.eps_closure(&BTreeSet::from([self.start]));
        let mut index: HashMap<BTreeSet<StateId>, StateId> = HashMap::new();
        let mut sets: Vec<BTreeSet<StateId>> = vec![start.clone()];
        index.insert(start, 0);

        let mut accepting = Vec::new();
        let mut transitions: Vec<Vec<Transition>> = Vec::new();

        let mut q = VecDeque::from([0usize]);
        accepting.push(sets[0].iter().any(|&s| self.accepting[s]));
        transitions.push(Vec::new());

        while let Some(id) = q.pop_front() {
            let set = sets[id].clone();
            for &atom in &atoms {
                // Any byte of the atom behaves the same; probe with the least.
                let rep = atom.min_byte().expect("minterms are non-empty");
                let mut target: BTreeSet<StateId> = BTreeSet::new();
                for &s in &set {
                    for tr in &self.moves[s] {
                        if tr.label.contains(rep) {
                            target.insert(tr.target);
                        }
                    }
                }
                if target.is_empty() {
                    continue;
                }
                let target = self.eps_closure(&target);
                let tid = match index.get(&target) {
                    Some(&tid) => tid,
                    None => {
                        let tid = sets.len();
                        index.insert(target.clone(), tid);
                        accepting.push(target.iter().any(|&s| self.accepting[s]));
                        transitions.push(Vec::new());
                        sets.push(target);
                        q.push_back(tid);
                        tid
                    }
                };
                transitions[id].push(Transition { label: atom, target: tid });
            }
        }

        normalize(Automaton {
            states: sets.len(),
            accepting,
            transitions,
        })
    }
}

// ---------------------------------------------------------------------------
// Normalization: trim + minimize + canonical numbering
// ---------------------------------------------------------------------------

/// Brings a deterministic (possibly partial) automaton into canonical form.
pub(crate) fn normalize(dfa: Automaton) -> Automaton {
    let n = dfa.states;

    // Reachable from the start.
    let mut reachable = vec![false; n];
    reachable[0] = true;
    let mut q = VecDeque::from([0usize]);
    while let Some(s) = q.pop_front() {
        for tr in &dfa.transitions[s] {
            if !reachable[tr.target] {
                reachable[tr.target] = true;
                q.push_back(tr.target);
            }
        }
    }

    // Co-accessible: can reach an accepting state.
    let mut rev: Vec<Vec<StateId>> = vec![Vec::new(); n];
    for s in 0..n {
        for tr in &dfa.transitions[s] {
            rev[tr.target].push(s);
        }
    }
    let mut live = vec![false; n];
    let mut q: VecDeque<usize> = (0..n).filter(|&s| dfa.accepting[s]).collect();
    for &s in &q {
        live[s] = true;
    }
    while let Some(s) = q.pop_front() {
        for &p in &rev[s] {
            if !live[p] {
                live[p] = true;
                q.push_back(p);
            }
        }
    }

    let alive: Vec<bool> = (0..n).map(|s| reachable[s] && live[s]).collect();
    if !alive[0] {
        return Automaton::sink();
    }

    // Global minterms of the surviving labels.
    let mut labels: Vec<CharSet> = Vec::new();
    for s in 0..n {
        if !alive[s] {
            continue;
        }
        for tr in &dfa.transitions[s] {
            if alive[tr.target] && !labels.contains(&tr.label) {
                labels.push(tr.label);
            }
        }
    }
    let atoms = minterms(&labels);

    // Step function over atoms; `None` is the implicit dead sink.
    let step = |s: StateId, rep: u8| -> Option<StateId> {
        dfa.transitions[s]
            .iter()
            .find(|tr| alive[tr.target] && tr.label.contains(rep))
            .map(|tr| tr.target)
    };

    // Partition refinement: split blocks by acceptance, then by the block
    // each atom leads to, until stable.
    let mut block: Vec<usize> = (0..n).map(|s| if dfa.accepting[s] { 1 } else { 0 }).collect();
    let mut num_blocks = 2;
    loop {
        let mut sig_index: HashMap<(usize, Vec<Option<usize>>), usize> = HashMap::new();
        let mut next_block = vec![0usize; n];
        let mut next_count = 0;
        for s in 0..n {
            if !alive[s] {
                continue;
            }
            let sig: Vec<Option<usize>> = atoms
                .iter()
                .map(|a| step(s, a.min_byte().expect("minterms are non-empty")).map(|t| block[t]))
                .collect();
            let key = (block[s], sig);
            let b = *sig_index.entry(key).or_insert_with(|| {
                let b = next_count;
                next_count += 1;
                b
            });
            next_block[s] = b;
        }
        if next_count == num_blocks {
            block = next_block;
            break;
        }
        num_blocks = next_count;
        block = next_block;
    }

    // Quotient transitions: atom edges between blocks, merged by target.
    let mut reps: HashMap<usize, StateId> = HashMap::new();
    for s in 0..n {
        if alive[s] {
            reps.entry(block[s]).or_insert(s);
        }
    }
    let block_edges = |b: usize| -> Vec<Transition> {
        let s = reps[&b];
        let mut merged: Vec<(usize, CharSet)> = Vec::new();
        for &atom in &atoms {
            let rep = atom.min_byte().expect("minterms are non-empty");
            if let Some(t) = step(s, rep) {
                let tb = block[t];
                match merged.iter_mut().find(|(mb, _)| *mb == tb) {
                    Some((_, l)) => *l = l.union(atom),
                    None => merged.push((tb, atom)),
                }
            }
        }
        let mut out: Vec<Transition> = merged
            .into_iter()
            .map(|(tb, label)| Transition { label, target: tb })
            .collect();
        out.sort_by_key(|tr| tr.label.min_byte());
        out
    };

    // Canonical numbering: breadth-first from the start block, edges in
    // ascending byte order.
    let start_block = block[0];
    let mut numbering: HashMap<usize, StateId> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();
    numbering.insert(start_block, 0);
    order.push(start_block);
    let mut q = VecDeque::from([start_block]);
    while let Some(b) = q.pop_front() {
        for tr in block_edges(b) {
            if !numbering.contains_key(&tr.target) {
                numbering.insert(tr.target, order.len());
                order.push(tr.target);
                q.push_back(tr.target);
            }
        }
    }

    let states = order.len();
    let mut accepting = vec![false; states];
    let mut transitions = vec![Vec::new(); states];
    for (i, &b) in order.iter().enumerate() {
        accepting[i] = dfa.accepting[reps[&b]];
        transitions[i] = block_edges(b)
            .into_iter()
            .map(|tr| Transition {
                label: tr.label,
                target: numbering[&tr.target],
            })
            .collect();
    }

    trace!("normalize: {} states -> {}", n, states);

    Automaton {
        states,
        accepting,
        transitions,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Automaton {
    fn sink() -> Self {
        Automaton {
            states: 1,
            accepting: vec![false],
            transitions: vec![Vec::new()],
        }
    }

    /// The empty language ∅.
    pub fn empty() -> Self {
        Automaton::sink()
    }

    /// The language {ε}.
    pub fn epsilon() -> Self {
        Automaton {
            states: 1,
            accepting: vec![true],
            transitions: vec![Vec::new()],
        }
    }

    /// The universal language Σ*.
    pub fn any_string() -> Self {
        Automaton {
            states: 1,
            accepting: vec![true],
            transitions: vec![vec![Transition {
                label: CharSet::universe(),
                target: 0,
            }]],
        }
    }

    /// The language containing exactly `s`.
    pub fn literal(s: &[u8]) -> Self {
        let states = s.len() + 1;
        let mut accepting = vec![false; states];
        accepting[states - 1] = true;
        let transitions = (0..states)
            .map(|i| {
                if i < s.len() {
                    vec![Transition {
                        label: CharSet::singleton(s[i]),
                        target: i + 1,
                    }]
                } else {
                    Vec::new()
                }
            })
            .collect();
        // A chain is already minimal and canonically numbered.
        Automaton {
            states,
            accepting,
            transitions,
        }
    }

    /// All strings containing `s` as a substring: Σ* · {s} · Σ*.
    pub fn contains(s: &[u8]) -> Self {
        if s.is_empty() {
            return Automaton::any_string();
        }
        let mut nfa = Nfa::new();
        nfa.add_move(0, CharSet::universe(), 0);
        let mut prev = 0;
        for &c in s {
            let next = nfa.add_state(false);
            nfa.add_move(prev, CharSet::singleton(c), next);
            prev = next;
        }
        nfa.accepting[prev] = true;
        nfa.add_move(prev, CharSet::universe(), prev);
        nfa.determinize()
    }

    pub fn num_states(&self) -> usize {
        self.states
    }

    pub fn is_accepting(&self, s: StateId) -> bool {
        self.accepting[s]
    }

    pub fn transitions_from(&self, s: StateId) -> &[Transition] {
        &self.transitions[s]
    }

    /// Deterministic step on one byte; `None` is the implicit dead sink.
    pub fn step(&self, s: StateId, c: u8) -> Option<StateId> {
        self.transitions[s]
            .iter()
            .find(|tr| tr.label.contains(c))
            .map(|tr| tr.target)
    }

    /// Runs the automaton from the start over `input`.
    pub fn run(&self, input: &[u8]) -> Option<StateId> {
        self.run_from(0, input)
    }

    /// Runs the automaton from `s` over `input`.
    pub fn run_from(&self, s: StateId, input: &[u8]) -> Option<StateId> {
        let mut cur = s;
        for &c in input {
            cur = self.step(cur, c)?;
        }
        Some(cur)
    }

    pub fn accepts(&self, input: &[u8]) -> bool {
        matches!(self.run(input), Some(s) if self.accepting[s])
    }

    /// Language emptiness. Canonical form makes this a lookup.
    pub fn is_empty(&self) -> bool {
        !self.accepting.iter().any(|&a| a)
    }

    pub fn contains_empty_string(&self) -> bool {
        self.accepting[0]
    }

    /// L(self) ∪ L(other).
    pub fn union(&self, other: &Automaton) -> Automaton {
        let mut nfa = Nfa::new();
        let a = nfa.embed(self);
        let b = nfa.embed(other);
        nfa.add_epsilon(0, a);
        nfa.add_epsilon(0, b);
        for s in 0..self.states {
            if self.accepting[s] {
                nfa.accepting[a + s] = true;
            }
        }
        for s in 0..other.states {
            if other.accepting[s] {
                nfa.accepting[b + s] = true;
            }
        }
        nfa.determinize()
    }

    /// L(self) ∩ L(other), by product construction.
    pub fn intersect(&self, other: &Automaton) -> Automaton {
        let mut labels: Vec<CharSet> = Vec::new();
        for a in [self, other] {
            for s in 0..a.states {
                for tr in &a.transitions[s] {
                    if !labels.contains(&tr.label) {
                        labels.push(tr.label);
                    }
                }
            }
        }
        let atoms = minterms(&labels);

        let mut index: HashMap<(StateId, StateId), StateId> = HashMap::new();
        let mut pairs: Vec<(StateId, StateId)> = vec![(0, 0)];
        index.insert((0, 0), 0);
        let mut accepting = vec![self.accepting[0] && other.accepting[0]];
        let mut transitions: Vec<Vec<Transition>> = vec![Vec::new()];

        let mut q = VecDeque::from([0usize]);
        while let Some(id) = q.pop_front() {
            let (x, y) = pairs[id];
            for &atom in &atoms {
                let rep = atom.min_byte().expect("minterms are non-empty");
                let (Some(nx), Some(ny)) = (self.step(x, rep), other.step(y, rep)) else {
                    continue;
                };
                let tid = match index.get(&(nx, ny)) {
                    Some(&tid) => tid,
                    None => {
                        let tid = pairs.len();
                        index.insert((nx, ny), tid);
                        pairs.push((nx, ny));
                        accepting.push(self.accepting[nx] && other.accepting[ny]);
                        transitions.push(Vec::new());
                        q.push_back(tid);
                        tid
                    }
                };
                transitions[id].push(Transition { label: atom, target: tid });
            }
        }

        normalize(Automaton {
            states: pairs.len(),
            accepting,
            transitions,
        })
    }

    /// Σ* \ L(self): totalize with an explicit dead state, then flip
    /// acceptance.
    pub fn complement(&self) -> Automaton {
        let n = self.states;
        let dead = n;
        let mut accepting: Vec<bool> = self.accepting.iter().map(|&a| !a).collect();
        accepting.push(true);
        let mut transitions = self.transitions.clone();
        for trs in transitions.iter_mut() {
            let covered = trs
                .iter()
                .fold(CharSet::empty(), |acc, tr| acc.union(tr.label));
            let missing = covered.complement();
            if !missing.is_empty() {
                trs.push(Transition {
                    label: missing,
                    target: dead,
                });
            }
        }
        transitions.push(vec![Transition {
            label: CharSet::universe(),
            target: dead,
        }]);
        normalize(Automaton {
            states: n + 1,
            accepting,
            transitions,
        })
    }

    /// L(self) · L(other).
    pub fn concat(&self, other: &Automaton) -> Automaton {
        if self.is_empty() || other.is_empty() {
            return Automaton::empty();
        }
        let mut nfa = Nfa::new();
        let a = nfa.embed(self);
        let b = nfa.embed(other);
        nfa.add_epsilon(0, a);
        for s in 0..self.states {
            if self.accepting[s] {
                nfa.add_epsilon(a + s, b);
            }
        }
        for s in 0..other.states {
            if other.accepting[s] {
                nfa.accepting[b + s] = true;
            }
        }
        nfa.determinize()
    }

    /// L(self)*.
    pub fn kleene_star(&self) -> Automaton {
        let mut nfa = Nfa::new();
        let a = nfa.embed(self);
        nfa.accepting[0] = true;
        nfa.add_epsilon(0, a);
        for s in 0..self.states {
            if self.accepting[s] {
                nfa.add_epsilon(a + s, 0);
            }
        }
        nfa.determinize()
    }

    /// L(self) ∪ {ε}.
    pub fn union_with_empty_string(&self) -> Automaton {
        if self.contains_empty_string() {
            return self.clone();
        }
        self.union(&Automaton::epsilon())
    }

    /// L(self) ⊆ L(other).
    pub fn subset_of(&self, other: &Automaton) -> bool {
        self.intersect(&other.complement()).is_empty()
    }

    /// Shortest member of the language; ties broken by smallest byte.
    ///
    /// Returns `None` iff the language is empty.
    pub fn sample(&self) -> Option<Vec<u8>> {
        let n = self.states;
        let mut rev: Vec<Vec<StateId>> = vec![Vec::new(); n];
        for s in 0..n {
            for tr in &self.transitions[s] {
                rev[tr.target].push(s);
            }
        }
        // Distance from each state to acceptance.
        let mut dist = vec![usize::MAX; n];
        let mut q: VecDeque<StateId> = VecDeque::new();
        for s in 0..n {
            if self.accepting[s] {
                dist[s] = 0;
                q.push_back(s);
            }
        }
        while let Some(s) = q.pop_front() {
            for &p in &rev[s] {
                if dist[p] == usize::MAX {
                    dist[p] = dist[s] + 1;
                    q.push_back(p);
                }
            }
        }
        if dist[0] == usize::MAX {
            return None;
        }

        let mut out = Vec::with_capacity(dist[0]);
        let mut cur = 0;
        while dist[cur] > 0 {
            // Smallest byte that stays on a shortest path.
            let tr = self.transitions[cur]
                .iter()
                .filter(|tr| dist[tr.target] == dist[cur] - 1)
                .min_by_key(|tr| tr.label.min_byte())
                .expect("a state at finite distance has a descending edge");
            out.push(tr.label.min_byte().expect("canonical labels are non-empty"));
            cur = tr.target;
        }
        Some(out)
    }

    /// If the language is a single string, returns it.
    pub fn as_literal(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        let mut cur = 0;
        for _ in 0..=self.states {
            if self.accepting[cur] {
                return self.transitions[cur].is_empty().then_some(out);
            }
            if self.transitions[cur].len() != 1 {
                return None;
            }
            let tr = self.transitions[cur][0];
            let bytes = tr.label.bytes();
            if bytes.len() != 1 {
                return None;
            }
            out.push(bytes[0]);
            cur = tr.target;
        }
        // Walked more steps than states: there is a cycle.
        None
    }

    /// Pairs `(x, y)` such that state `y` of `self` is reachable from state
    /// `x` by some string in L(other).
    pub(crate) fn reachable_via(&self, other: &Automaton, from: &[StateId]) -> Vec<(StateId, StateId)> {
        let mut labels: Vec<CharSet> = Vec::new();
        for a in [self, other] {
            for s in 0..a.states {
                for tr in &a.transitions[s] {
                    if !labels.contains(&tr.label) {
                        labels.push(tr.label);
                    }
                }
            }
        }
        let atoms = minterms(&labels);

        let mut out = Vec::new();
        for &x in from {
            let mut seen: BTreeSet<(StateId, StateId)> = BTreeSet::from([(x, 0)]);
            let mut q = VecDeque::from([(x, 0usize)]);
            let mut found: BTreeSet<StateId> = BTreeSet::new();
            while let Some((s, o)) = q.pop_front() {
                if other.accepting[o] {
                    found.insert(s);
                }
                for &atom in &atoms {
                    let rep = atom.min_byte().expect("minterms are non-empty");
                    if let (Some(ns), Some(no)) = (self.step(s, rep), other.step(o, rep)) {
                        if seen.insert((ns, no)) {
                            q.push_back((ns, no));
                        }
                    }
                }
            }
            out.extend(found.into_iter().map(|y| (x, y)));
        }
        out
    }

    /// Left quotient: { v : ∃u ∈ L(prefixes), uv ∈ L(self) }.
    pub fn left_quotient(&self, prefixes: &Automaton) -> Automaton {
        let starts: Vec<StateId> = self
            .reachable_via(prefixes, &[0])
            .into_iter()
            .map(|(_, y)| y)
            .collect();
        let mut nfa = Nfa::new();
        let a = nfa.embed(self);
        for s in starts {
            nfa.add_epsilon(0, a + s);
        }
        for s in 0..self.states {
            if self.accepting[s] {
                nfa.accepting[a + s] = true;
            }
        }
        nfa.determinize()
    }

    /// Right quotient: { u : ∃v ∈ L(suffixes), uv ∈ L(self) }.
    pub fn right_quotient(&self, suffixes: &Automaton) -> Automaton {
        let all: Vec<StateId> = (0..self.states).collect();
        let mut accepting = vec![false; self.states];
        for (x, y) in self.reachable_via(suffixes, &all) {
            if self.accepting[y] {
                accepting[x] = true;
            }
        }
        normalize(Automaton {
            states: self.states,
            accepting,
            transitions: self.transitions.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_accepts() {
        let a = Automaton::literal(b"abc");
        assert!(a.accepts(b"abc"));
        assert!(!a.accepts(b"ab"));
        assert!(!a.accepts(b"abcd"));
        assert!(!a.accepts(b""));
        assert_eq!(a.num_states(), 4);
    }

    #[test]
    fn test_empty_epsilon_any() {
        let e = Automaton::empty();
        assert!(e.is_empty());
        assert!(!e.accepts(b""));
        assert_eq!(e.sample(), None);

        let eps = Automaton::epsilon();
        assert!(!eps.is_empty());
        assert!(eps.accepts(b""));
        assert!(!eps.accepts(b"a"));
        assert!(eps.contains_empty_string());

        let any = Automaton::any_string();
        assert!(any.accepts(b""));
        assert!(any.accepts(b"anything at all \x00\xff"));
    }

    #[test]
    fn test_union_intersect() {
        let a = Automaton::literal(b"a");
        let b = Automaton::literal(b"b");
        let u = a.union(&b);
        assert!(u.accepts(b"a"));
        assert!(u.accepts(b"b"));
        assert!(!u.accepts(b"c"));
        assert!(!u.accepts(b"ab"));

        let i = a.intersect(&b);
        assert!(i.is_empty());

        let i2 = u.intersect(&a);
        assert_eq!(i2, a);
    }

    #[test]
    fn test_complement() {
        let a = Automaton::literal(b"x");
        let c = a.complement();
        assert!(!c.accepts(b"x"));
        assert!(c.accepts(b""));
        assert!(c.accepts(b"y"));
        assert!(c.accepts(b"xx"));

        // Involution restores the canonical original.
        assert_eq!(c.complement(), a);
    }

    #[test]
    fn test_concat_star() {
        let ab = Automaton::literal(b"a").concat(&Automaton::literal(b"b"));
        assert!(ab.accepts(b"ab"));
        assert!(!ab.accepts(b"a"));
        assert!(!ab.accepts(b"ba"));

        let astar = Automaton::literal(b"a").kleene_star();
        assert!(astar.accepts(b""));
        assert!(astar.accepts(b"a"));
        assert!(astar.accepts(b"aaaa"));
        assert!(!astar.accepts(b"ab"));

        // ∅ absorbs concatenation.
        assert!(ab.concat(&Automaton::empty()).is_empty());
    }

    #[test]
    fn test_union_with_empty_string() {
        let a = Automaton::literal(b"a");
        let ae = a.union_with_empty_string();
        assert!(ae.contains_empty_string());
        assert!(ae.accepts(b"a"));
        // Idempotent on languages that already contain ε.
        assert_eq!(ae.union_with_empty_string(), ae);
    }

    #[test]
    fn test_subset() {
        let a = Automaton::literal(b"a");
        let astar = a.kleene_star();
        assert!(a.subset_of(&astar));
        assert!(!astar.subset_of(&a));
        assert!(Automaton::empty().subset_of(&a));
        assert!(a.subset_of(&Automaton::any_string()));
    }

    #[test]
    fn test_contains_substring() {
        let c = Automaton::contains(b"<script>");
        assert!(c.accepts(b"<script>alert(1)</script>"));
        assert!(c.accepts(b"<script>"));
        assert!(!c.accepts(b"<scrip"));
        assert!(!c.accepts(b""));
    }

    #[test]
    fn test_sample_shortest_lex() {
        let u = Automaton::literal(b"zz").union(&Automaton::literal(b"ba")).union(&Automaton::literal(b"ab"));
        // All candidates have length 2; "ab" is lexicographically least.
        assert_eq!(u.sample(), Some(b"ab".to_vec()));

        let v = Automaton::literal(b"lengthy").union(&Automaton::literal(b"yy"));
        assert_eq!(v.sample(), Some(b"yy".to_vec()));

        assert_eq!(Automaton::epsilon().sample(), Some(Vec::new()));
    }

    #[test]
    fn test_sample_agrees_with_is_empty() {
        let cases = [
            Automaton::empty(),
            Automaton::epsilon(),
            Automaton::literal(b"a"),
            Automaton::literal(b"a").intersect(&Automaton::literal(b"b")),
            Automaton::any_string(),
        ];
        for a in &cases {
            assert_eq!(a.is_empty(), a.sample().is_none());
        }
    }

    #[test]
    fn test_as_literal() {
        assert_eq!(Automaton::literal(b"abc").as_literal(), Some(b"abc".to_vec()));
        assert_eq!(Automaton::epsilon().as_literal(), Some(Vec::new()));
        assert_eq!(Automaton::empty().as_literal(), None);
        assert_eq!(Automaton::any_string().as_literal(), None);
        let u = Automaton::literal(b"a").union(&Automaton::literal(b"b"));
        assert_eq!(u.as_literal(), None);
    }

    #[test]
    fn test_minimize_is_fixed_point() {
        let a = Automaton::literal(b"ab")
            .union(&Automaton::literal(b"ac"))
            .union(&Automaton::literal(b"bb"));
        let again = normalize(a.clone());
        assert_eq!(a, again);
    }

    #[test]
    fn test_canonical_empty() {
        // Different routes to the empty language agree structurally.
        let i = Automaton::literal(b"a").intersect(&Automaton::literal(b"b"));
        assert_eq!(i, Automaton::empty());
        let c = Automaton::any_string().complement();
        assert_eq!(c, Automaton::empty());
    }

    #[test]
    fn test_quotients() {
        // L = {ab, cb}; left quotient by {a} is {b}.
        let l = Automaton::literal(b"ab").union(&Automaton::literal(b"cb"));
        let lq = l.left_quotient(&Automaton::literal(b"a"));
        assert_eq!(lq, Automaton::literal(b"b"));

        // Right quotient of L by {b} is {a, c}.
        let rq = l.right_quotient(&Automaton::literal(b"b"));
        assert_eq!(rq, Automaton::literal(b"a").union(&Automaton::literal(b"c")));

        // Quotient of Σ*<Σ* by a* leaves Σ*<Σ*.
        let lt = Automaton::contains(b"<");
        let astar = Automaton::literal(b"a").kleene_star();
        assert_eq!(lt.right_quotient(&astar), lt);
    }

    #[test]
    fn test_operands_unchanged() {
        let a = Automaton::literal(b"a");
        let b = Automaton::literal(b"b");
        let a0 = a.clone();
        let b0 = b.clone();
        let _ = a.union(&b);
        let _ = a.intersect(&b);
        let _ = a.concat(&b);
        let _ = a.complement();
        let _ = a.kleene_star();
        assert_eq!(a, a0);
        assert_eq!(b, b0);
    }
}
