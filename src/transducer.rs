//! Finite-state transducers modeling string sanitizers.
//!
//! A [`Transducer`] relates input strings to output strings. Composing one
//! with an automaton in the forward direction ([`Transducer::apply`]) yields
//! the post-image `{T(w) : w ∈ L(A)}`; in the backward direction
//! ([`Transducer::inverse`]) it yields the pre-image `{w : T(w) ∈ L(B)}`.
//! Transducers are finite, so both directions are computable even when the
//! underlying function is not injective.
//!
//! The sanitizer library here is fixed: encoders (`htmlspecialchars` in its
//! four modes, tag escaping, `encodeURIComponent`, `addslashes`, case
//! folding) are single-state byte encoders; `replace` is a KMP-driven
//! product construction; `trim` and `substring` are direct automaton
//! transforms with exact inverses. Transducers are never constructed at
//! analysis time, only looked up by the evaluator.

use std::collections::{HashMap, VecDeque};

use crate::alphabet::CharSet;
use crate::automaton::{Automaton, Nfa, StateId};
use crate::error::{AnalysisError, Result};

/// Which characters `htmlspecialchars` encodes, mirroring the PHP flags.
///
/// Each mode encodes everything the previous one does:
/// `NoQuotes` handles `<`, `>`, `&`; `Compat` adds `"`; `Quotes` adds `'`;
/// `Slash` adds `/`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HtmlSpecialCharsMode {
    NoQuotes,
    Compat,
    Quotes,
    Slash,
}

/// What a transducer transition writes to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Echo the consumed input byte.
    Copy,
    /// Write a fixed byte string (possibly empty).
    Chars(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub guard: CharSet,
    pub output: Output,
    pub target: StateId,
}

/// A finite-state transducer; state 0 is initial.
#[derive(Debug, Clone)]
pub struct Transducer {
    states: usize,
    accepting: Vec<bool>,
    rules: Vec<Vec<Rule>>,
}

impl Transducer {
    pub fn new(states: usize) -> Self {
        assert!(states > 0);
        Transducer {
            states,
            accepting: vec![false; states],
            rules: vec![Vec::new(); states],
        }
    }

    pub fn num_states(&self) -> usize {
        self.states
    }

    pub fn set_accepting(&mut self, s: StateId, accepting: bool) {
        self.accepting[s] = accepting;
    }

    pub fn add_rule(&mut self, from: StateId, guard: CharSet, output: Output, target: StateId) {
        if !guard.is_empty() {
            self.rules[from].push(Rule { guard, output, target });
        }
    }

    /// The identity transducer.
    pub fn identity() -> Self {
        let mut t = Transducer::new(1);
        t.set_accepting(0, true);
        t.add_rule(0, CharSet::universe(), Output::Copy, 0);
        t
    }

    /// Single-state encoder: bytes mapped to `Some(s)` are rewritten to `s`,
    /// the rest pass through.
    fn byte_encoder(encode: impl Fn(u8) -> Option<Vec<u8>>) -> Self {
        let mut t = Transducer::new(1);
        t.set_accepting(0, true);
        let mut copied = Vec::new();
        for c in 0..=255u8 {
            match encode(c) {
                Some(s) => t.add_rule(0, CharSet::singleton(c), Output::Chars(s), 0),
                None => copied.push(c),
            }
        }
        t.add_rule(0, CharSet::from_bytes(&copied), Output::Copy, 0);
        t
    }

    /// PHP `htmlspecialchars` with the given quoting mode.
    pub fn html_special_chars(mode: HtmlSpecialCharsMode) -> Self {
        use HtmlSpecialCharsMode::*;
        Transducer::byte_encoder(|c| match c {
            b'<' => Some(b"&lt;".to_vec()),
            b'>' => Some(b"&gt;".to_vec()),
            b'&' => Some(b"&amp;".to_vec()),
            b'"' if mode >= Compat => Some(b"&quot;".to_vec()),
            b'\'' if mode >= Quotes => Some(b"&#039;".to_vec()),
            b'/' if mode >= Slash => Some(b"&#47;".to_vec()),
            _ => None,
        })
    }

    /// Encodes only `<` and `>`.
    pub fn escape_html_tags() -> Self {
        Transducer::byte_encoder(|c| match c {
            b'<' => Some(b"&lt;".to_vec()),
            b'>' => Some(b"&gt;".to_vec()),
            _ => None,
        })
    }

    /// JavaScript `encodeURIComponent`: percent-encodes every byte outside
    /// the unreserved set `[A-Za-z0-9\-_.!~*'()]`.
    pub fn encode_uri_component() -> Self {
        Transducer::byte_encoder(|c| {
            let unreserved =
                c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
            if unreserved {
                None
            } else {
                Some(format!("%{:02X}", c).into_bytes())
            }
        })
    }

    /// PHP `addslashes`: backslash-escapes `'`, `"`, `\` and NUL.
    pub fn add_slashes() -> Self {
        Transducer::byte_encoder(|c| match c {
            b'\'' => Some(b"\\'".to_vec()),
            b'"' => Some(b"\\\"".to_vec()),
            b'\\' => Some(b"\\\\".to_vec()),
            0 => Some(b"\\0".to_vec()),
            _ => None,
        })
    }

    /// ASCII case folding, as PHP `strtolower`.
    pub fn to_lower_case() -> Self {
        Transducer::byte_encoder(|c| c.is_ascii_uppercase().then(|| vec![c + 32]))
    }

    /// ASCII case folding, as PHP `strtoupper`.
    pub fn to_upper_case() -> Self {
        Transducer::byte_encoder(|c| c.is_ascii_lowercase().then(|| vec![c - 32]))
    }

    /// Post-image: the automaton for `{T(w) : w ∈ L(a)}`.
    ///
    /// Product of the transducer with `a`, emitting into an epsilon-NFA over
    /// the *output* alphabet, then determinized.
    pub fn apply(&self, a: &Automaton) -> Automaton {
        let mut nfa = Nfa::new();
        let mut pairs: HashMap<(StateId, StateId), StateId> = HashMap::new();
        let mut queue = VecDeque::new();

        let entry = nfa.add_state(false);
        pairs.insert((0, 0), entry);
        nfa.add_epsilon(0, entry);
        queue.push_back((0usize, 0usize));

        while let Some((t, s)) = queue.pop_front() {
            let p = pairs[&(t, s)];
            if self.accepting[t] && a.is_accepting(s) {
                nfa.accepting[p] = true;
            }
            for rule in &self.rules[t] {
                for tr in a.transitions_from(s) {
                    let consumed = rule.guard.intersect(tr.label);
                    if consumed.is_empty() {
                        continue;
                    }
                    let dst_key = (rule.target, tr.target);
                    let dst = *pairs.entry(dst_key).or_insert_with(|| {
                        queue.push_back(dst_key);
                        nfa.add_state(false)
                    });
                    match &rule.output {
                        Output::Copy => nfa.add_move(p, consumed, dst),
                        Output::Chars(out) => {
                            // The consumed byte is existential; the output is fixed.
                            let mut cur = p;
                            for &b in out {
                                let next = nfa.add_state(false);
                                nfa.add_move(cur, CharSet::singleton(b), next);
                                cur = next;
                            }
                            nfa.add_epsilon(cur, dst);
                        }
                    }
                }
            }
        }
        nfa.determinize()
    }

    /// Pre-image: the automaton for `{w : T(w) ∈ L(b)}`.
    ///
    /// Product of the transducer with `b`, where `b` tracks the *output*
    /// while the constructed NFA consumes the *input*.
    pub fn inverse(&self, b: &Automaton) -> Automaton {
        let mut nfa = Nfa::new();
        let mut pairs: HashMap<(StateId, StateId), StateId> = HashMap::new();
        let mut queue = VecDeque::new();

        let entry = nfa.add_state(false);
        pairs.insert((0, 0), entry);
        nfa.add_epsilon(0, entry);
        queue.push_back((0usize, 0usize));

        while let Some((t, s)) = queue.pop_front() {
            let p = pairs[&(t, s)];
            if self.accepting[t] && b.is_accepting(s) {
                nfa.accepting[p] = true;
            }
            for rule in &self.rules[t] {
                match &rule.output {
                    Output::Copy => {
                        for tr in b.transitions_from(s) {
                            let g = rule.guard.intersect(tr.label);
                            if g.is_empty() {
                                continue;
                            }
                            let dst_key = (rule.target, tr.target);
                            let dst = *pairs.entry(dst_key).or_insert_with(|| {
                                queue.push_back(dst_key);
                                nfa.add_state(false)
                            });
                            nfa.add_move(p, g, dst);
                        }
                    }
                    Output::Chars(out) => {
                        let Some(s2) = b.run_from(s, out) else {
                            continue;
                        };
                        let dst_key = (rule.target, s2);
                        let dst = *pairs.entry(dst_key).or_insert_with(|| {
                            queue.push_back(dst_key);
                            nfa.add_state(false)
                        });
                        nfa.add_move(p, rule.guard, dst);
                    }
                }
            }
        }
        nfa.determinize()
    }
}

// ---------------------------------------------------------------------------
// replace
// ---------------------------------------------------------------------------

/// Knuth-Morris-Pratt machinery for the replace construction.
struct Kmp {
    pattern: Vec<u8>,
    fail: Vec<usize>,
}

impl Kmp {
    fn new(pattern: Vec<u8>) -> Self {
        let m = pattern.len();
        let mut fail = vec![0usize; m + 1];
        let mut k = 0;
        for i in 1..m {
            while k > 0 && pattern[i] != pattern[k] {
                k = fail[k];
            }
            if pattern[i] == pattern[k] {
                k += 1;
            }
            fail[i + 1] = k;
        }
        Kmp { pattern, fail }
    }

    fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Longest suffix of `p[0..k]·c` that is a prefix of the pattern.
    fn step(&self, k: usize, c: u8) -> usize {
        let mut k = k;
        while k > 0 && self.pattern[k] != c {
            k = self.fail[k];
        }
        if self.pattern[k] == c {
            k + 1
        } else {
            0
        }
    }

    /// Groups all bytes by the state `step(k, ·)` sends them to.
    fn byte_classes(&self, k: usize) -> Vec<(usize, CharSet)> {
        let mut groups: HashMap<usize, Vec<u8>> = HashMap::new();
        for c in 0..=255u8 {
            groups.entry(self.step(k, c)).or_default().push(c);
        }
        let mut out: Vec<(usize, CharSet)> = groups
            .into_iter()
            .map(|(k2, bytes)| (k2, CharSet::from_bytes(&bytes)))
            .collect();
        out.sort_by_key(|&(k2, _)| k2);
        out
    }

    /// Output bytes flushed when moving from pending prefix `k` to `k2 < m`.
    ///
    /// The machine buffers `p[0..k]`; after reading `c` it retains `p[0..k2]`
    /// as the new buffer. For `k2 > 0` the retained suffix ends at `c`, so
    /// the flushed bytes are a prefix of the pattern; for `k2 == 0` the whole
    /// buffer flushes and `c` itself follows (the caller echoes it).
    fn flushed(&self, k: usize, k2: usize) -> &[u8] {
        if k2 == 0 {
            &self.pattern[..k]
        } else {
            &self.pattern[..k + 1 - k2]
        }
    }
}

fn literal_search(search: &Automaton) -> Result<Option<Vec<u8>>> {
    if search.is_empty() {
        return Ok(None);
    }
    let pattern = search
        .as_literal()
        .ok_or_else(|| AnalysisError::UnsupportedOperation("replace with a non-literal search language".into()))?;
    if pattern.is_empty() {
        // An empty needle matches nowhere.
        return Ok(None);
    }
    Ok(Some(pattern))
}

/// Post-image of greedy, non-overlapping, left-to-right replacement:
/// every occurrence of the (literal) `search` string in a member of
/// `L(subject)` is replaced by any member of `L(replacement)`.
pub fn replace(subject: &Automaton, search: &Automaton, replacement: &Automaton) -> Result<Automaton> {
    let Some(pattern) = literal_search(search)? else {
        return Ok(subject.clone());
    };
    if replacement.is_empty() {
        // No output exists for inputs containing the pattern; the rest pass
        // through untouched.
        return Ok(subject.intersect(&Automaton::contains(&pattern).complement()));
    }
    let kmp = Kmp::new(pattern);
    let m = kmp.len();

    let mut nfa = Nfa::new();
    let mut pairs: HashMap<(StateId, usize), StateId> = HashMap::new();
    let mut queue = VecDeque::new();

    let entry = nfa.add_state(false);
    pairs.insert((0, 0), entry);
    nfa.add_epsilon(0, entry);
    queue.push_back((0usize, 0usize));

    // Fresh accepting state; buffered suffix flushes converge here.
    let finish = nfa.add_state(true);

    while let Some((s, k)) = queue.pop_front() {
        let p = pairs[&(s, k)];
        if subject.is_accepting(s) {
            // End of input: the pending prefix is emitted verbatim.
            if k == 0 {
                nfa.accepting[p] = true;
            } else {
                let mut cur = p;
                for &b in &kmp.pattern[..k] {
                    let next = nfa.add_state(false);
                    nfa.add_move(cur, CharSet::singleton(b), next);
                    cur = next;
                }
                nfa.add_epsilon(cur, finish);
            }
        }
        for tr in subject.transitions_from(s) {
            for (k2, class) in kmp.byte_classes(k) {
                let g = class.intersect(tr.label);
                if g.is_empty() {
                    continue;
                }
                if k2 == m {
                    // Occurrence completed: splice in the replacement language.
                    let dst_key = (tr.target, 0);
                    let dst = *pairs.entry(dst_key).or_insert_with(|| {
                        queue.push_back(dst_key);
                        nfa.add_state(false)
                    });
                    let off = nfa.embed(replacement);
                    nfa.add_epsilon(p, off);
                    for rs in 0..replacement.num_states() {
                        if replacement.is_accepting(rs) {
                            nfa.add_epsilon(off + rs, dst);
                        }
                    }
                } else {
                    let dst_key = (tr.target, k2);
                    let dst = *pairs.entry(dst_key).or_insert_with(|| {
                        queue.push_back(dst_key);
                        nfa.add_state(false)
                    });
                    let flushed = kmp.flushed(k, k2).to_vec();
                    let mut cur = p;
                    for &b in &flushed {
                        let next = nfa.add_state(false);
                        nfa.add_move(cur, CharSet::singleton(b), next);
                        cur = next;
                    }
                    if k2 == 0 {
                        // The mismatching byte itself is echoed last.
                        nfa.add_move(cur, g, dst);
                    } else {
                        nfa.add_epsilon(cur, dst);
                    }
                }
            }
        }
    }
    Ok(nfa.determinize())
}

/// Pre-image of [`replace`]: `{w : replace(w) ∈ L(image)}`.
pub fn replace_inverse(image: &Automaton, search: &Automaton, replacement: &Automaton) -> Result<Automaton> {
    let Some(pattern) = literal_search(search)? else {
        return Ok(image.clone());
    };
    let kmp = Kmp::new(pattern);
    let m = kmp.len();

    // For each image state x: the states reachable by reading some member of
    // the replacement language.
    let all: Vec<StateId> = (0..image.num_states()).collect();
    let mut reach: Vec<Vec<StateId>> = vec![Vec::new(); image.num_states()];
    for (x, y) in image.reachable_via(replacement, &all) {
        reach[x].push(y);
    }

    let mut nfa = Nfa::new();
    let mut pairs: HashMap<(StateId, usize), StateId> = HashMap::new();
    let mut queue = VecDeque::new();

    let entry = nfa.add_state(false);
    pairs.insert((0, 0), entry);
    nfa.add_epsilon(0, entry);
    queue.push_back((0usize, 0usize));

    while let Some((s, k)) = queue.pop_front() {
        let p = pairs[&(s, k)];
        // Accept iff flushing the pending prefix lands the image in an
        // accepting state.
        if let Some(end) = image.run_from(s, &kmp.pattern[..k]) {
            if image.is_accepting(end) {
                nfa.accepting[p] = true;
            }
        }
        for (k2, class) in kmp.byte_classes(k) {
            if k2 == m {
                // The image reads some replacement string.
                for &s2 in &reach[s] {
                    let dst_key = (s2, 0);
                    let dst = *pairs.entry(dst_key).or_insert_with(|| {
                        queue.push_back(dst_key);
                        nfa.add_state(false)
                    });
                    nfa.add_move(p, class, dst);
                }
            } else {
                let flushed = kmp.flushed(k, k2).to_vec();
                let Some(s1) = image.run_from(s, &flushed) else {
                    continue;
                };
                if k2 == 0 {
                    // The image additionally reads the echoed byte.
                    for tr in image.transitions_from(s1) {
                        let g = class.intersect(tr.label);
                        if g.is_empty() {
                            continue;
                        }
                        let dst_key = (tr.target, 0);
                        let dst = *pairs.entry(dst_key).or_insert_with(|| {
                            queue.push_back(dst_key);
                            nfa.add_state(false)
                        });
                        nfa.add_move(p, g, dst);
                    }
                } else {
                    let dst_key = (s1, k2);
                    let dst = *pairs.entry(dst_key).or_insert_with(|| {
                        queue.push_back(dst_key);
                        nfa.add_state(false)
                    });
                    nfa.add_move(p, class, dst);
                }
            }
        }
    }
    Ok(nfa.determinize())
}

// ---------------------------------------------------------------------------
// trim / substring
// ---------------------------------------------------------------------------

/// ε together with all strings that neither start nor end in whitespace.
fn no_edge_whitespace() -> Automaton {
    let ws = CharSet::whitespace();
    let nonws = ws.complement();
    let mut nfa = Nfa::new();
    nfa.accepting[0] = true;
    let good = nfa.add_state(true);
    let mid = nfa.add_state(false);
    nfa.add_move(0, nonws, good);
    nfa.add_move(good, nonws, good);
    nfa.add_move(good, ws, mid);
    nfa.add_move(mid, nonws, good);
    nfa.add_move(mid, ws, mid);
    nfa.determinize()
}

/// Σ* over whitespace only.
fn whitespace_star() -> Automaton {
    let mut nfa = Nfa::new();
    nfa.accepting[0] = true;
    nfa.add_move(0, CharSet::whitespace(), 0);
    nfa.determinize()
}

/// States reachable from `seeds` along edges that admit a whitespace byte.
fn whitespace_closure(a: &Automaton, seeds: Vec<StateId>, reverse: bool) -> Vec<StateId> {
    let ws = CharSet::whitespace();
    let n = a.num_states();
    let mut adj: Vec<Vec<StateId>> = vec![Vec::new(); n];
    for s in 0..n {
        for tr in a.transitions_from(s) {
            if !tr.label.intersect(ws).is_empty() {
                if reverse {
                    adj[tr.target].push(s);
                } else {
                    adj[s].push(tr.target);
                }
            }
        }
    }
    let mut seen = vec![false; n];
    let mut queue: VecDeque<StateId> = seeds.into();
    for &s in &queue {
        seen[s] = true;
    }
    while let Some(s) = queue.pop_front() {
        for &t in &adj[s] {
            if !seen[t] {
                seen[t] = true;
                queue.push_back(t);
            }
        }
    }
    (0..n).filter(|&s| seen[s]).collect()
}

/// Post-image of PHP `trim`: strip leading and trailing whitespace.
pub fn trim(a: &Automaton) -> Automaton {
    if a.is_empty() {
        return Automaton::empty();
    }
    let starts = whitespace_closure(a, vec![0], false);
    let accepting_seeds: Vec<StateId> = (0..a.num_states()).filter(|&s| a.is_accepting(s)).collect();
    let flushable = whitespace_closure(a, accepting_seeds, true);

    let mut nfa = Nfa::new();
    let off = nfa.embed(a);
    for s in starts {
        nfa.add_epsilon(0, off + s);
    }
    for s in flushable {
        nfa.accepting[off + s] = true;
    }
    // The embedded automaton still accepts strings with whitespace at the
    // edges; cut those off.
    nfa.determinize().intersect(&no_edge_whitespace())
}

/// Pre-image of [`trim`]: `{w : trim(w) ∈ L(b)}` = ws* · (B ∩ no-edge-ws) · ws*.
pub fn trim_inverse(b: &Automaton) -> Automaton {
    let ws_star = whitespace_star();
    let core = b.intersect(&no_edge_whitespace());
    ws_star.concat(&core).concat(&ws_star)
}

/// Σ^n.
fn sigma_exact(n: usize) -> Automaton {
    let mut nfa = Nfa::new();
    let mut cur = 0;
    for _ in 0..n {
        let next = nfa.add_state(false);
        nfa.add_move(cur, CharSet::universe(), next);
        cur = next;
    }
    nfa.accepting[cur] = true;
    nfa.determinize()
}

/// Σ^0 ∪ … ∪ Σ^n.
fn sigma_up_to(n: usize) -> Automaton {
    let mut nfa = Nfa::new();
    nfa.accepting[0] = true;
    let mut cur = 0;
    for _ in 0..n {
        let next = nfa.add_state(true);
        nfa.add_move(cur, CharSet::universe(), next);
        cur = next;
    }
    nfa.determinize()
}

/// Post-image of `substr(w, start, len)`.
///
/// Inputs shorter than `start` yield the empty string.
pub fn substring(a: &Automaton, start: usize, len: Option<usize>) -> Automaton {
    if a.is_empty() {
        return Automaton::empty();
    }
    // States reachable by exactly `start` bytes, and whether some shorter
    // input ends (accepting) before the offset.
    let mut frontier: Vec<bool> = vec![false; a.num_states()];
    frontier[0] = true;
    let mut short_input = a.is_accepting(0);
    for _ in 0..start {
        let mut next = vec![false; a.num_states()];
        for s in 0..a.num_states() {
            if !frontier[s] {
                continue;
            }
            for tr in a.transitions_from(s) {
                next[tr.target] = true;
            }
        }
        frontier = next;
        short_input = short_input || (0..a.num_states()).any(|s| frontier[s] && a.is_accepting(s));
    }

    let mut nfa = Nfa::new();
    if short_input {
        nfa.accepting[0] = true;
    }
    match len {
        None => {
            let off = nfa.embed(a);
            for s in 0..a.num_states() {
                if frontier[s] {
                    nfa.add_epsilon(0, off + s);
                }
                if a.is_accepting(s) {
                    nfa.accepting[off + s] = true;
                }
            }
        }
        Some(len) => {
            // Copy `len` bytes; in canonical automata every state can reach
            // acceptance, so stopping after `len` bytes is always viable.
            let mut layer: HashMap<StateId, StateId> = HashMap::new();
            for s in 0..a.num_states() {
                if frontier[s] {
                    let ns = nfa.add_state(a.is_accepting(s));
                    nfa.add_epsilon(0, ns);
                    layer.insert(s, ns);
                }
            }
            for _ in 0..len {
                let mut next_layer: HashMap<StateId, StateId> = HashMap::new();
                for (&s, &ns) in &layer {
                    for tr in a.transitions_from(s) {
                        let nt = *next_layer
                            .entry(tr.target)
                            .or_insert_with(|| nfa.add_state(a.is_accepting(tr.target)));
                        nfa.add_move(ns, tr.label, nt);
                    }
                }
                layer = next_layer;
            }
            for (_, &ns) in &layer {
                nfa.accepting[ns] = true;
            }
        }
    }
    nfa.determinize()
}

/// Pre-image of [`substring`]: `{w : substr(w, start, len) ∈ L(b)}`.
pub fn substring_inverse(b: &Automaton, start: usize, len: Option<usize>) -> Automaton {
    let prefix = sigma_exact(start);
    let mut pre = match len {
        None => prefix.concat(b),
        Some(len) => {
            let full = b.intersect(&sigma_exact(len)).concat(&Automaton::any_string());
            let cut_short = if len > 0 { b.intersect(&sigma_up_to(len - 1)) } else { Automaton::empty() };
            prefix.concat(&full.union(&cut_short))
        }
    };
    if b.contains_empty_string() && start > 0 {
        // Inputs shorter than the offset produce the empty string.
        pre = pre.union(&sigma_up_to(start - 1));
    }
    pre
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_special_chars_modes() {
        let input = Automaton::literal(b"<a href=\"x\">'O'&/");
        use HtmlSpecialCharsMode::*;

        let nq = Transducer::html_special_chars(NoQuotes).apply(&input);
        assert_eq!(nq.as_literal(), Some(b"&lt;a href=\"x\"&gt;'O'&amp;/".to_vec()));

        let compat = Transducer::html_special_chars(Compat).apply(&input);
        assert_eq!(compat.as_literal(), Some(b"&lt;a href=&quot;x&quot;&gt;'O'&amp;/".to_vec()));

        let quotes = Transducer::html_special_chars(Quotes).apply(&input);
        assert_eq!(
            quotes.as_literal(),
            Some(b"&lt;a href=&quot;x&quot;&gt;&#039;O&#039;&amp;/".to_vec())
        );

        let slash = Transducer::html_special_chars(Slash).apply(&input);
        assert_eq!(
            slash.as_literal(),
            Some(b"&lt;a href=&quot;x&quot;&gt;&#039;O&#039;&amp;&#47;".to_vec())
        );
    }

    #[test]
    fn test_escape_html_tags() {
        let out = Transducer::escape_html_tags().apply(&Automaton::literal(b"<b>\"&"));
        assert_eq!(out.as_literal(), Some(b"&lt;b&gt;\"&".to_vec()));
    }

    #[test]
    fn test_encode_uri_component() {
        let out = Transducer::encode_uri_component().apply(&Automaton::literal(b"a b/c!"));
        assert_eq!(out.as_literal(), Some(b"a%20b%2Fc!".to_vec()));
    }

    #[test]
    fn test_add_slashes() {
        let out = Transducer::add_slashes().apply(&Automaton::literal(b"it's \\ \"x\""));
        assert_eq!(out.as_literal(), Some(b"it\\'s \\\\ \\\"x\\\"".to_vec()));
    }

    #[test]
    fn test_case_folding() {
        let lower = Transducer::to_lower_case().apply(&Automaton::literal(b"MiXeD 42"));
        assert_eq!(lower.as_literal(), Some(b"mixed 42".to_vec()));
        let upper = Transducer::to_upper_case().apply(&Automaton::literal(b"MiXeD 42"));
        assert_eq!(upper.as_literal(), Some(b"MIXED 42".to_vec()));
    }

    #[test]
    fn test_apply_on_language() {
        // Encoding Σ* must not accept a bare "<".
        let image = Transducer::html_special_chars(HtmlSpecialCharsMode::Quotes).apply(&Automaton::any_string());
        assert!(!image.accepts(b"<"));
        assert!(image.accepts(b"&lt;"));
        assert!(image.accepts(b"plain"));
        assert!(image.accepts(b""));
        // "&" alone is never produced, it always comes out as "&amp;".
        assert!(!image.accepts(b"&"));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transducer::html_special_chars(HtmlSpecialCharsMode::Quotes);
        let a = Automaton::literal(b"<x>").union(&Automaton::literal(b"ok"));
        let image = t.apply(&a);
        let back = t.inverse(&image);
        // T⁻¹(T(A)) ⊇ A.
        assert!(a.subset_of(&back));
        assert!(back.accepts(b"<x>"));
        assert!(back.accepts(b"ok"));
    }

    #[test]
    fn test_inverse_picks_sources() {
        let t = Transducer::escape_html_tags();
        // Who maps into "&lt;"? Both "<" and the literal text "&lt;".
        let pre = t.inverse(&Automaton::literal(b"&lt;"));
        assert!(pre.accepts(b"<"));
        assert!(pre.accepts(b"&lt;"));
        assert!(!pre.accepts(b">"));
    }

    #[test]
    fn test_identity() {
        let a = Automaton::literal(b"xyz").union(&Automaton::literal(b"q"));
        assert_eq!(Transducer::identity().apply(&a), a);
        assert_eq!(Transducer::identity().inverse(&a), a);
    }

    #[test]
    fn test_multi_state_composition() {
        // Uppercase only the first byte: a two-state transducer.
        let mut t = Transducer::new(2);
        t.set_accepting(0, true);
        t.set_accepting(1, true);
        for c in 0..=255u8 {
            let out = if c.is_ascii_lowercase() {
                Output::Chars(vec![c - 32])
            } else {
                Output::Copy
            };
            t.add_rule(0, CharSet::singleton(c), out, 1);
        }
        t.add_rule(1, CharSet::universe(), Output::Copy, 1);
        assert_eq!(t.num_states(), 2);

        let out = t.apply(&Automaton::literal(b"hello"));
        assert_eq!(out.as_literal(), Some(b"Hello".to_vec()));

        let pre = t.inverse(&Automaton::literal(b"Hi"));
        assert!(pre.accepts(b"hi"));
        assert!(pre.accepts(b"Hi"));
        assert!(!pre.accepts(b"hI"));
    }

    #[test]
    fn test_replace_literal() {
        let subject = Automaton::literal(b"xabay");
        let out = replace(&subject, &Automaton::literal(b"ab"), &Automaton::literal(b"_")).expect("literal search");
        assert_eq!(out.as_literal(), Some(b"x_ay".to_vec()));
    }

    #[test]
    fn test_replace_greedy_left_to_right() {
        // Overlapping occurrences: "aaa" with pattern "aa" replaces the
        // leftmost pair only.
        let out = replace(
            &Automaton::literal(b"aaa"),
            &Automaton::literal(b"aa"),
            &Automaton::literal(b"b"),
        )
        .expect("literal search");
        assert_eq!(out.as_literal(), Some(b"ba".to_vec()));
    }

    #[test]
    fn test_replace_no_rescan() {
        // The replacement is not rescanned: "ab" -> "ab" stays put even
        // though the output contains the pattern.
        let out = replace(
            &Automaton::literal(b"cabc"),
            &Automaton::literal(b"ab"),
            &Automaton::literal(b"ab"),
        )
        .expect("literal search");
        assert_eq!(out.as_literal(), Some(b"cabc".to_vec()));
    }

    #[test]
    fn test_replace_language_replacement() {
        // Replacement by a language: x -> {y, z}.
        let out = replace(
            &Automaton::literal(b"axa"),
            &Automaton::literal(b"x"),
            &Automaton::literal(b"y").union(&Automaton::literal(b"z")),
        )
        .expect("literal search");
        assert!(out.accepts(b"aya"));
        assert!(out.accepts(b"aza"));
        assert!(!out.accepts(b"axa"));
    }

    #[test]
    fn test_replace_deletion() {
        // Deleting the pattern: replacement is {ε}.
        let out = replace(
            &Automaton::literal(b"a<b<c"),
            &Automaton::literal(b"<"),
            &Automaton::epsilon(),
        )
        .expect("literal search");
        assert_eq!(out.as_literal(), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_replace_rejects_non_literal() {
        let err = replace(
            &Automaton::any_string(),
            &Automaton::literal(b"a").union(&Automaton::literal(b"b")),
            &Automaton::epsilon(),
        )
        .expect_err("non-literal search");
        assert!(matches!(err, AnalysisError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_replace_inverse() {
        // Forward: "ab" -> "_". Backward from {x_y}: inputs are "xaby" and
        // any input already spelling "x_y".
        let search = Automaton::literal(b"ab");
        let repl = Automaton::literal(b"_");
        let pre = replace_inverse(&Automaton::literal(b"x_y"), &search, &repl).expect("literal search");
        assert!(pre.accepts(b"xaby"));
        assert!(pre.accepts(b"x_y"));
        assert!(!pre.accepts(b"xab"));

        // Round trip: A ⊆ replace⁻¹(replace(A)).
        let a = Automaton::literal(b"zabz").union(&Automaton::literal(b"nope"));
        let fwd = replace(&a, &search, &repl).expect("literal search");
        let back = replace_inverse(&fwd, &search, &repl).expect("literal search");
        assert!(a.subset_of(&back));
    }

    #[test]
    fn test_trim() {
        let out = trim(&Automaton::literal(b"  hi \t"));
        assert_eq!(out.as_literal(), Some(b"hi".to_vec()));

        let ws_only = trim(&Automaton::literal(b" \n "));
        assert_eq!(ws_only.as_literal(), Some(Vec::new()));

        // Interior whitespace survives.
        let mid = trim(&Automaton::literal(b" a b "));
        assert_eq!(mid.as_literal(), Some(b"a b".to_vec()));
    }

    #[test]
    fn test_trim_inverse() {
        let pre = trim_inverse(&Automaton::literal(b"hi"));
        assert!(pre.accepts(b"hi"));
        assert!(pre.accepts(b"  hi"));
        assert!(pre.accepts(b"hi \t "));
        assert!(!pre.accepts(b"h i"));

        // trim(w) = "" only for all-whitespace inputs.
        let pre_empty = trim_inverse(&Automaton::epsilon());
        assert!(pre_empty.accepts(b""));
        assert!(pre_empty.accepts(b"   "));
        assert!(!pre_empty.accepts(b" x "));
    }

    #[test]
    fn test_substring() {
        let a = Automaton::literal(b"abcdef");
        assert_eq!(substring(&a, 1, Some(3)).as_literal(), Some(b"bcd".to_vec()));
        assert_eq!(substring(&a, 4, None).as_literal(), Some(b"ef".to_vec()));
        assert_eq!(substring(&a, 4, Some(10)).as_literal(), Some(b"ef".to_vec()));
        // Offset past the end yields the empty string.
        assert_eq!(substring(&a, 10, None).as_literal(), Some(Vec::new()));
    }

    #[test]
    fn test_substring_inverse() {
        let pre = substring_inverse(&Automaton::literal(b"bc"), 1, Some(2));
        assert!(pre.accepts(b"abc"));
        assert!(pre.accepts(b"abcdef"));
        assert!(pre.accepts(b"xbc"));
        assert!(!pre.accepts(b"bc"));

        let a = Automaton::literal(b"abcdef");
        let fwd = substring(&a, 2, Some(2));
        let back = substring_inverse(&fwd, 2, Some(2));
        assert!(a.subset_of(&back));
    }
}
