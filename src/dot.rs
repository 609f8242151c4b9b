//! Graphviz rendering of automata.

use std::fmt::Write as _;

use crate::automaton::Automaton;

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders the automaton as a DOT digraph.
///
/// Accepting states are double circles; transition labels use character
/// class notation (see [`crate::alphabet::CharSet`]'s `Display`).
pub fn automaton_to_dot(a: &Automaton, name: &str) -> Result<String, std::fmt::Error> {
    let mut dot = String::new();
    writeln!(dot, "digraph {} {{", name)?;
    writeln!(dot, "rankdir=LR;")?;
    writeln!(dot, "node [shape=circle, fontname=\"monospace\"];")?;

    // Initial-state marker
    writeln!(dot, "init [shape=point, label=\"\"];")?;
    writeln!(dot, "init -> 0;")?;

    for s in 0..a.num_states() {
        if a.is_accepting(s) {
            writeln!(dot, "{} [shape=doublecircle];", s)?;
        }
    }

    for s in 0..a.num_states() {
        for tr in a.transitions_from(s) {
            let label = escape_label(&tr.label.to_string());
            writeln!(dot, "{} -> {} [label=\"{}\"];", s, tr.target, label)?;
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_structure() {
        let a = Automaton::literal(b"ab");
        let dot = automaton_to_dot(&a, "lit").expect("writing to a string");
        assert!(dot.starts_with("digraph lit {"));
        assert!(dot.contains("init -> 0;"));
        assert!(dot.contains("doublecircle"));
        assert!(dot.contains("0 -> 1 [label=\"a\"];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_escapes_quotes() {
        let a = Automaton::literal(b"\"");
        let dot = automaton_to_dot(&a, "q").expect("writing to a string");
        assert!(dot.contains("label=\"\\\"\""));
    }
}
