//! Algebraic properties of the automaton and transducer layers.

use semattack::attack;
use semattack::automaton::Automaton;
use semattack::transducer::{HtmlSpecialCharsMode, Transducer};

fn samples() -> Vec<Automaton> {
    vec![
        Automaton::empty(),
        Automaton::epsilon(),
        Automaton::any_string(),
        Automaton::literal(b"a"),
        Automaton::literal(b"<script>"),
        Automaton::literal(b"ab").union(&Automaton::literal(b"cd")),
        Automaton::contains(b"<"),
        Automaton::literal(b"x").kleene_star(),
    ]
}

#[test]
fn complement_is_an_involution() {
    for a in samples() {
        assert_eq!(a.complement().complement(), a);
    }
}

#[test]
fn union_and_intersection_behave_like_set_ops() {
    let words: &[&[u8]] = &[b"", b"a", b"ab", b"cd", b"<", b"<script>", b"xx", b"zzz"];
    for a in samples() {
        for b in samples() {
            let u = a.union(&b);
            let i = a.intersect(&b);
            for &w in words {
                assert_eq!(u.accepts(w), a.accepts(w) || b.accepts(w), "union on {:?}", w);
                assert_eq!(i.accepts(w), a.accepts(w) && b.accepts(w), "intersection on {:?}", w);
            }
        }
    }
}

#[test]
fn de_morgan_holds() {
    let a = Automaton::contains(b"<");
    let b = Automaton::literal(b"x").kleene_star();
    let left = a.union(&b).complement();
    let right = a.complement().intersect(&b.complement());
    assert_eq!(left, right);
}

#[test]
fn emptiness_agrees_with_sampling() {
    for a in samples() {
        assert_eq!(a.is_empty(), a.sample().is_none());
    }
    // A sample, when present, is a member.
    for a in samples() {
        if let Some(w) = a.sample() {
            assert!(a.accepts(&w), "sample {:?} not accepted", w);
        }
    }
}

#[test]
fn union_with_empty_string_contains_epsilon() {
    for a in samples() {
        assert!(a.union_with_empty_string().contains_empty_string());
    }
}

#[test]
fn canonical_form_is_stable() {
    // Operations that do not change the language return the same structure.
    for a in samples() {
        assert_eq!(a.union(&a), a);
        assert_eq!(a.intersect(&a), a);
        assert_eq!(a.union(&Automaton::empty()), a);
        assert_eq!(a.intersect(&Automaton::any_string()), a);
    }
}

fn library_transducers() -> Vec<(&'static str, Transducer)> {
    vec![
        ("htmlspecialchars-noquotes", Transducer::html_special_chars(HtmlSpecialCharsMode::NoQuotes)),
        ("htmlspecialchars-compat", Transducer::html_special_chars(HtmlSpecialCharsMode::Compat)),
        ("htmlspecialchars-quotes", Transducer::html_special_chars(HtmlSpecialCharsMode::Quotes)),
        ("htmlspecialchars-slash", Transducer::html_special_chars(HtmlSpecialCharsMode::Slash)),
        ("escape-html-tags", Transducer::escape_html_tags()),
        ("encode-uri-component", Transducer::encode_uri_component()),
        ("addslashes", Transducer::add_slashes()),
        ("strtolower", Transducer::to_lower_case()),
        ("strtoupper", Transducer::to_upper_case()),
    ]
}

#[test]
fn images_stay_inside_the_full_image() {
    // T(A) ⊆ T(Σ*) for every library transducer.
    let inputs = [
        Automaton::literal(b"<a href='x'>"),
        Automaton::literal(b"plain"),
        Automaton::contains(b"\""),
        Automaton::epsilon(),
    ];
    for (name, t) in library_transducers() {
        let full_image = t.apply(&Automaton::any_string());
        for a in &inputs {
            assert!(t.apply(a).subset_of(&full_image), "transducer {}", name);
        }
    }
}

#[test]
fn inverse_covers_the_original() {
    // T⁻¹(T(A)) ⊇ A for every library transducer.
    let inputs = [
        Automaton::literal(b"<a href='x'>"),
        Automaton::literal(b"a&b"),
        Automaton::literal(b"MiXeD case"),
        Automaton::literal(b"ab").union(&Automaton::literal(b"c/d")),
    ];
    for (name, t) in library_transducers() {
        for a in &inputs {
            let image = t.apply(a);
            let back = t.inverse(&image);
            assert!(a.subset_of(&back), "transducer {}", name);
        }
    }
}

#[test]
fn catalogue_allowed_and_attack_partition() {
    // For every allowed-language regex, allowed ∩ attack = ∅, and together
    // they cover Σ*.
    for pattern in [
        attack::HTML_ESCAPED,
        attack::HTML_MINIMAL,
        attack::HTML_MEDIUM,
        attack::HTML_ATTR_ESCAPED,
        attack::JAVASCRIPT_ESCAPED,
        attack::URL_ESCAPED,
    ] {
        let allowed = attack::allowed_from_regex(pattern).expect(pattern);
        let attack_lang = attack::attack_from_allowed(pattern).expect(pattern);
        assert!(allowed.intersect(&attack_lang).is_empty(), "pattern {}", pattern);
        assert_eq!(allowed.union(&attack_lang), Automaton::any_string(), "pattern {}", pattern);
    }
}

#[test]
fn quotient_round_trip() {
    // (A · B) right-quotient B ⊇ A, and symmetrically on the left.
    let a = Automaton::literal(b"pre").union(&Automaton::literal(b"p"));
    let b = Automaton::literal(b"fix").union(&Automaton::literal(b"f"));
    let ab = a.concat(&b);
    assert!(a.subset_of(&ab.right_quotient(&b)));
    assert!(b.subset_of(&ab.left_quotient(&a)));
}
