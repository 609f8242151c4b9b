//! # semattack: semantic differential string analysis
//!
//! **`semattack`** decides whether a web sanitizer can be bypassed. Given a
//! dependency graph describing how an untrusted input flows through a chain
//! of string operations to an output sink, it answers: *does some input
//! exist whose image at the sink matches a known attack pattern?* — and if
//! so, *which inputs?*
//!
//! ## How it works
//!
//! Sets of strings are represented as symbolic finite automata over the
//! 8-bit alphabet, with transition labels drawn from a hash-consed BDD
//! substrate:
//!
//! 1. A **forward pass** computes the post-image of Σ* through the graph:
//!    the language of everything the sink can display.
//! 2. The post-image is **intersected with an attack pattern** — the
//!    complement of a context-specific allowed-language regex (HTML body,
//!    HTML attribute, JavaScript string, URL component, ...).
//! 3. A non-trivial intersection means the sanitizer leaks; a **backward
//!    pass** then inverts every operation to characterize the vulnerable
//!    inputs and produce a concrete witness.
//!
//! Sanitizers (`htmlspecialchars`, `encodeURIComponent`, `str_replace`,
//! `trim`, ...) are modeled as finite-state transducers, which makes both
//! the image and the inverse image computable exactly.
//!
//! ## Example
//!
//! ```rust
//! use semattack::analysis::{BackwardAnalysis, ForwardAnalysis};
//! use semattack::attack::AttackContext;
//! use semattack::depgraph::{DepGraphBuilder, StringOp};
//! use semattack::evaluator::{CancellationToken, EvalConfig};
//! use semattack::transducer::HtmlSpecialCharsMode;
//!
//! // $sink = htmlspecialchars($x, ENT_NOQUOTES)
//! let mut b = DepGraphBuilder::new();
//! let x = b.uninit("x");
//! let enc = b.op(StringOp::HtmlSpecialChars(HtmlSpecialCharsMode::NoQuotes), [x]);
//! b.sink(enc);
//! let graph = b.build().unwrap();
//!
//! let config = EvalConfig::default();
//! let token = CancellationToken::new();
//! let forward = ForwardAnalysis::run(&graph, "x", None, &config, &token).unwrap();
//!
//! // Tags are encoded: the HTML-body context is clean...
//! let html = BackwardAnalysis::run(&graph, &forward, AttackContext::HtmlMinimal, &config, &token).unwrap();
//! assert!(html.is_safe());
//!
//! // ...but quotes pass through: attribute injection remains possible.
//! let attr = BackwardAnalysis::run(&graph, &forward, AttackContext::HtmlAttr, &config, &token).unwrap();
//! assert!(attr.is_vulnerable());
//! assert!(attr.pre_image().accepts(b"\""));
//! assert!(attr.witness().is_some());
//! ```
//!
//! ## Core components
//!
//! - **[`alphabet`]** / **[`bdd`]**: character predicates as hash-consed
//!   BDDs over the bits of a byte.
//! - **[`automaton`]**: the symbolic DFA algebra (union, intersection,
//!   complement, concatenation, quotients, sampling).
//! - **[`regex`]**: the slash-delimited regex dialect of the catalogue.
//! - **[`transducer`]**: sanitizer models and their inverses.
//! - **[`attack`]**: the context → attack-pattern catalogue.
//! - **[`depgraph`]** / **[`evaluator`]**: the dependency graph and the
//!   forward/backward fixpoint passes over it.
//! - **[`analysis`]**: the driver tying everything together.

pub mod alphabet;
pub mod analysis;
pub mod attack;
pub mod automaton;
pub mod bdd;
pub mod cache;
pub mod depgraph;
pub mod domain;
pub mod dot;
pub mod error;
pub mod evaluator;
pub mod reference;
pub mod regex;
pub mod storage;
pub mod transducer;
pub mod utils;

// Re-exports for convenience
pub use alphabet::CharSet;
pub use analysis::{AttackSpec, BackwardAnalysis, CombinedAnalysis, ForwardAnalysis, Verdict};
pub use attack::AttackContext;
pub use automaton::Automaton;
pub use depgraph::{DepGraph, DepGraphBuilder, NodeId, NodeKind, StringOp};
pub use error::{AnalysisError, Result};
pub use evaluator::{AnalysisResult, CancellationToken, EvalConfig};
pub use transducer::{HtmlSpecialCharsMode, Transducer};
