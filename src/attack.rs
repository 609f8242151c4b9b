//! The attack-pattern catalogue.
//!
//! Each [`AttackContext`] names a place in an HTML/JS/URL document where a
//! sink value may be emitted, and maps to an automaton whose language is the
//! set of strings an adversary can abuse there. Most patterns are built as
//! the *complement* of an allowed-language regex: the regex describes what a
//! correctly sanitized output may look like, everything else is an attack.
//!
//! The catalogue is a process-wide table built on first use; the automata in
//! it are immutable and shared by reference.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::automaton::Automaton;
use crate::error::{AnalysisError, Result};
use crate::regex;
use crate::transducer::{HtmlSpecialCharsMode, Transducer};

// Allowed-language regexes. The escaping is part of the contract; they are
// reproduced byte-for-byte.

/// Escaped ampersands only.
pub const HTML_ESCAPED_AMPERSAND: &str = r"/([^&]+|(&[a-zA-Z]+;|&#[xX][0-9a-fA-F]+;|&#[0-9]+;)+)+/";
/// Allowed characters in inner HTML according to OWASP.
pub const HTML_ESCAPED: &str = r#"/([^<>'"&\/]+|(&[a-zA-Z]+;|&#[xX][0-9a-fA-F]+;|&#[0-9]+;)+)+/"#;
/// Tags escaped, nothing else.
pub const HTML_MINIMAL: &str = r"/[^<>]+/";
/// Tags and quotes escaped.
pub const HTML_MEDIUM: &str = r#"/[^<>'"]+/"#;
/// Slash left alone.
pub const HTML_ESCAPED_NO_SLASH: &str = r#"/([^<>'"&]+|(&[a-zA-Z]+;|&#[xX][0-9a-fA-F]+;|&#[0-9]+;)+)+/"#;
/// Backtick escaped as well.
pub const HTML_ESCAPED_BACKTICK: &str = r#"/([^<>'"&`]+|(&[a-zA-Z]+;|&#[xX][0-9a-fA-F]+;|&#[0-9]+;)+)+/"#;
/// Allowed characters in an HTML attribute.
pub const HTML_ATTR_ESCAPED: &str = r#"/([^\s%*+,\-\/;<=>\^'"\|]+|((&[a-zA-Z]+;|&#[xX][0-9a-fA-F]+;|&#[0-9]+;)))+/"#;
/// Allowed characters in a JavaScript string.
pub const JAVASCRIPT_ESCAPED: &str = r"/([a-zA-Z0-9,._\s]+|((\\u[a-fA-F0-9]{4})|(\\x[a-fA-F0-9]{2})))+/";
/// Quotes and backslashes escaped with slashes.
pub const SLASH_ESCAPE_QUOTES: &str = r#"/([^\\"']|((\\\\)|(\\")|(\\')))+/"#;
/// Allowed characters in a URL component.
pub const URL_ESCAPED: &str = r"/([a-zA-Z0-9-_.!~*'()]+|((%[a-fA-F0-9]{2})))+/";

/// Dangerous characters removed rather than escaped.
pub const HTML_REMOVED: &str = r#"/[^<>'"&\/]*/"#;
pub const HTML_REMOVED_NO_SLASH: &str = r#"/[^<>'"&]*/"#;

// Sample payloads.

pub const HTML_PAYLOAD: &str = "<script>alert(1)</script>";
pub const HTML_ATTRIBUTE_PAYLOAD: &str = "\" onload=\"alert(1)";
pub const HTML_SINGLE_QUOTE_ATTRIBUTE_PAYLOAD: &str = "' onload='alert(1)";
pub const URL_PAYLOAD: &str = "javascript:alert(1)";
pub const HTML_POLYGOT_PAYLOAD: &str =
    r#"javascript:/*--></title></style></textarea></script></xmp><svg/onload='+/"/+/onmouseover=1/+/[*/[]/+alert(1)//'>"#;

/// Output contexts with a known attack characterization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttackContext {
    LessThan,
    GreaterThan,
    Ampersand,
    Quote,
    SingleQuote,
    Slash,
    Backtick,
    Equals,
    OpenParen,
    CloseParen,
    Space,
    Comma,
    FullStop,
    Dash,
    Script,
    Alert,
    Html,
    HtmlMedium,
    HtmlMinimal,
    HtmlNoSlash,
    HtmlBacktick,
    HtmlAttr,
    HtmlPayload,
    HtmlAttributePayload,
    HtmlSingleQuoteAttributePayload,
    HtmlPolygotPayload,
    UrlPayload,
    JavaScript,
    JavaScriptMinimal,
    Url,
}

impl AttackContext {
    pub const ALL: [AttackContext; 30] = [
        AttackContext::LessThan,
        AttackContext::GreaterThan,
        AttackContext::Ampersand,
        AttackContext::Quote,
        AttackContext::SingleQuote,
        AttackContext::Slash,
        AttackContext::Backtick,
        AttackContext::Equals,
        AttackContext::OpenParen,
        AttackContext::CloseParen,
        AttackContext::Space,
        AttackContext::Comma,
        AttackContext::FullStop,
        AttackContext::Dash,
        AttackContext::Script,
        AttackContext::Alert,
        AttackContext::Html,
        AttackContext::HtmlMedium,
        AttackContext::HtmlMinimal,
        AttackContext::HtmlNoSlash,
        AttackContext::HtmlBacktick,
        AttackContext::HtmlAttr,
        AttackContext::HtmlPayload,
        AttackContext::HtmlAttributePayload,
        AttackContext::HtmlSingleQuoteAttributePayload,
        AttackContext::HtmlPolygotPayload,
        AttackContext::UrlPayload,
        AttackContext::JavaScript,
        AttackContext::JavaScriptMinimal,
        AttackContext::Url,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AttackContext::LessThan => "LessThan",
            AttackContext::GreaterThan => "GreaterThan",
            AttackContext::Ampersand => "Ampersand",
            AttackContext::Quote => "Quote",
            AttackContext::SingleQuote => "SingleQuote",
            AttackContext::Slash => "Slash",
            AttackContext::Backtick => "Backtick",
            AttackContext::Equals => "Equals",
            AttackContext::OpenParen => "OpenParen",
            AttackContext::CloseParen => "CloseParen",
            AttackContext::Space => "Space",
            AttackContext::Comma => "Comma",
            AttackContext::FullStop => "FullStop",
            AttackContext::Dash => "Dash",
            AttackContext::Script => "Script",
            AttackContext::Alert => "Alert",
            AttackContext::Html => "Html",
            AttackContext::HtmlMedium => "HtmlMedium",
            AttackContext::HtmlMinimal => "HtmlMinimal",
            AttackContext::HtmlNoSlash => "HtmlNoSlash",
            AttackContext::HtmlBacktick => "HtmlBacktick",
            AttackContext::HtmlAttr => "HtmlAttr",
            AttackContext::HtmlPayload => "HtmlPayload",
            AttackContext::HtmlAttributePayload => "HtmlAttributePayload",
            AttackContext::HtmlSingleQuoteAttributePayload => "HtmlSingleQuoteAttributePayload",
            AttackContext::HtmlPolygotPayload => "HtmlPolygotPayload",
            AttackContext::UrlPayload => "UrlPayload",
            AttackContext::JavaScript => "JavaScript",
            AttackContext::JavaScriptMinimal => "JavaScriptMinimal",
            AttackContext::Url => "Url",
        }
    }
}

impl fmt::Display for AttackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttackContext {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        AttackContext::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::UnsupportedOperation(format!("unknown attack context {:?}", s)))
    }
}

/// The language a sanitized output is allowed to be: the regex, plus the
/// empty string.
pub fn allowed_from_regex(pattern: &str) -> Result<Automaton> {
    Ok(regex::compile(pattern)?.union_with_empty_string())
}

/// The attack language for an allowed-language regex: its complement.
///
/// The allowed side always contains ε, so the attack side never does; the
/// intersection of the two is exactly empty.
pub fn attack_from_allowed(pattern: &str) -> Result<Automaton> {
    Ok(allowed_from_regex(pattern)?.complement())
}

/// All strings containing the given text: `.*text.*`.
fn contains_pattern(text: &str) -> Automaton {
    Automaton::contains(text.as_bytes())
}

fn build_pattern(context: AttackContext) -> Result<Automaton> {
    let auto = match context {
        AttackContext::LessThan => contains_pattern("<"),
        AttackContext::GreaterThan => contains_pattern(">"),
        AttackContext::Ampersand => attack_from_allowed(HTML_ESCAPED_AMPERSAND)?,
        AttackContext::Quote => contains_pattern("\""),
        AttackContext::SingleQuote => contains_pattern("'"),
        AttackContext::Slash => contains_pattern("/"),
        AttackContext::Backtick => contains_pattern("`"),
        AttackContext::Equals => contains_pattern("="),
        AttackContext::OpenParen => contains_pattern("("),
        AttackContext::CloseParen => contains_pattern(")"),
        AttackContext::Space => contains_pattern(" "),
        AttackContext::Comma => contains_pattern(","),
        AttackContext::FullStop => contains_pattern("."),
        AttackContext::Dash => contains_pattern("-"),
        AttackContext::Script => contains_pattern("script"),
        AttackContext::Alert => contains_pattern("alert"),
        AttackContext::Html => attack_from_allowed(HTML_ESCAPED)?,
        AttackContext::HtmlMedium => attack_from_allowed(HTML_MEDIUM)?,
        AttackContext::HtmlMinimal => attack_from_allowed(HTML_MINIMAL)?,
        AttackContext::HtmlNoSlash => attack_from_allowed(HTML_ESCAPED_NO_SLASH)?,
        AttackContext::HtmlBacktick => attack_from_allowed(HTML_ESCAPED_BACKTICK)?,
        AttackContext::HtmlAttr => attack_from_allowed(HTML_ATTR_ESCAPED)?,
        AttackContext::HtmlPayload => Automaton::literal(HTML_PAYLOAD.as_bytes()),
        AttackContext::HtmlAttributePayload => Automaton::literal(HTML_ATTRIBUTE_PAYLOAD.as_bytes()),
        AttackContext::HtmlSingleQuoteAttributePayload => {
            Automaton::literal(HTML_SINGLE_QUOTE_ATTRIBUTE_PAYLOAD.as_bytes())
        }
        AttackContext::HtmlPolygotPayload => contains_pattern(HTML_POLYGOT_PAYLOAD),
        AttackContext::UrlPayload => Automaton::literal(URL_PAYLOAD.as_bytes()),
        AttackContext::JavaScript => attack_from_allowed(JAVASCRIPT_ESCAPED)?,
        AttackContext::JavaScriptMinimal => attack_from_allowed(SLASH_ESCAPE_QUOTES)?,
        AttackContext::Url => attack_from_allowed(URL_ESCAPED)?,
    };
    Ok(auto)
}

static CATALOGUE: Lazy<HashMap<AttackContext, Automaton>> = Lazy::new(|| {
    AttackContext::ALL
        .into_iter()
        .map(|c| {
            let auto = build_pattern(c)
                .unwrap_or_else(|e| panic!("catalogue regex for {} failed to compile: {}", c, e));
            (c, auto)
        })
        .collect()
});

/// The attack automaton for a context. Built once, shared afterwards.
pub fn attack_pattern_for_context(context: AttackContext) -> &'static Automaton {
    &CATALOGUE[&context]
}

// Sanitizer images, used to recognize what an unknown sanitizer computes by
// language comparison.

/// Image of Σ* under `htmlspecialchars(mode)`.
pub fn encode_html_image(mode: HtmlSpecialCharsMode) -> Automaton {
    Transducer::html_special_chars(mode).apply(&Automaton::any_string())
}

/// Image of Σ* under tag escaping.
pub fn encode_html_tags_only_image() -> Automaton {
    Transducer::escape_html_tags().apply(&Automaton::any_string())
}

/// Image of Σ* under `encodeURIComponent`.
pub fn url_component_encoded_image() -> Automaton {
    Transducer::encode_uri_component().apply(&Automaton::any_string())
}
