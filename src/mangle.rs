//! Identifier mangling.
//!
//! Every name the code generator emits goes through [`mangle`]. Output is a
//! C-family identifier with the `$` extension: `[A-Za-z_$][A-Za-z0-9_$]*`.
//!
//! Per character, ASCII letters, digits, `_` and `$` pass through, `'` becomes
//! `$prime`, and anything else becomes `$` followed by its decimal code point.
//! A name that is a target keyword, a runtime built-in, or starts with `__`
//! is wrapped as `_name_`. [`is_reserved_form`] recognises wrapped output.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{RuntimeError, RuntimeResult};

/// Output for the unused binding.
pub const UNUSED_SENTINEL: &str = "_";
/// Source text the front end uses for a binding nobody reads.
pub const UNUSED_IDENT: &str = "$__unused";
pub const PRIME_ESCAPE: &str = "$prime";
pub const ESCAPE_PREFIX: char = '$';
pub const WRAP_MARKER: char = '_';
pub const RESERVED_PREFIX: &str = "__";

const KEYWORDS: &[&str] = &[
    "alignas",
    "alignof",
    "and",
    "and_eq",
    "asm",
    "auto",
    "bitand",
    "bitor",
    "bool",
    "break",
    "case",
    "catch",
    "char",
    "char8_t",
    "char16_t",
    "char32_t",
    "class",
    "compl",
    "concept",
    "const",
    "consteval",
    "constexpr",
    "constinit",
    "const_cast",
    "continue",
    "co_await",
    "co_return",
    "co_yield",
    "decltype",
    "default",
    "delete",
    "do",
    "double",
    "dynamic_cast",
    "else",
    "enum",
    "explicit",
    "export",
    "extern",
    "false",
    "final",
    "float",
    "for",
    "friend",
    "goto",
    "if",
    "import",
    "inline",
    "int",
    "long",
    "module",
    "mutable",
    "namespace",
    "new",
    "noexcept",
    "not",
    "not_eq",
    "nullptr",
    "operator",
    "or",
    "or_eq",
    "override",
    "private",
    "protected",
    "public",
    "register",
    "reinterpret_cast",
    "requires",
    "return",
    "short",
    "signed",
    "sizeof",
    "static",
    "static_assert",
    "static_cast",
    "struct",
    "switch",
    "template",
    "this",
    "thread_local",
    "throw",
    "true",
    "try",
    "typedef",
    "typeid",
    "typename",
    "union",
    "unsigned",
    "using",
    "virtual",
    "void",
    "volatile",
    "wchar_t",
    "while",
    "xor",
    "xor_eq",
];

// Names generated code uses to reach the runtime.
const BUILTINS: &[&str] = &[
    "Value",
    "Cell",
    "WeakCell",
    "box",
    "unbox",
    "array_length",
    "undefined",
    "foreign",
    "exports",
    "main",
    "std",
];

/// A binder as the front end hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ident {
    Named(String),
    Unused,
    /// Compiler-synthesized placeholder. Must be renamed before emission.
    Generated(u64),
}

impl Ident {
    pub fn named(name: impl Into<String>) -> Self {
        Ident::Named(name.into())
    }
}

pub fn keywords() -> &'static [&'static str] {
    KEYWORDS
}

pub fn builtins() -> &'static [&'static str] {
    BUILTINS
}

/// True if `name` is a target keyword or a runtime built-in.
pub fn is_reserved(name: &str) -> bool {
    KEYWORDS.contains(&name) || BUILTINS.contains(&name)
}

fn needs_wrap(name: &str) -> bool {
    is_reserved(name) || name.starts_with(RESERVED_PREFIX)
}

fn push_escaped(out: &mut String, c: char) {
    out.push(ESCAPE_PREFIX);
    out.push_str(&(c as u32).to_string());
}

/// Maps a source identifier to a target identifier. Total: every input,
/// including the empty string, yields a non-empty valid identifier.
pub fn mangle(name: &str) -> String {
    if name.is_empty() || name == UNUSED_IDENT {
        return UNUSED_SENTINEL.to_string();
    }

    let mut out = String::with_capacity(name.len() + 2);
    for (i, c) in name.chars().enumerate() {
        match c {
            // Target identifiers cannot start with a digit.
            c if i == 0 && c.is_ascii_digit() => push_escaped(&mut out, c),
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' | '$' => out.push(c),
            '\'' => out.push_str(PRIME_ESCAPE),
            c => push_escaped(&mut out, c),
        }
    }

    if needs_wrap(name) {
        let mut wrapped = String::with_capacity(out.len() + 2);
        wrapped.push(WRAP_MARKER);
        wrapped.push_str(&out);
        wrapped.push(WRAP_MARKER);
        wrapped
    } else {
        out
    }
}

pub fn mangle_ident(ident: &Ident) -> RuntimeResult<String> {
    match ident {
        Ident::Named(name) => Ok(mangle(name)),
        Ident::Unused => Ok(UNUSED_SENTINEL.to_string()),
        Ident::Generated(id) => Err(RuntimeError::GeneratedIdent { id: *id }),
    }
}

/// True if `text` has the shape of a wrapped reserved name: `_k_` where `k`
/// is a keyword, a built-in, or starts with `__`.
///
/// A source identifier that happens to be spelled `_class_` also matches;
/// that coincidence is what callers use this to detect.
pub fn is_reserved_form(text: &str) -> bool {
    if text.len() < 3 || !text.starts_with(WRAP_MARKER) || !text.ends_with(WRAP_MARKER) {
        return false;
    }
    let inner = &text[1..text.len() - 1];
    needs_wrap(inner)
}

fn target_identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap_or_else(|e| unreachable!("{}", e))
    })
}

pub fn is_valid_target_identifier(text: &str) -> bool {
    target_identifier_regex().is_match(text)
}
