//! Source scanner.
//!
//! Reads Rust source text and reports the `fn` items and `impl Trait for Type`
//! blocks it declares. The file is never compiled or loaded.

use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static FN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfn\s+(?:r#)?([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static IMPL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bimpl\s*(?:<[^{;]*?>)?\s*((?:[A-Za-z_][A-Za-z0-9_]*::)*[A-Za-z_][A-Za-z0-9_]*)\s*(?:<[^{;]*?>)?\s+for\s+(?:[A-Za-z_][A-Za-z0-9_]*::)*([A-Za-z_][A-Za-z0-9_]*)",
    )
    .unwrap()
});

/// An `impl Contract for Type` block found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplBlock {
    /// Last path segment of the implemented trait.
    pub contract: String,
    /// Name of the implementing type.
    pub type_name: String,
}

/// Method names declared in the file at `path`.
///
/// Missing, non UTF-8 or unparseable files yield an empty set.
pub fn declared_methods(path: &Path) -> BTreeSet<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => declared_methods_in(&source),
        Err(e) => {
            tracing::debug!(path = ?path, error = %e, "Cannot read source file");
            BTreeSet::new()
        }
    }
}

/// Method names declared in `source`.
pub fn declared_methods_in(source: &str) -> BTreeSet<String> {
    let Some(code) = code_only(source) else {
        return BTreeSet::new();
    };

    FN_RE.captures_iter(&code).map(|caps| caps[1].to_string()).collect()
}

/// Every `impl Trait for Type` block in `source`, in file order.
pub fn implementing_types(source: &str) -> Vec<ImplBlock> {
    let Some(code) = code_only(source) else {
        return Vec::new();
    };

    IMPL_RE
        .captures_iter(&code)
        .map(|caps| {
            let contract = caps[1].rsplit("::").next().unwrap_or(&caps[1]).to_string();
            ImplBlock { contract, type_name: caps[2].to_string() }
        })
        .collect()
}

/// Blank out comments, string and char literals.
///
/// Returns `None` when the text cannot be Rust source: an unterminated
/// comment or literal, or unbalanced braces.
fn code_only(source: &str) -> Option<String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut depth: i64 = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i = skip_block_comment(&chars, i)?;
                out.push(' ');
                continue;
            }
            '"' => {
                i = skip_string(&chars, i + 1)?;
                out.push_str("\"\"");
                continue;
            }
            'r' if starts_raw_string(&chars, i) => {
                i = skip_raw_string(&chars, i + 1)?;
                out.push_str("\"\"");
                continue;
            }
            '\'' => {
                if let Some(end) = char_literal_end(&chars, i) {
                    i = end;
                    out.push_str("' '");
                    continue;
                }
                // lifetime
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }

        out.push(c);
        i += 1;
    }

    (depth == 0).then_some(out)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `i` points at the `/` of `/*`. Returns the index after the closing `*/`.
fn skip_block_comment(chars: &[char], mut i: usize) -> Option<usize> {
    let mut nesting = 0usize;

    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                nesting += 1;
                i += 2;
            }
            ('*', '/') => {
                nesting -= 1;
                i += 2;
                if nesting == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }

    None
}

/// `i` points just past the opening quote. Returns the index after the closing quote.
fn skip_string(chars: &[char], mut i: usize) -> Option<usize> {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Some(i + 1),
            _ => i += 1,
        }
    }

    None
}

/// Whether the `r` at `i` opens a raw string (`r"`, `r#"`, `br"`).
fn starts_raw_string(chars: &[char], i: usize) -> bool {
    let prefix_ok = match i.checked_sub(1).map(|p| chars[p]) {
        None => true,
        Some('b') => i < 2 || !is_ident_char(chars[i - 2]),
        Some(p) => !is_ident_char(p),
    };
    if !prefix_ok {
        return false;
    }

    let mut j = i + 1;
    while j < chars.len() && chars[j] == '#' {
        j += 1;
    }
    chars.get(j) == Some(&'"')
}

/// `i` points just past the `r`. Returns the index after the closing delimiter.
fn skip_raw_string(chars: &[char], mut i: usize) -> Option<usize> {
    let mut hashes = 0;
    while chars.get(i) == Some(&'#') {
        hashes += 1;
        i += 1;
    }
    i += 1;

    while i < chars.len() {
        if chars[i] == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
            return Some(i + 1 + hashes);
        }
        i += 1;
    }

    None
}

/// End index of a char literal starting at `i`, or `None` for a lifetime.
fn char_literal_end(chars: &[char], i: usize) -> Option<usize> {
    match chars.get(i + 1)? {
        '\\' => (i + 3..chars.len().min(i + 12)).find(|&j| chars[j] == '\'').map(|j| j + 1),
        _ if chars.get(i + 2) == Some(&'\'') => Some(i + 3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAR: &str = r#"
use crate::shape::Shape;

/// A ten sided star.
pub struct Star {
    name: String,
}

impl Shape for Star {
    fn shape_is_a_polygon(&self) -> &str {
        "A Star is a polygon!"
    }

    fn area(&self) -> f64 {
        unimplemented!()
    }

    fn draw(&self) {
        // fn commented_out() {}
        let _ = "fn in_a_string() {";
        let _brace = '{';
    }
}
"#;

    #[test]
    fn test_declared_methods() {
        let methods = declared_methods_in(STAR);

        assert!(methods.contains("area"));
        assert!(methods.contains("draw"));
        assert!(methods.contains("shape_is_a_polygon"));
        assert_eq!(methods.len(), 3);
    }

    #[test]
    fn test_comments_and_strings_are_ignored() {
        let methods = declared_methods_in(STAR);

        assert!(!methods.contains("commented_out"));
        assert!(!methods.contains("in_a_string"));
    }

    #[test]
    fn test_raw_strings_and_block_comments() {
        let source = r###"
/* fn hidden() {} /* nested */ still hidden */
const DOC: &str = r#"fn also_hidden() { "quoted" }"#;
fn visible<'a>(s: &'a str) -> &'a str { s }
"###;

        let methods = declared_methods_in(source);
        assert_eq!(methods.into_iter().collect::<Vec<_>>(), vec!["visible".to_string()]);
    }

    #[test]
    fn test_unbalanced_source_yields_nothing() {
        assert!(declared_methods_in("fn broken() {").is_empty());
        assert!(declared_methods_in("fn broken() {} }").is_empty());
        assert!(declared_methods_in("fn broken() { \"unterminated }").is_empty());
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        assert!(declared_methods(Path::new("does/not/exist.rs")).is_empty());
    }

    #[test]
    fn test_declared_methods_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("star.rs");
        std::fs::write(&path, STAR).unwrap();

        assert_eq!(declared_methods(&path).len(), 3);
    }

    #[test]
    fn test_implementing_types() {
        let source = r#"
impl std::fmt::Display for Star {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { Ok(()) }
}

impl<T: Into<String>> crate::shape::Shape for Polygon<T> {
    fn area(&self) -> f64 { 0.0 }
}

impl Star {
    fn new() -> Self { Self }
}
"#;

        let blocks = implementing_types(source);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ImplBlock { contract: "Display".into(), type_name: "Star".into() });
        assert_eq!(blocks[1], ImplBlock { contract: "Shape".into(), type_name: "Polygon".into() });
    }
}
