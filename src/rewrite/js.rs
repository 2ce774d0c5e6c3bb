//! JS sub-rewriter — text-level regex rewriting, deliberately not
//! AST-based.
//!
//! Follows the same regex-based text surgery used elsewhere in this crate
//! for markup content rather than pulling in a JS parser; `fancy-regex`
//! sits alongside `regex` specifically for patterns needing lookaround,
//! reused here for JSONP-wrapper detection.

use crate::canonical::{self, CanonicalPath};
use crate::fuzzy::FuzzyRuleSet;
use crate::known_paths::KnownPathSet;
use crate::reference::{self, ReferenceKind};
use crate::rewrite::{self, DocumentContext};
use regex::Regex;
use std::sync::OnceLock;

fn string_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)""#).unwrap())
}

fn import_specifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:^|;|\n)\s*import\b[^;\n"']*["']([^"']+)["']|import\s*\(\s*["']([^"']+)["']\s*\)"#,
        )
        .unwrap()
    })
}

/// Discover every relative/absolute/scheme-relative `import` specifier in a
/// module payload and resolve each into a [`CanonicalPath`], so a module
/// reached transitively through another module's imports still gets
/// recorded as a module itself. Bare specifiers (`import "lodash"`) are
/// skipped — they never enter the known-path namespace at all, so there
/// is nothing to record.
#[must_use]
pub fn discover_module_imports(
    js: &str,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
) -> Vec<CanonicalPath> {
    import_specifier_re()
        .captures_iter(js)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .filter(|spec| {
            matches!(
                reference::classify(spec),
                ReferenceKind::Relative
                    | ReferenceKind::AbsolutePath
                    | ReferenceKind::AbsoluteWithScheme
                    | ReferenceKind::SchemeRelative
            ) && (spec.starts_with('.') || spec.starts_with('/') || spec.contains("://"))
        })
        .filter_map(|spec| ctx.original_document_url.join(spec).ok())
        .filter_map(|resolved| canonical::canonicalize(resolved.as_str(), rules).ok())
        .collect()
}

fn extension_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.[A-Za-z0-9]{2,5}(?:[?#][^\s'\"]*)?$").unwrap())
}

fn jsonp_wrapper_re() -> &'static fancy_regex::Regex {
    static RE: OnceLock<fancy_regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        fancy_regex::Regex::new(r"(?s)^\s*(?!function\b)([\w.$]+)\s*\((.*)\)\s*;?\s*$").unwrap()
    })
}

/// Rewrite a JS (classic or module) payload: every string-literal candidate
/// that looks like a URL is passed through the common pipeline; everything
/// else is left untouched. `is_module` selects the import-specifier policy:
/// bare specifiers stay untouched while relative/absolute ones are
/// rewritten, which falls out naturally from the same candidate heuristic
/// used for ordinary string literals, since a bare specifier has neither a
/// leading path segment nor a `/`.
#[must_use]
pub fn rewrite_js(
    js: &str,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
    known: &KnownPathSet,
    is_module: bool,
) -> String {
    let _ = is_module; // policy falls out of `looks_like_url_candidate`; kept for call-site clarity.

    if let Ok(Some(caps)) = jsonp_wrapper_re().captures(js) {
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let rewritten_body = rewrite_string_literals(body, ctx, rules, known);
        return format!("{name}({rewritten_body});");
    }

    rewrite_string_literals(js, ctx, rules, known)
}

fn rewrite_string_literals(
    js: &str,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
    known: &KnownPathSet,
) -> String {
    string_literal_re()
        .replace_all(js, |caps: &regex::Captures| {
            let (quote, inner) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => ('\'', m.as_str()),
                (_, Some(m)) => ('"', m.as_str()),
                _ => return caps.get(0).unwrap().as_str().to_string(),
            };
            if looks_like_url_candidate(inner)
                && let Some(rewritten) = rewrite::rewrite_reference(inner, ctx, rules, known)
            {
                return format!("{quote}{rewritten}{quote}");
            }
            caps.get(0).unwrap().as_str().to_string()
        })
        .into_owned()
}

/// Heuristic for whether a bare string literal is worth attempting to
/// rewrite as a URL: it must contain no whitespace, and either start with a
/// recognizable URL/path prefix or look like a relative path (contains `/`)
/// or end in a short file-extension-like suffix. Anything else (plain
/// words, bare module specifiers like `"lodash"`) is left alone.
fn looks_like_url_candidate(s: &str) -> bool {
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return false;
    }
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || s.starts_with("//")
        || s.starts_with('/')
        || s.starts_with("./")
        || s.starts_with("../")
        || s.starts_with('#')
    {
        return true;
    }
    s.contains('/') || extension_like_re().is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(doc_url: &str) -> (DocumentContext, FuzzyRuleSet, KnownPathSet) {
        let rules = FuzzyRuleSet::empty();
        let url = url::Url::parse(doc_url).unwrap();
        let canonical = canonical::canonicalize(doc_url, &rules).unwrap();
        (DocumentContext::new(url, canonical, None), rules, KnownPathSet::new())
    }

    #[test]
    fn rewrites_absolute_string_literal() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let js = r#"fetch("https://www.example.com/javascript/content.txt");"#;
        let out = rewrite_js(js, &ctx, &rules, &known, false);
        assert!(out.contains("../javascript/content.txt"), "{out}");
    }

    #[test]
    fn bare_module_specifier_is_untouched() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let js = r#"import { thing } from "lodash";"#;
        let out = rewrite_js(js, &ctx, &rules, &known, true);
        assert_eq!(out, js);
    }

    #[test]
    fn relative_module_specifier_is_rewritten() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let js = r#"import { thing } from "https://www.example.com/path1/util.js";"#;
        let out = rewrite_js(js, &ctx, &rules, &known, true);
        assert!(out.contains("util.js"), "{out}");
    }

    #[test]
    fn plain_word_literal_is_left_alone() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let js = r#"const greeting = "hello world";"#;
        let out = rewrite_js(js, &ctx, &rules, &known, false);
        assert_eq!(out, js);
    }

    #[test]
    fn jsonp_wrapper_body_is_rewritten() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let js = r#"callback({"thumb":"https://www.example.com/img/t.jpg"})"#;
        let out = rewrite_js(js, &ctx, &rules, &known, false);
        assert!(out.starts_with("callback("));
        assert!(out.contains("img/t.jpg"), "{out}");
    }

    #[test]
    fn function_declaration_is_not_mistaken_for_jsonp() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let js = r#"function init() { return "https://www.example.com/x.js"; }"#;
        let out = rewrite_js(js, &ctx, &rules, &known, false);
        assert!(out.contains("x.js"), "{out}");
        assert!(out.starts_with("function init"));
    }

    #[test]
    fn discover_module_imports_finds_relative_and_absolute_specifiers() {
        let (ctx, rules, _known) = ctx("https://www.example.com/path1/resource1.html");
        let js = r#"
            import { a } from "./util.js";
            import { b } from "https://www.example.com/path1/helper.js";
            import "../shared/init.js";
        "#;
        let paths: Vec<String> = discover_module_imports(js, &ctx, &rules)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert!(paths.contains(&"www.example.com/path1/util.js".to_string()), "{paths:?}");
        assert!(paths.contains(&"www.example.com/path1/helper.js".to_string()), "{paths:?}");
        assert!(paths.contains(&"www.example.com/shared/init.js".to_string()), "{paths:?}");
    }

    #[test]
    fn discover_module_imports_skips_bare_specifiers() {
        let (ctx, rules, _known) = ctx("https://www.example.com/a.html");
        let js = r#"import { thing } from "lodash"; import React from "react";"#;
        let paths = discover_module_imports(js, &ctx, &rules);
        assert!(paths.is_empty(), "{paths:?}");
    }

    #[test]
    fn discover_module_imports_finds_dynamic_import() {
        let (ctx, rules, _known) = ctx("https://www.example.com/a.html");
        let js = r#"const mod = await import("./lazy.js");"#;
        let paths: Vec<String> = discover_module_imports(js, &ctx, &rules)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert!(paths.contains(&"www.example.com/lazy.js".to_string()), "{paths:?}");
    }
}
