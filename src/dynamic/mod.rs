//! Dynamic Rewriter Helper (spec §4.4) — the browser-side equivalent of the
//! Static Rewriter, plus the Rust-side function used to prove the two sides
//! agree (spec §8 "Offline/online parity").
//!
//! Two artifacts, per `SPEC_FULL.md` §4.4:
//! 1. [`dynamic_rewrite`] — same pipeline as [`crate::rewrite`], minus
//!    relativization, plus absolute output rooted at `bundle_prefix`.
//! 2. [`render_helper_js`] — the JS asset text, a template whose logic is a
//!    line-by-line transliteration of (1), with the fuzzy rule table
//!    embedded from the same [`crate::fuzzy::rules::BUILTIN_RULES`] source
//!    so neither side can silently drift (spec §9 "Shared rule source").

use crate::canonical;
use crate::fuzzy::{self, FuzzyRuleSet};
use crate::known_paths::KnownPathSet;
use crate::reference::{self, ReferenceKind};
use crate::rewrite::percent::encode_rewritten;
use serde::Serialize;

/// Reserved internal path the helper asset is stored under (spec §6).
pub const STATIC_PREFIX: &str = "_zim_static/";

/// The `info()` configuration record spec §6 defines, field names kept
/// exactly as given so the in-page interception library can consume it
/// unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct HelperConfig {
    pub rewrite_function: &'static str,
    pub top_url: String,
    pub url: String,
    pub prefix: String,
    pub static_prefix: String,
    pub wombat_host: String,
    pub wombat_scheme: String,
    pub wombat_sec: u64,
    pub is_framed: bool,
    pub is_live: bool,
    pub enable_auto_fetch: bool,
    pub convert_post_to_get: bool,
    #[serde(rename = "isSW")]
    pub is_sw: bool,
    pub target_frame: String,
    pub timestamp: String,
    pub request_ts: String,
    pub wombat_ts: String,
    pub coll: String,
    pub proxy_magic: String,
    #[serde(rename = "mod")]
    pub module: String,
    pub wombat_opts: serde_json::Value,
}

impl HelperConfig {
    /// Build the configuration record for one document, per spec §4.4's
    /// `info(current_url, original_host, original_scheme, original_url,
    /// bundle_prefix)`.
    #[must_use]
    pub fn new(current_url: &str, original_url: &url::Url, bundle_prefix: &str) -> Self {
        let host = original_url.host_str().unwrap_or_default().to_string();
        Self {
            rewrite_function: "rewrite",
            top_url: current_url.to_string(),
            url: original_url.to_string(),
            prefix: bundle_prefix.to_string(),
            static_prefix: format!("{bundle_prefix}{STATIC_PREFIX}"),
            wombat_host: host,
            wombat_scheme: original_url.scheme().to_string(),
            wombat_sec: 0,
            is_framed: false,
            is_live: false,
            enable_auto_fetch: false,
            convert_post_to_get: false,
            is_sw: false,
            target_frame: String::new(),
            timestamp: String::new(),
            request_ts: String::new(),
            wombat_ts: String::new(),
            coll: String::new(),
            proxy_magic: String::new(),
            module: String::new(),
            wombat_opts: serde_json::Value::Null,
        }
    }

    /// Serialize to the JSON form embedded alongside the helper asset.
    ///
    /// # Errors
    /// Propagates any `serde_json` serialization failure (never expected in
    /// practice, since every field is a plain string/bool/number).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The Rust-side equivalent of the helper's `rewrite(url, ...)` entry point
/// (spec §4.4): same pipeline as the Static Rewriter, but absolute links
/// rooted at `bundle_prefix` rather than relative ones, and without the
/// known-path consultation the static side only ever uses for alias
/// decisions.
///
/// Non-http(s) schemes and references starting with `#`, `{`, or `*` are
/// returned unchanged. A malformed percent-encoding in the path is given one
/// best-effort re-encoding pass before giving up and returning the input
/// unchanged.
#[must_use]
pub fn dynamic_rewrite(
    raw: &str,
    original_document_url: &url::Url,
    bundle_prefix: &str,
    rules: &FuzzyRuleSet,
    _known: &KnownPathSet,
) -> String {
    let kind = reference::classify(raw);
    if !matches!(
        kind,
        ReferenceKind::AbsoluteWithScheme
            | ReferenceKind::SchemeRelative
            | ReferenceKind::AbsolutePath
            | ReferenceKind::Relative
    ) {
        return raw.to_string();
    }
    if crate::rewrite::already_rewritten(raw, kind, original_document_url) {
        return raw.to_string();
    }

    let resolved = match original_document_url.join(raw) {
        Ok(u) => u,
        Err(_) => return best_effort_reencode_and_retry(raw, original_document_url, bundle_prefix, rules),
    };

    match canonical::canonicalize(resolved.as_str(), rules) {
        Ok(target) => encode_rewritten(&format!("{bundle_prefix}{target}")),
        Err(_) => raw.to_string(),
    }
}

/// Best-effort recovery for a reference whose percent-encoding could not be
/// parsed: percent-encode the raw token once more before retrying
/// resolution (spec §4.4 "attempts a best-effort percent-encoding of the raw
/// input before re-parsing").
fn best_effort_reencode_and_retry(
    raw: &str,
    original_document_url: &url::Url,
    bundle_prefix: &str,
    rules: &FuzzyRuleSet,
) -> String {
    let reencoded = encode_rewritten(raw);
    match original_document_url.join(&reencoded) {
        Ok(resolved) => match canonical::canonicalize(resolved.as_str(), rules) {
            Ok(target) => encode_rewritten(&format!("{bundle_prefix}{target}")),
            Err(_) => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

/// Render the static JS asset stored once at `{bundle_prefix}_zim_static/`.
///
/// The fuzzy rule table is emitted verbatim from
/// [`fuzzy::rules::BUILTIN_RULES`] (the same literal source the Rust engine
/// compiles) as a JS array literal, so the browser-side `rewrite()` applies
/// exactly the rules the Rust side does.
#[must_use]
pub fn render_helper_js() -> String {
    let rules_js = fuzzy::rules::BUILTIN_RULES
        .iter()
        .map(|(pattern, replace)| {
            let js_pattern = pattern.replace('\\', "\\\\").replace('/', "\\/");
            let js_replace = to_js_dollar_style(replace);
            format!("  [/{js_pattern}/, \"{js_replace}\"]")
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"// Generated helper asset — rule table and rewrite() mirror the
// dynamic_rewrite() function on the Rust side; keep both in lockstep.
const FUZZY_RULES = [
{rules_js}
];

const STATIC_PREFIX = "{STATIC_PREFIX}";

function applyFuzzyRules(path) {{
  for (const [regex, replace] of FUZZY_RULES) {{
    if (regex.test(path)) {{
      const replaced = path.replace(regex, replace);
      if (replaced !== path) return replaced;
    }}
  }}
  return path;
}}

function alreadyRewritten(raw, documentUrl) {{
  if (!raw.startsWith("../")) return false;
  const segments = raw.split("/").filter((s) => s.length > 0 && s !== "..");
  const first = segments[0];
  if (!first || first.indexOf(".") === -1) return false;
  const upCount = raw.split("/").filter((s) => s === "..").length;
  const docDepth = new URL(documentUrl).pathname.split("/").filter((s) => s.length > 0).length;
  return upCount === docDepth;
}}

export function rewrite(url, useRel, mod, doc) {{
  const raw = String(url);
  if (raw.startsWith("#") || raw.startsWith("{{") || raw.startsWith("*")) return raw;
  if (!/^https?:\/\//i.test(raw) && !raw.startsWith("//") && !raw.startsWith("/") && !raw.startsWith(".")) {{
    return raw;
  }}
  const documentUrl = doc || window.location.href;
  if (alreadyRewritten(raw, documentUrl)) return raw;

  let resolved;
  try {{
    resolved = new URL(raw, documentUrl);
  }} catch (e) {{
    try {{
      resolved = new URL(encodeURI(raw), documentUrl);
    }} catch (e2) {{
      return raw;
    }}
  }}

  const host = resolved.hostname.toLowerCase();
  let pathAndQuery = decodeURIComponent(resolved.pathname) || "/";
  pathAndQuery = pathAndQuery.replace(/\/{{2,}}/g, "/");
  if (resolved.search) {{
    pathAndQuery += "?" + decodeURIComponent(resolved.search.slice(1)).replace(/\+/g, " ");
  }}
  const canonical = applyFuzzyRules(host + pathAndQuery);
  return window.zimBundlePrefix + canonical;
}}

export function info(currentUrl, originalHost, originalScheme, originalUrl, bundlePrefix) {{
  return {{
    rewrite_function: "rewrite",
    top_url: currentUrl,
    url: originalUrl,
    prefix: bundlePrefix,
    static_prefix: bundlePrefix + STATIC_PREFIX,
    wombat_host: originalHost,
    wombat_scheme: originalScheme,
    wombat_sec: 0,
    is_framed: false,
    is_live: false,
    enable_auto_fetch: false,
    convert_post_to_get: false,
    isSW: false,
    target_frame: "",
    timestamp: "",
    request_ts: "",
    wombat_ts: "",
    coll: "",
    proxy_magic: "",
    mod: "",
    wombat_opts: null,
  }};
}}
"#
    )
}

fn to_js_dollar_style(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(d) = chars.peek().copied()
            && d.is_ascii_digit()
        {
            chars.next();
            out.push('$');
            out.push(d);
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn scenario_1_dynamic_rewrite() {
        let doc = Url::parse("https://www.example.com/path1/resource1.html").unwrap();
        let rules = FuzzyRuleSet::empty();
        let known = KnownPathSet::new();
        let out = dynamic_rewrite(
            "https://www.example.com/javascript/content.txt",
            &doc,
            "http://library/content/myzim/",
            &rules,
            &known,
        );
        assert_eq!(
            out,
            "http://library/content/myzim/www.example.com/javascript/content.txt"
        );
    }

    #[test]
    fn scenario_2_scheme_relative_dynamic_rewrite() {
        let doc = Url::parse("https://www.example.com/path1/resource1.html").unwrap();
        let rules = FuzzyRuleSet::empty();
        let known = KnownPathSet::new();
        let out = dynamic_rewrite(
            "//www.example.com/javascript/content.txt",
            &doc,
            "http://library/content/myzim/",
            &rules,
            &known,
        );
        assert_eq!(
            out,
            "http://library/content/myzim/www.example.com/javascript/content.txt"
        );
    }

    #[test]
    fn scenario_3_query_string_is_percent_encoded() {
        let doc = Url::parse("https://www.example.com/path1/resource1.html").unwrap();
        let rules = FuzzyRuleSet::empty();
        let known = KnownPathSet::new();
        let out = dynamic_rewrite(
            "https://www.example.com/javascript/content.txt?query=value",
            &doc,
            "http://library/content/myzim/",
            &rules,
            &known,
        );
        assert!(out.ends_with("content.txt%3Fquery%3Dvalue"), "{out}");
    }

    #[test]
    fn non_http_scheme_passes_through() {
        let doc = Url::parse("https://www.example.com/a.html").unwrap();
        let rules = FuzzyRuleSet::empty();
        let known = KnownPathSet::new();
        let out = dynamic_rewrite("mailto:a@b.com", &doc, "http://library/myzim/", &rules, &known);
        assert_eq!(out, "mailto:a@b.com");
    }

    #[test]
    fn helper_config_field_names_match_spec() {
        let doc = Url::parse("https://www.example.com/a.html").unwrap();
        let cfg = HelperConfig::new("https://www.example.com/a.html", &doc, "http://library/myzim/");
        let json = cfg.to_json().unwrap();
        for key in [
            "rewrite_function",
            "top_url",
            "static_prefix",
            "wombat_host",
            "wombat_scheme",
            "isSW",
            "wombat_opts",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }

    #[test]
    fn helper_js_embeds_every_builtin_rule() {
        let js = render_helper_js();
        assert_eq!(
            js.matches("[/").count(),
            fuzzy::rules::BUILTIN_RULES.len()
        );
        assert!(js.contains("export function rewrite"));
        assert!(js.contains("export function info"));
    }
}
