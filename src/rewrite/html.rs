//! HTML sub-rewriter.
//!
//! Built on `lol_html`'s streaming `HtmlRewriter`/`element!` pattern,
//! generalized across every URL-bearing attribute this rewriter knows
//! about rather than a single hardcoded one, plus `<base>` tracking,
//! `srcset` splitting, character reference handling, and delegation into
//! the CSS/JS sub-rewriters for inline content.

use crate::canonical;
use crate::fuzzy::FuzzyRuleSet;
use crate::known_paths::KnownPathSet;
use crate::rewrite::css::rewrite_css;
use crate::rewrite::js::{discover_module_imports, rewrite_js};
use crate::rewrite::{self, DocumentContext, ModuleGraph};
use htmlentity::entity::ICodedDataTrait;
use lol_html::html_content::ContentType;
use lol_html::{HtmlRewriter, Settings, element, text};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// Attribute names (and the selector of elements that carry them) rewritten
/// by the common pipeline.
const URL_ATTRS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("area[href]", "href"),
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("iframe[src]", "src"),
    ("source[src]", "src"),
    ("embed[src]", "src"),
    ("audio[src]", "src"),
    ("video[src]", "src"),
    ("input[src]", "src"),
    ("frame[src]", "src"),
    ("img[srcset]", "srcset"),
    ("source[srcset]", "srcset"),
    ("video[poster]", "poster"),
    ("object[data]", "data"),
    ("form[action]", "action"),
    ("button[formaction]", "formaction"),
    ("input[formaction]", "formaction"),
    ("body[background]", "background"),
    ("table[background]", "background"),
    ("td[background]", "background"),
    ("th[background]", "background"),
    ("blockquote[cite]", "cite"),
    ("q[cite]", "cite"),
    ("ins[cite]", "cite"),
    ("del[cite]", "cite"),
    ("img[longdesc]", "longdesc"),
];

/// Inline event-handler attributes rewritten with the JS-classic rewriter.
const EVENT_HANDLER_ATTRS: &[&str] = &[
    "onclick", "onhover", "onload", "onerror", "onmouseover", "onmouseout", "onsubmit",
    "onchange", "onkeyup", "onkeydown", "onfocus", "onblur",
];

/// Optional per-document extras the HTML rewriter injects.
#[derive(Debug, Clone, Default)]
pub struct HtmlExtras {
    /// Helper-initialization snippet inserted at the top of `<head>`.
    pub header_snippet: Option<String>,
    /// User-supplied CSS `<link>` inserted at the end of `</head>`.
    pub custom_css_link: Option<String>,
}

/// Rewrite an HTML payload: every URL-bearing attribute, `<base>` tracking,
/// `<meta http-equiv="refresh">`, `integrity` stripping, inline
/// `<script>`/`<style>` delegation, and inline event-handler attributes.
///
/// Parse failures fall back to passthrough with a logged warning.
#[must_use]
pub fn rewrite_html(
    html: &str,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
    known: &KnownPathSet,
    extras: &HtmlExtras,
    modules: &Rc<RefCell<ModuleGraph>>,
) -> String {
    let base = Rc::new(RefCell::new(ctx.original_document_url.clone()));
    let known: Rc<KnownPathSet> = Rc::new(known.clone());
    let mut output = Vec::with_capacity(html.len());

    let mut handlers = Vec::new();

    // Track <base href> as the effective resolution base for everything
    // that follows it in document order.
    {
        let base = Rc::clone(&base);
        let doc_url = ctx.original_document_url.clone();
        handlers.push(element!("base[href]", move |el| {
            if let Some(href) = el.get_attribute("href")
                && let Ok(resolved) = doc_url.join(&href)
            {
                *base.borrow_mut() = resolved;
            }
            Ok(())
        }));
    }

    // Record <script type="module" src=X> targets as modules before the
    // generic attribute rewriter below mutates `src` in place.
    {
        let base = Rc::clone(&base);
        let rules = rules.clone();
        let modules = Rc::clone(modules);
        handlers.push(element!("script[src]", move |el| {
            let is_module = el
                .get_attribute("type")
                .map(|t| t.eq_ignore_ascii_case("module"))
                .unwrap_or(false);
            if !is_module {
                return Ok(());
            }
            if let Some(src) = el.get_attribute("src")
                && let Ok(resolved) = base.borrow().join(&src)
                && let Ok(path) = canonical::canonicalize(resolved.as_str(), &rules)
            {
                modules.borrow_mut().mark_module(path);
            }
            Ok(())
        }));
    }

    for &(selector, attr) in URL_ATTRS {
        let base = Rc::clone(&base);
        let ctx = ctx.clone();
        let rules = rules.clone();
        let known = Rc::clone(&known);
        let attr = attr.to_string();
        handlers.push(element!(selector, move |el| {
            if attr == "srcset" {
                rewrite_srcset_attr(el, &attr, &base, &ctx, &rules, &known);
            } else {
                rewrite_single_attr(el, &attr, &base, &ctx, &rules, &known);
            }
            Ok(())
        }));
    }

    // <meta http-equiv="refresh" content="N;url=TARGET">
    {
        let base = Rc::clone(&base);
        let ctx = ctx.clone();
        let rules = rules.clone();
        let known = Rc::clone(&known);
        handlers.push(element!("meta[http-equiv]", move |el| {
            let is_refresh = el
                .get_attribute("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false);
            if !is_refresh {
                return Ok(());
            }
            let Some(content) = el.get_attribute("content") else {
                return Ok(());
            };
            if let Some(idx) = content.to_ascii_lowercase().find("url=") {
                let (prefix, rest) = content.split_at(idx + 4);
                let decoded_rest = htmlentity::entity::decode(rest.as_bytes())
                    .to_string()
                    .unwrap_or_else(|_| rest.to_string());
                let effective = effective_ctx(&ctx, &base);
                if let Some(rewritten) =
                    rewrite::rewrite_reference(&decoded_rest, &effective, &rules, &known)
                {
                    el.set_attribute("content", &format!("{prefix}{}", escape_attr_value(&rewritten)))
                        .ok();
                }
            }
            Ok(())
        }));
    }

    // Drop integrity attributes so rewritten payloads don't fail SRI checks.
    handlers.push(element!("script[integrity], link[integrity]", |el| {
        el.remove_attribute("integrity");
        Ok(())
    }));

    // Inline <style> content, delegated to the CSS rewriter.
    {
        let ctx = ctx.clone();
        let rules = rules.clone();
        let known = Rc::clone(&known);
        let buffer: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));
        let buffer2 = Rc::clone(&buffer);
        handlers.push(text!("style", move |t| {
            buffer2.borrow_mut().push_str(t.as_str());
            if t.last_in_text_node() {
                let content = std::mem::take(&mut *buffer2.borrow_mut());
                let rewritten = rewrite_css(&content, &ctx, &rules, &known);
                t.replace(&rewritten, ContentType::Text);
            } else {
                t.remove();
            }
            Ok(())
        }));
    }

    // Inline <script> content (no [src]), delegated to the JS rewriter.
    {
        let ctx = ctx.clone();
        let rules = rules.clone();
        let known = Rc::clone(&known);
        let modules = Rc::clone(modules);
        let is_module: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));
        let skip: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));

        {
            let is_module = Rc::clone(&is_module);
            let skip = Rc::clone(&skip);
            handlers.push(element!("script", move |el| {
                *skip.borrow_mut() = el.get_attribute("src").is_some();
                *is_module.borrow_mut() = el
                    .get_attribute("type")
                    .map(|t| t.eq_ignore_ascii_case("module"))
                    .unwrap_or(false);
                Ok(())
            }));
        }

        let buffer: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));
        handlers.push(text!("script", move |t| {
            if *skip.borrow() {
                return Ok(());
            }
            buffer.borrow_mut().push_str(t.as_str());
            if t.last_in_text_node() {
                let content = std::mem::take(&mut *buffer.borrow_mut());
                let module = *is_module.borrow();
                if module {
                    // Transitive propagation: an inline module's own
                    // imports are modules too.
                    for path in discover_module_imports(&content, &ctx, &rules) {
                        modules.borrow_mut().mark_module(path);
                    }
                }
                let rewritten = rewrite_js(&content, &ctx, &rules, &known, module);
                t.replace(&rewritten, ContentType::Text);
            } else {
                t.remove();
            }
            Ok(())
        }));
    }

    // Inline event-handler attributes, rewritten as JS-classic snippets.
    for &attr in EVENT_HANDLER_ATTRS {
        let ctx = ctx.clone();
        let rules = rules.clone();
        let known = Rc::clone(&known);
        let attr = attr.to_string();
        handlers.push(element!("*", move |el| {
            if let Some(val) = el.get_attribute(&attr) {
                let decoded = htmlentity::entity::decode(val.as_bytes())
                    .to_string()
                    .unwrap_or_else(|_| val.clone());
                let rewritten = rewrite_js(&decoded, &ctx, &rules, &known, false);
                if rewritten != decoded {
                    el.set_attribute(&attr, &escape_attr_value(&rewritten)).ok();
                }
            }
            Ok(())
        }));
    }

    // Header snippet at the very top of <head>, custom CSS link at the end.
    {
        let extras = extras.clone();
        handlers.push(element!("head", move |el| {
            if let Some(snippet) = &extras.header_snippet {
                el.prepend(snippet, ContentType::Html);
            }
            if let Some(css_link) = &extras.custom_css_link {
                el.append(css_link, ContentType::Html);
            }
            Ok(())
        }));
    }

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        log::warn!("failed to rewrite html payload, passing through");
        return html.to_string();
    }

    match String::from_utf8(output) {
        Ok(s) => s,
        Err(_) => {
            log::warn!("rewritten html was not valid utf-8, passing through original");
            html.to_string()
        }
    }
}

fn effective_ctx(ctx: &DocumentContext, base: &Rc<RefCell<Url>>) -> DocumentContext {
    DocumentContext::new(
        base.borrow().clone(),
        ctx.document_canonical_path.clone(),
        ctx.bundle_prefix.clone(),
    )
}

/// Re-escapes exactly the five characters HTML requires inside a
/// double-quoted attribute value (`&<>"'`), leaving everything else —
/// including non-ASCII text and already-percent-encoded URL bytes —
/// untouched. Pairs with `htmlentity::entity::decode` on the way in:
/// attribute values are decoded before rewriting and only this much is
/// re-escaped on the way out, so characters the rewriter itself never
/// introduces a second time can't be double-escaped.
fn escape_attr_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn rewrite_single_attr(
    el: &mut lol_html::html_content::Element,
    attr: &str,
    base: &Rc<RefCell<Url>>,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
    known: &KnownPathSet,
) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    let decoded = htmlentity::entity::decode(value.as_bytes())
        .to_string()
        .unwrap_or_else(|_| value.clone());
    let effective = effective_ctx(ctx, base);
    if let Some(rewritten) = rewrite::rewrite_reference(&decoded, &effective, rules, known) {
        el.set_attribute(attr, &escape_attr_value(&rewritten)).ok();
    }
}

fn rewrite_srcset_attr(
    el: &mut lol_html::html_content::Element,
    attr: &str,
    base: &Rc<RefCell<Url>>,
    ctx: &DocumentContext,
    rules: &FuzzyRuleSet,
    known: &KnownPathSet,
) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    let effective = effective_ctx(ctx, base);
    let rewritten = value
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url_part = parts.next().unwrap_or("");
            let descriptor = parts.next();
            let decoded_url = htmlentity::entity::decode(url_part.as_bytes())
                .to_string()
                .unwrap_or_else(|_| url_part.to_string());
            let rewritten_url = match rewrite::rewrite_reference(&decoded_url, &effective, rules, known) {
                Some(r) => escape_attr_value(&r),
                None => url_part.to_string(),
            };
            match descriptor {
                Some(d) => format!("{rewritten_url} {d}"),
                None => rewritten_url,
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    el.set_attribute(attr, &rewritten).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical;

    fn ctx(doc_url: &str) -> (DocumentContext, FuzzyRuleSet, KnownPathSet) {
        let rules = FuzzyRuleSet::empty();
        let url = Url::parse(doc_url).unwrap();
        let canonical = canonical::canonicalize(doc_url, &rules).unwrap();
        (DocumentContext::new(url, canonical, None), rules, KnownPathSet::new())
    }

    fn modules() -> Rc<RefCell<ModuleGraph>> {
        Rc::new(RefCell::new(ModuleGraph::new()))
    }

    #[test]
    fn rewrites_anchor_href() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let html = r#"<html><body><a href="https://www.example.com/javascript/content.txt">x</a></body></html>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("../javascript/content.txt"), "{out}");
    }

    #[test]
    fn rewrites_srcset_candidates() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let html = r#"<img srcset="https://www.example.com/img/a.png 1x, https://www.example.com/img/b.png 2x">"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("../img/a.png 1x"), "{out}");
        assert!(out.contains("../img/b.png 2x"), "{out}");
    }

    #[test]
    fn base_href_changes_resolution_base() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let html = r#"<html><head><base href="https://other.example.com/base/"></head><body><a href="a.txt">x</a></body></html>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("other.example.com"), "{out}");
    }

    #[test]
    fn integrity_attribute_is_dropped() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<script src="a.js" integrity="sha384-abc"></script>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(!out.contains("integrity"), "{out}");
    }

    #[test]
    fn meta_refresh_target_is_rewritten() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<meta http-equiv="refresh" content="0;url=https://www.example.com/b.html">"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("url=./b.html"), "{out}");
    }

    #[test]
    fn header_snippet_and_css_link_are_injected() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = "<html><head><title>t</title></head><body></body></html>";
        let extras = HtmlExtras {
            header_snippet: Some("<script>window.zim=1;</script>".to_string()),
            custom_css_link: Some(r#"<link rel="stylesheet" href="_zim_static/custom.css">"#.to_string()),
        };
        let out = rewrite_html(html, &ctx, &rules, &known, &extras, &modules());
        let head_start = out.find("<head>").unwrap();
        let snippet_pos = out.find("window.zim").unwrap();
        let title_pos = out.find("<title>").unwrap();
        assert!(head_start < snippet_pos && snippet_pos < title_pos);
        assert!(out.contains("custom.css"));
    }

    #[test]
    fn inline_style_is_rewritten() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let html = r#"<style>body { background: url("https://www.example.com/images/bg.png"); }</style>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("../images/bg.png"), "{out}");
    }

    #[test]
    fn script_with_src_is_not_treated_as_inline() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<script src="a.js">should not appear rewritten</script>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("should not appear rewritten"));
    }

    #[test]
    fn non_navigational_href_is_untouched() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<a href="mailto:a@b.com">mail</a>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains(r#"href="mailto:a@b.com""#), "{out}");
    }

    #[test]
    fn external_module_script_is_recorded_in_the_module_graph() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<script type="module" src="https://www.example.com/app.js"></script>"#;
        let modules = modules();
        let _ = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules);
        let app_js = canonical::canonicalize("https://www.example.com/app.js", &rules).unwrap();
        assert!(modules.borrow().is_module(&app_js));
    }

    #[test]
    fn inline_module_imports_propagate_into_the_module_graph() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<script type="module">import { x } from "./lib.js";</script>"#;
        let modules = modules();
        let _ = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules);
        let lib_js = canonical::canonicalize("https://www.example.com/lib.js", &rules).unwrap();
        assert!(modules.borrow().is_module(&lib_js));
    }

    #[test]
    fn classic_script_is_not_recorded_as_a_module() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<script src="https://www.example.com/classic.js"></script>"#;
        let modules = modules();
        let _ = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules);
        let classic_js = canonical::canonicalize("https://www.example.com/classic.js", &rules).unwrap();
        assert!(!modules.borrow().is_module(&classic_js));
    }

    #[test]
    fn escape_attr_value_escapes_exactly_the_five_mandatory_characters() {
        let escaped = escape_attr_value("a&b<c>d\"e'f");
        assert_eq!(escaped, "a&amp;b&lt;c&gt;d&quot;e&#39;f");
        // Characters outside the mandatory five survive untouched.
        let untouched = escape_attr_value("a-b_c.d~e/f:g;h,i@j+k$l!m*n(o)p中q");
        assert_eq!(untouched, "a-b_c.d~e/f:g;h,i@j+k$l!m*n(o)p中q");
    }

    #[test]
    fn rewritten_href_with_literal_ampersand_is_re_escaped_on_emit() {
        let (ctx, rules, known) = ctx("https://www.example.com/path1/resource1.html");
        let html = r#"<a href="https://www.example.com/search?a=1&amp;b=2">x</a>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        // The decoded, rewritten query string contains a literal '&' between
        // parameters, which must be re-escaped as `&amp;` in the attribute
        // value rather than left as a bare ampersand or double-escaped.
        assert!(out.contains("&amp;b=2"), "{out}");
        assert!(!out.contains("&amp;amp;"), "{out}");
        assert!(!out.contains("a=1&b=2"), "{out}");
    }

    #[test]
    fn event_handler_attribute_round_trips_entities_through_rewrite() {
        let (ctx, rules, known) = ctx("https://www.example.com/a.html");
        let html = r#"<a href="#" onclick="go('https://www.example.com/b.html')">x</a>"#;
        let out = rewrite_html(html, &ctx, &rules, &known, &HtmlExtras::default(), &modules());
        assert!(out.contains("go(&#39;./b.html&#39;)"), "{out}");
    }
}
