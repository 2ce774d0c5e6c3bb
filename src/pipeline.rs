//! The two-pass conversion driver: pass 1 builds the known-path set, pass 2
//! rewrites each payload and hands it to the entry sink. The core depends
//! only on the two traits below — WARC iteration and ZIM writing are
//! external collaborators' responsibility.

use crate::canonical::{self, CanonicalPath};
use crate::config::RewriteConfig;
use crate::error::{Result, RewriteError};
use crate::known_paths::KnownPathSet;
use crate::rewrite::html::{self, HtmlExtras};
use crate::rewrite::{css, js, DocumentContext, MediaClass, ModuleGraph};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// Response statuses that produce a payload entry.
const PAYLOAD_STATUSES: &[u16] = &[200, 201, 202, 203];
/// Response statuses that produce an alias, when their target is known.
const ALIAS_STATUSES: &[u16] = &[301, 302, 306, 307];

/// One record from the abstract record stream.
pub struct Record {
    pub original_url: String,
    pub media_type_hint: Option<String>,
    pub record_type_hint: Option<String>,
    pub status: u16,
    pub payload: Vec<u8>,
    /// Redirect target, present only for [`ALIAS_STATUSES`] records.
    pub redirect_target: Option<String>,
}

/// An iterator of [`Record`]s. External collaborators provide a
/// WARC-backed implementation; this crate only needs the trait.
pub trait RecordStream {
    fn records(&mut self) -> &mut dyn Iterator<Item = Record>;
}

/// Accepts rewritten payloads and aliases, deduplicating by canonical path
/// first-writer-wins.
pub trait EntrySink {
    fn write_entry(&mut self, path: &CanonicalPath, content: &[u8], media_type_hint: Option<&str>);
    fn write_alias(&mut self, path: &CanonicalPath, alias_of: &CanonicalPath);
}

/// Progress counters distinguishing written, aliased, and skipped records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteSummary {
    pub written: usize,
    pub aliased: usize,
    pub skipped: usize,
}

/// Run pass 1: populate a [`KnownPathSet`] from every record that will
/// produce a payload entry.
pub fn pass1(records: &mut dyn Iterator<Item = Record>, rules: &crate::fuzzy::FuzzyRuleSet) -> KnownPathSet {
    let mut known = KnownPathSet::new();
    for record in records {
        if !PAYLOAD_STATUSES.contains(&record.status) {
            continue;
        }
        if record.payload.is_empty() {
            continue;
        }
        if let Ok(path) = canonical::canonicalize(&record.original_url, rules) {
            known.insert(path);
        }
    }
    known
}

/// Run pass 2: rewrite every HTML/CSS/JS payload and hand it, along with
/// untouched opaque payloads and redirect aliases, to `sink`. Requires the
/// [`KnownPathSet`] pass 1 built.
pub fn pass2(
    records: &mut dyn Iterator<Item = Record>,
    known: &KnownPathSet,
    config: &RewriteConfig,
    sink: &mut dyn EntrySink,
) -> RewriteSummary {
    let mut summary = RewriteSummary::default();
    let mut written = KnownPathSet::new();
    let modules = Rc::new(RefCell::new(ModuleGraph::new()));

    for record in records {
        if ALIAS_STATUSES.contains(&record.status) {
            handle_alias(&record, known, &config.fuzzy_rules, sink, &mut summary);
            continue;
        }
        if !PAYLOAD_STATUSES.contains(&record.status) {
            summary.skipped += 1;
            continue;
        }

        match rewrite_record(&record, known, config, &modules) {
            Ok((path, bytes)) => {
                // A second record mapping to a canonical path this pass
                // already wrote is dropped silently, first writer wins.
                if !written.insert(path.clone()) {
                    let collision = RewriteError::Collision(path.as_str().to_string());
                    log::debug!("{collision}");
                    summary.skipped += 1;
                    continue;
                }
                sink.write_entry(&path, &bytes, record.media_type_hint.as_deref());
                summary.written += 1;
            }
            Err(err) => {
                log::debug!("skipping record {:?}: {err}", record.original_url);
                summary.skipped += 1;
            }
        }
    }

    summary
}

fn handle_alias(
    record: &Record,
    known: &KnownPathSet,
    rules: &crate::fuzzy::FuzzyRuleSet,
    sink: &mut dyn EntrySink,
    summary: &mut RewriteSummary,
) {
    let Some(target_url) = &record.redirect_target else {
        summary.skipped += 1;
        return;
    };
    let (Ok(source), Ok(target)) = (
        canonical::canonicalize(&record.original_url, rules),
        canonical::canonicalize(target_url, rules),
    ) else {
        summary.skipped += 1;
        return;
    };

    // A redirect whose target is outside the known-path set is dropped
    // rather than aliased.
    if !known.contains(&target) {
        summary.skipped += 1;
        return;
    }
    if source == target {
        summary.skipped += 1;
        return;
    }

    sink.write_alias(&source, &target);
    summary.aliased += 1;
}

fn rewrite_record(
    record: &Record,
    known: &KnownPathSet,
    config: &RewriteConfig,
    modules: &Rc<RefCell<ModuleGraph>>,
) -> Result<(CanonicalPath, Vec<u8>)> {
    if record.payload.is_empty() {
        return Err(RewriteError::EmptyPayload);
    }

    let path = canonical::canonicalize(&record.original_url, &config.fuzzy_rules)
        .map_err(|_| RewriteError::InvalidUrl(record.original_url.clone()))?;

    let class = MediaClass::infer(
        record.record_type_hint.as_deref(),
        record.media_type_hint.as_deref(),
    );
    let class = match class {
        MediaClass::JsClassic => modules.borrow().classify_script(&path),
        other => other,
    };

    if class == MediaClass::Opaque {
        let hint = record
            .media_type_hint
            .as_deref()
            .or(record.record_type_hint.as_deref())
            .unwrap_or("unknown")
            .to_string();
        log::debug!("{}", RewriteError::UnsupportedMedia(hint));
    }

    let text = String::from_utf8(record.payload.clone())
        .map_err(|e| RewriteError::ParseError { kind: "utf8", message: e.to_string() })?;

    let url = Url::parse(&record.original_url)
        .map_err(|e| RewriteError::InvalidUrl(format!("{}: {e}", record.original_url)))?;
    let ctx = DocumentContext::new(url, path.clone(), Some(config.bundle_prefix.clone()));

    let rewritten = match class {
        MediaClass::Html => {
            let extras = HtmlExtras {
                header_snippet: Some(header_snippet(&ctx, config)),
                custom_css_link: config.custom_css_link.clone(),
            };
            html::rewrite_html(&text, &ctx, &config.fuzzy_rules, known, &extras, modules)
        }
        MediaClass::Css => css::rewrite_css(&text, &ctx, &config.fuzzy_rules, known),
        MediaClass::JsClassic => js::rewrite_js(&text, &ctx, &config.fuzzy_rules, known, false),
        MediaClass::JsModule => {
            // Transitive propagation for a module fetched as its own
            // top-level record.
            for imported in js::discover_module_imports(&text, &ctx, &config.fuzzy_rules) {
                modules.borrow_mut().mark_module(imported);
            }
            js::rewrite_js(&text, &ctx, &config.fuzzy_rules, known, true)
        }
        MediaClass::Opaque => text,
    };

    Ok((path, rewritten.into_bytes()))
}

/// Build the `<head>`-prepended script tag that initializes the Dynamic
/// Rewriter Helper for one document, carrying its original scheme, host,
/// and URL.
fn header_snippet(ctx: &DocumentContext, config: &RewriteConfig) -> String {
    let cfg = crate::dynamic::HelperConfig::new(
        ctx.original_document_url.as_str(),
        &ctx.original_document_url,
        &config.bundle_prefix,
    );
    let json = cfg.to_json().unwrap_or_default();
    format!(
        r#"<script src="{}{}helper.js" type="module"></script><script>window.zimHelperConfig = {json};</script>"#,
        config.bundle_prefix, config.static_prefix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestSink {
        entries: HashMap<String, Vec<u8>>,
        aliases: HashMap<String, String>,
    }

    impl EntrySink for TestSink {
        fn write_entry(&mut self, path: &CanonicalPath, content: &[u8], _media_type_hint: Option<&str>) {
            self.entries.insert(path.as_str().to_string(), content.to_vec());
        }
        fn write_alias(&mut self, path: &CanonicalPath, alias_of: &CanonicalPath) {
            self.aliases.insert(path.as_str().to_string(), alias_of.as_str().to_string());
        }
    }

    fn record(url: &str, status: u16, body: &str, media: &str) -> Record {
        Record {
            original_url: url.to_string(),
            media_type_hint: Some(media.to_string()),
            record_type_hint: None,
            status,
            payload: body.as_bytes().to_vec(),
            redirect_target: None,
        }
    }

    #[test]
    fn html_record_is_written_once() {
        let config = RewriteConfig::builder()
            .bundle_prefix("http://library/myzim/")
            .build();
        let records = vec![record(
            "https://www.example.com/a.html",
            200,
            "<html><body><a href=\"https://www.example.com/b.html\">b</a></body></html>",
            "text/html",
        )];

        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);

        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 0);
        assert!(sink.entries.contains_key("www.example.com/a.html"));
    }

    #[test]
    fn empty_payload_is_skipped() {
        let config = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let records = vec![record("https://example.com/a.html", 200, "", "text/html")];
        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.written, 0);
    }

    #[test]
    fn second_record_with_same_canonical_path_is_dropped() {
        let config = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let records = vec![
            record("https://example.com/a.html?1700000000", 200, "<p>first</p>", "text/html"),
            record("https://example.com/a.html?1800000000", 200, "<p>second</p>", "text/html"),
        ];
        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 1);
        assert!(sink.entries.get("example.com/a.html").unwrap().starts_with(b"<p>first"));
    }

    #[test]
    fn redirect_to_known_path_becomes_alias() {
        let config = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let mut alias_record = record("https://example.com/old.html", 301, "", "");
        alias_record.redirect_target = Some("https://example.com/new.html".to_string());
        let records = vec![
            record("https://example.com/new.html", 200, "<p>hi</p>", "text/html"),
            alias_record,
        ];
        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.aliased, 1);
        assert_eq!(sink.aliases.get("example.com/old.html"), Some(&"example.com/new.html".to_string()));
    }

    #[test]
    fn opaque_media_is_passed_through_unchanged() {
        let config = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let records = vec![record("https://example.com/logo.png", 200, "\u{89}PNG", "image/png")];
        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);
        assert_eq!(summary.written, 1);
        assert_eq!(sink.entries.get("example.com/logo.png").unwrap(), "\u{89}PNG".as_bytes());
    }

    #[test]
    fn redirect_to_unknown_target_is_dropped() {
        let config = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let mut alias_record = record("https://example.com/old.html", 302, "", "");
        alias_record.redirect_target = Some("https://example.com/nowhere.html".to_string());
        let records = vec![alias_record];
        let known = pass1(&mut records.clone_iter(), &config.fuzzy_rules);
        let mut sink = TestSink::default();
        let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);
        assert_eq!(summary.aliased, 0);
        assert_eq!(summary.skipped, 1);
    }

    /// Test-only helper: `Record` isn't `Clone` (payload can be large in
    /// real use), but tests need to run the same fixed `Vec<Record>`
    /// through both passes.
    trait CloneIterExt {
        fn clone_iter(&self) -> std::vec::IntoIter<Record>;
    }
    impl CloneIterExt for Vec<Record> {
        fn clone_iter(&self) -> std::vec::IntoIter<Record> {
            self.iter()
                .map(|r| Record {
                    original_url: r.original_url.clone(),
                    media_type_hint: r.media_type_hint.clone(),
                    record_type_hint: r.record_type_hint.clone(),
                    status: r.status,
                    payload: r.payload.clone(),
                    redirect_target: r.redirect_target.clone(),
                })
                .collect::<Vec<_>>()
                .into_iter()
        }
    }
}
