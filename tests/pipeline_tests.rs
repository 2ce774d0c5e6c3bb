//! End-to-end pass 1 / pass 2 driver test, exercising the full conversion
//! pipeline the way a host binary (WARC reader, ZIM writer) would rather
//! than any single sub-rewriter in isolation.

use anyhow::Context;
use std::collections::HashMap;
use zim_rewrite::{pass1, pass2, CanonicalPath, EntrySink, Record, RewriteConfig};

#[derive(Default)]
struct MemorySink {
    entries: HashMap<String, Vec<u8>>,
    aliases: HashMap<String, String>,
}

impl EntrySink for MemorySink {
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
fn full_pipeline_rewrites_a_small_crawl() -> anyhow::Result<()> {
    let config = RewriteConfig::builder().bundle_prefix("http://library/myzim/").build();

    let page = record(
        "https://www.example.com/index.html",
        200,
        r#"<html><body><a href="https://www.example.com/about.html">about</a></body></html>"#,
        "text/html",
    );
    let about = record("https://www.example.com/about.html", 200, "<p>about us</p>", "text/html");
    let mut moved = record("https://www.example.com/old-about.html", 301, "", "");
    moved.redirect_target = Some("https://www.example.com/about.html".to_string());

    let pass1_records = vec![
        record(
            "https://www.example.com/index.html",
            200,
            r#"<html><body><a href="https://www.example.com/about.html">about</a></body></html>"#,
            "text/html",
        ),
        record("https://www.example.com/about.html", 200, "<p>about us</p>", "text/html"),
    ];
    let known = pass1(&mut pass1_records.into_iter(), &config.fuzzy_rules);

    let mut sink = MemorySink::default();
    let records = vec![page, about, moved];
    let summary = pass2(&mut records.into_iter(), &known, &config, &mut sink);

    anyhow::ensure!(summary.written == 2, "expected 2 written, got {}", summary.written);
    anyhow::ensure!(summary.aliased == 1, "expected 1 aliased, got {}", summary.aliased);

    let index = sink
        .entries
        .get("www.example.com/index.html")
        .context("index.html was not written to the sink")?;
    let index = std::str::from_utf8(index).context("index.html was not valid utf-8")?;
    anyhow::ensure!(index.contains(r#"href="./about.html""#), "link was not rewritten: {index}");

    anyhow::ensure!(
        sink.aliases.get("www.example.com/old-about.html")
            == Some(&"www.example.com/about.html".to_string()),
        "redirect was not recorded as an alias"
    );

    Ok(())
}
