//! CSS sub-rewriter — rewrites every `url(...)` token and `@import` string.
//!
//! Built on `lightningcss`'s visitor API: a `Visitor` implementation walks
//! the parsed stylesheet and rewrites every `Url` node it finds, then the
//! stylesheet is printed back out.

use crate::fuzzy::FuzzyRuleSet;
use crate::known_paths::KnownPathSet;
use crate::rewrite::{self, DocumentContext};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::visitor::{Visit, VisitTypes, Visitor, visit_types};

/// Rewrite every `url(...)` and `@import` target in `css`.
///
/// Invalid CSS is passed through unchanged rather than dropped; a parse
/// failure falls back to passthrough with a logged warning.
#[must_use]
pub fn rewrite_css(css: &str, ctx: &DocumentContext, rules: &FuzzyRuleSet, known: &KnownPathSet) -> String {
    let mut stylesheet = match StyleSheet::parse(css, ParserOptions::default()) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("failed to parse css payload, passing through: {e:?}");
            return css.to_string();
        }
    };

    let mut visitor = UrlRewriter { ctx, rules, known };
    if stylesheet.visit(&mut visitor).is_err() {
        log::warn!("failed to visit css stylesheet, passing through");
        return css.to_string();
    }

    match stylesheet.to_css(PrinterOptions::default()) {
        Ok(result) => result.code,
        Err(e) => {
            log::warn!("failed to serialize rewritten css, passing through: {e:?}");
            css.to_string()
        }
    }
}

struct UrlRewriter<'a> {
    ctx: &'a DocumentContext,
    rules: &'a FuzzyRuleSet,
    known: &'a KnownPathSet,
}

impl<'i, 'a> Visitor<'i> for UrlRewriter<'a> {
    type Error = std::convert::Infallible;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(URLS)
    }

    fn visit_url(
        &mut self,
        url: &mut lightningcss::values::url::Url<'i>,
    ) -> Result<(), Self::Error> {
        let original = url.url.as_ref();
        if let Some(rewritten) = rewrite::rewrite_reference(original, self.ctx, self.rules, self.known) {
            url.url = rewritten.into();
        }
        Ok(())
    }
}
