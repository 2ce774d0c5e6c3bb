//! Caller-supplied configuration for a conversion run, built with a
//! `PhantomData`-based typestate builder: the one field the core genuinely
//! requires (`bundle_prefix`) is only reachable through a builder state that
//! forces it to be set before `.build()` becomes callable.

use crate::dynamic::STATIC_PREFIX;
use crate::fuzzy::FuzzyRuleSet;
use std::marker::PhantomData;

/// Builder type-state: bundle prefix has not yet been supplied.
pub struct Unconfigured;
/// Builder type-state: bundle prefix is set; `.build()` is now available.
pub struct WithBundlePrefix;

/// Configuration shared across one conversion run's rewriting.
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Absolute URL prefix the bundle is served under at replay time, used
    /// only by the Dynamic Rewriter Helper.
    pub bundle_prefix: String,
    /// A user-supplied CSS `<link>` inserted at the end of every rewritten
    /// document's `<head>`, if configured.
    pub custom_css_link: Option<String>,
    /// Reserved path segment helper assets are stored under; `_zim_static/`
    /// unless overridden.
    pub static_prefix: String,
    /// The fuzzy rule list to apply; defaults to the built-in table.
    pub fuzzy_rules: FuzzyRuleSet,
}

/// Fluent builder for [`RewriteConfig`].
pub struct RewriteConfigBuilder<State = Unconfigured> {
    bundle_prefix: Option<String>,
    custom_css_link: Option<String>,
    static_prefix: String,
    fuzzy_rules: FuzzyRuleSet,
    _phantom: PhantomData<State>,
}

impl Default for RewriteConfigBuilder<Unconfigured> {
    fn default() -> Self {
        Self {
            bundle_prefix: None,
            custom_css_link: None,
            static_prefix: STATIC_PREFIX.to_string(),
            fuzzy_rules: FuzzyRuleSet::built_in(),
            _phantom: PhantomData,
        }
    }
}

impl RewriteConfig {
    /// Start building a [`RewriteConfig`].
    #[must_use]
    pub fn builder() -> RewriteConfigBuilder<Unconfigured> {
        RewriteConfigBuilder::default()
    }
}

impl RewriteConfigBuilder<Unconfigured> {
    /// Supply the bundle prefix, the one field every rewrite needs. Returns
    /// a builder in the state where `.build()` is callable.
    #[must_use]
    pub fn bundle_prefix(self, prefix: impl Into<String>) -> RewriteConfigBuilder<WithBundlePrefix> {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        RewriteConfigBuilder {
            bundle_prefix: Some(prefix),
            custom_css_link: self.custom_css_link,
            static_prefix: self.static_prefix,
            fuzzy_rules: self.fuzzy_rules,
            _phantom: PhantomData,
        }
    }
}

impl<State> RewriteConfigBuilder<State> {
    /// Attach a custom CSS `<link>` tag to every rewritten document.
    #[must_use]
    pub fn custom_css_link(mut self, link: impl Into<String>) -> Self {
        self.custom_css_link = Some(link.into());
        self
    }

    /// Override the reserved static-asset path prefix (default
    /// `_zim_static/`).
    #[must_use]
    pub fn static_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.static_prefix = prefix.into();
        self
    }

    /// Override the fuzzy rule list (default: the built-in table). Tests
    /// substitute an alternate or empty list this way rather than the core
    /// ever reading from a process-wide singleton.
    #[must_use]
    pub fn fuzzy_rules(mut self, rules: FuzzyRuleSet) -> Self {
        self.fuzzy_rules = rules;
        self
    }
}

impl RewriteConfigBuilder<WithBundlePrefix> {
    /// Finish building. Only callable once [`bundle_prefix`](Self::bundle_prefix)
    /// has been supplied, enforced at compile time by the builder's type state.
    #[must_use]
    pub fn build(self) -> RewriteConfig {
        RewriteConfig {
            bundle_prefix: self.bundle_prefix.expect("type state guarantees this is set"),
            custom_css_link: self.custom_css_link,
            static_prefix: self.static_prefix,
            fuzzy_rules: self.fuzzy_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_bundle_prefix_before_build() {
        let cfg = RewriteConfig::builder()
            .bundle_prefix("http://library/content/myzim")
            .build();
        assert_eq!(cfg.bundle_prefix, "http://library/content/myzim/");
        assert_eq!(cfg.static_prefix, STATIC_PREFIX);
    }

    #[test]
    fn custom_css_link_and_static_prefix_override() {
        let cfg = RewriteConfig::builder()
            .bundle_prefix("http://library/myzim/")
            .custom_css_link(r#"<link rel="stylesheet" href="custom.css">"#)
            .static_prefix("_assets/")
            .build();
        assert!(cfg.custom_css_link.is_some());
        assert_eq!(cfg.static_prefix, "_assets/");
    }

    #[test]
    fn default_fuzzy_rules_are_built_in() {
        let cfg = RewriteConfig::builder().bundle_prefix("http://x/").build();
        let out = cfg.fuzzy_rules.apply("www.youtube.com/get_video_info?video_id=1");
        assert_eq!(out, "youtube.fuzzy.replayweb.page/get_video_info?video_id=1");
    }
}
