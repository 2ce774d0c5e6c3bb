//! Fuzzy Rule Engine — ordered regex substitutions applied to canonical
//! paths so equivalent URLs collapse onto one bundle entry.
//!
//! Rules are authored once, in [`rules::BUILTIN_RULES`], using `\1`-style
//! backreferences so the same literal table can drive both this Rust engine
//! and the JavaScript table embedded in the dynamic helper asset
//! ([`crate::dynamic::render_helper_js`]) without semantic drift.

pub mod rules;

use regex::Regex;
use std::sync::Arc;

/// One ordered `(match, replace)` pair.
#[derive(Clone)]
pub struct FuzzyRule {
    source_pattern: String,
    source_replace: String,
    regex: Regex,
    /// Replacement template rewritten into `regex`-crate `${N}` syntax.
    replace: String,
}

impl FuzzyRule {
    /// Build a rule from the neutral `\1`-backreference source format.
    ///
    /// # Errors
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn new(pattern: &str, replace: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self {
            source_pattern: pattern.to_string(),
            source_replace: replace.to_string(),
            regex,
            replace: to_dollar_style(replace),
        })
    }

    /// The original pattern, as authored (for diagnostics and JS codegen).
    #[must_use]
    pub fn source_pattern(&self) -> &str {
        &self.source_pattern
    }

    /// The original `\N`-style replacement template (for JS codegen).
    #[must_use]
    pub fn source_replace(&self) -> &str {
        &self.source_replace
    }

    /// Apply this rule to `input`, returning `None` if it does not match.
    #[must_use]
    pub fn apply(&self, input: &str) -> Option<String> {
        if !self.regex.is_match(input) {
            return None;
        }
        Some(self.regex.replace(input, self.replace.as_str()).into_owned())
    }
}

/// Rewrite `\1`, `\2`, … backreferences into the `${1}`, `${2}`, … syntax
/// the `regex` crate expects in replacement templates.
fn to_dollar_style(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(d) = chars.peek().copied() {
                if d.is_ascii_digit() {
                    chars.next();
                    out.push_str("${");
                    out.push(d);
                    out.push('}');
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Ordered, immutable list of fuzzy rules, cheaply cloneable so callers can
/// inject a custom list without the crate ever reaching for a global.
#[derive(Clone)]
pub struct FuzzyRuleSet {
    rules: Arc<Vec<FuzzyRule>>,
}

impl FuzzyRuleSet {
    /// Build a rule set from an explicit, already-ordered list of rules.
    #[must_use]
    pub fn new(rules: Vec<FuzzyRule>) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// The built-in rule table (YouTube, Vimeo, Cheatography, generic
    /// trailing-numeric-query trim). Safe to call repeatedly — compilation
    /// happens once per call since `Regex` has no cheap default; callers
    /// that construct many engines should keep one [`FuzzyRuleSet`] around
    /// and clone it instead of calling this repeatedly in a hot loop.
    #[must_use]
    pub fn built_in() -> Self {
        let rules = rules::BUILTIN_RULES
            .iter()
            .filter_map(|(pattern, replace)| FuzzyRule::new(pattern, replace).ok())
            .collect();
        Self::new(rules)
    }

    /// An empty rule set — useful for tests that want canonicalization
    /// without any fuzzy reduction.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Iterate the rules in application order.
    pub fn rules(&self) -> impl Iterator<Item = &FuzzyRule> {
        self.rules.iter()
    }

    /// Apply the rule list to `path`: on the first rule whose regex changes
    /// the input, return the substituted string. If no rule changes the
    /// input, return it unchanged.
    #[must_use]
    pub fn apply(&self, path: &str) -> String {
        for rule in self.rules.iter() {
            if let Some(replaced) = rule.apply(path)
                && replaced != path
            {
                return replaced;
            }
        }
        path.to_string()
    }
}

impl Default for FuzzyRuleSet {
    fn default() -> Self {
        Self::built_in()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let rules = FuzzyRuleSet::new(vec![
            FuzzyRule::new(r"^a(.*)$", r"first\1").unwrap(),
            FuzzyRule::new(r"^a(.*)$", r"second\1").unwrap(),
        ]);
        assert_eq!(rules.apply("abc"), "firstbc");
    }

    #[test]
    fn no_match_passes_through() {
        let rules = FuzzyRuleSet::new(vec![FuzzyRule::new(r"^zzz$", "nope").unwrap()]);
        assert_eq!(rules.apply("example.com/path"), "example.com/path");
    }

    #[test]
    fn idempotent_application() {
        let rules = FuzzyRuleSet::built_in();
        let once = rules.apply("www.youtube.com/get_video_info?video_id=123ah");
        let twice = rules.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn youtube_video_info() {
        let rules = FuzzyRuleSet::built_in();
        let out = rules.apply("www.youtube.com/get_video_info?video_id=123ah");
        assert_eq!(out, "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah");
    }

    #[test]
    fn ytimg_thumbnail() {
        let rules = FuzzyRuleSet::built_in();
        let out = rules.apply("i.ytimg.com/vi/-KpLmsAR23I/maxresdefault.jpg?sqp=abc");
        assert_eq!(out, "i.ytimg.com.fuzzy.replayweb.page/vi/-KpLmsAR23I/thumbnail.jpg");
    }

    #[test]
    fn generic_trailing_numeric_query_is_trimmed() {
        let rules = FuzzyRuleSet::built_in();
        let out = rules.apply("example.com/asset.js?1234567890");
        assert_eq!(out, "example.com/asset.js");
    }

    #[test]
    fn generic_rule_avoids_catch_all() {
        // A non-numeric query must survive untouched.
        let rules = FuzzyRuleSet::built_in();
        let out = rules.apply("example.com/asset.js?v=abc");
        assert_eq!(out, "example.com/asset.js?v=abc");
    }
}
