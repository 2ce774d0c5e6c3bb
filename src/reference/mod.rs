//! Reference classification — deciding, at discovery time, what kind of
//! URL-bearing token an HTML attribute, CSS `url(...)`/`@import`, or JS
//! string literal holds.

/// The six ways a discovered reference can be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `https://host/path` — carries its own scheme.
    AbsoluteWithScheme,
    /// `//host/path` — inherits the document's scheme.
    SchemeRelative,
    /// `/path` — absolute within the document's host.
    AbsolutePath,
    /// `path`, `./path`, `../path` — resolved against the document/base URL.
    Relative,
    /// `#fragment` — no navigation, stays in the current document.
    AnchorOnly,
    /// `data:`, `blob:`, `mailto:`, `javascript:`, `about:`, `tel:`, or a
    /// templating sigil (`{`, `*`) — passed through verbatim.
    NonNavigational,
}

impl ReferenceKind {
    /// Whether a reference of this kind should be rewritten at all. Only
    /// the four navigational, URL-shaped kinds are.
    #[must_use]
    pub fn is_rewritable(self) -> bool {
        matches!(
            self,
            Self::AbsoluteWithScheme | Self::SchemeRelative | Self::AbsolutePath | Self::Relative
        )
    }
}

const NON_NAV_SCHEMES: &[&str] = &["data:", "blob:", "mailto:", "javascript:", "about:", "tel:"];

/// Classify a raw reference token exactly as discovered in source text
/// (before any resolution against a base URL).
#[must_use]
pub fn classify(raw: &str) -> ReferenceKind {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return ReferenceKind::NonNavigational;
    }
    if trimmed.starts_with('#') {
        return ReferenceKind::AnchorOnly;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('*') {
        return ReferenceKind::NonNavigational;
    }

    let lower = trimmed.to_ascii_lowercase();
    if NON_NAV_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return ReferenceKind::NonNavigational;
    }

    if trimmed.starts_with("//") {
        return ReferenceKind::SchemeRelative;
    }
    if trimmed.starts_with('/') {
        return ReferenceKind::AbsolutePath;
    }
    if has_scheme(trimmed) {
        return ReferenceKind::AbsoluteWithScheme;
    }
    ReferenceKind::Relative
}

/// Whether `s` begins with an RFC 3986 scheme (`ALPHA *( ALPHA / DIGIT /
/// "+" / "-" / "." ) ":"`), which distinguishes `https://host` from a bare
/// relative path that happens to contain a colon (e.g. `a:b` used as a
/// sibling-relative filename is rare but not impossible — this check
/// requires at least one letter before the colon and `://` or a known
/// non-nav prefix to already have been ruled out).
fn has_scheme(s: &str) -> bool {
    match s.find(':') {
        Some(idx) if idx > 0 => {
            let candidate = &s[..idx];
            candidate.starts_with(|c: char| c.is_ascii_alphabetic())
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}
