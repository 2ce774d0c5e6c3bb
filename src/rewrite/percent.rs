//! The single percent-encoding profile shared by the Static Rewriter and the
//! Dynamic Rewriter Helper.
//!
//! Defines a custom [`percent_encoding::AsciiSet`] rather than reaching for
//! a fixed encode-set, since the right set of bytes to leave decoded in a
//! rewritten link is narrower than any of `percent-encoding`'s built-in
//! profiles.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Bytes left decoded in a rewritten relative or absolute link, beyond the
/// RFC 3986 unreserved set.
///
/// `/` is kept so path segments stay legible. The remaining gen-delims and
/// sub-delims (`: ; , @ & + $ ' ! * ( )`) are kept decoded too: once a query
/// string has been folded into a path segment, only `?` and `=` retain
/// structural meaning worth hiding from an intermediary — encoding the rest
/// just mangles ordinary file names (a MediaWiki asset path like
/// `File:Kiwix_logo_v3.svg` must survive with its colon literal). `?` and
/// `=` are deliberately *not* removed here, so they fall through to
/// `NON_ALPHANUMERIC`'s default of encoding them.
const REWRITE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b',')
    .remove(b'@')
    .remove(b'&')
    .remove(b'+')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'!')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a rewritten link for embedding back into HTML/CSS/JS,
/// preserving `/` and the gen-/sub-delims listed above, while forcing `?`
/// and `=` (and everything else outside the unreserved set) to their
/// percent-encoded form.
#[must_use]
pub fn encode_rewritten(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, REWRITE_ENCODE_SET).to_string()
}
