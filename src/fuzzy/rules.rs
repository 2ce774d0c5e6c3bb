//! Built-in fuzzy rule table.
//!
//! Patterns are ordered most-specific first, deliberately avoiding
//! catch-all patterns: a generic rule placed early would shadow every
//! more specific one that follows it, since the engine stops at the
//! first rule that changes the input.
//!
//! Each `(pattern, replace)` pair uses `\1`-style backreferences in the
//! replacement template — the same literal table [`crate::dynamic::render_helper_js`]
//! reads to emit the browser-side rule list, so the two engines can never
//! drift apart.
pub const BUILTIN_RULES: &[(&str, &str)] = &[
    // YouTube video thumbnails: reduce the cache-busting query to a fixed
    // "thumbnail.jpg" name on a dedicated fuzzy host.
    (
        r"^i\.ytimg\.com/vi/([^/]+)/[^/?]+\.jpg(?:\?.*)?$",
        r"i.ytimg.com.fuzzy.replayweb.page/vi/\1/thumbnail.jpg",
    ),
    // YouTube get_video_info: collapse the www. host onto a stable fuzzy
    // host while keeping the video_id query intact.
    (
        r"^(?:www\.)?youtube\.com/get_video_info(\?.*)?$",
        r"youtube.fuzzy.replayweb.page/get_video_info\1",
    ),
    // Vimeo progressive-download CDN: keep only the resolution segment and
    // the byte range, dropping signed/expiring query parameters.
    (
        r"^[\w.-]+\.akamaized\.net/.*/([0-9]+p\.mp4)\?.*?range=([0-9]+-[0-9]+).*$",
        r"vimeocdn.fuzzy.replayweb.page/\1?range=\2",
    ),
    // Cheatography ships versioned static assets (`?v=NNN`); the content at
    // each version is identical for our purposes, so the version is
    // dropped.
    (
        r"^(cheatography\.com/.*\.js)\?v=[0-9]+(?:&.*)?$",
        r"\1",
    ),
    // Generic: trim a trailing cache-busting query string that is *purely*
    // numeric (e.g. `?1700000000`). Anything with letters, `=`, or `&` is
    // left alone so this never turns into a catch-all.
    (r"^(.*)\?[0-9]+$", r"\1"),
];
