//! Route derivation and trailing segment encoding.
//!
//! A derived route is `base_path + path + "/:0" + "/:1" + ...`, one
//! positional placeholder per trailing segment. Placeholders use the
//! `:name` syntax understood by the HTTP router.

use std::borrow::Cow;
use std::fmt::Write;

/// Normalizes a base path: leading `/`, no trailing `/`, empty for root.
pub fn normalize_base(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Derives the route for an endpoint path with `arity` trailing segments.
///
/// `base_path` is prefixed exactly once, whatever slashes it carries.
pub fn derive_route(base_path: &str, path: &str, arity: usize) -> String {
    let mut route = normalize_base(base_path);
    let path = path.trim_end_matches('/');
    if !path.is_empty() {
        if !path.starts_with('/') {
            route.push('/');
        }
        route.push_str(path);
    }
    for index in 0..arity {
        let _ = write!(route, "/:{}", index);
    }
    if route.is_empty() {
        route.push('/');
    }
    route
}

/// Replaces every placeholder segment with a bare `:` so that routes
/// differing only in placeholder names compare equal.
pub fn normalize_route(route: &str) -> String {
    route
        .split('/')
        .map(|segment| {
            let is_placeholder = segment.starts_with(':')
                || segment.starts_with('*')
                || (segment.starts_with('{') && segment.ends_with('}'));
            if is_placeholder { ":" } else { segment }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Converts `:name` placeholders to the `{name}` form used by OpenAPI,
/// mapping positional names through `rename`.
pub fn templated_route(route: &str, rename: impl Fn(&str) -> String) -> String {
    route
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", rename(name)),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the percent-decoded segments that follow `prefix` in
/// `request_path`.
///
/// Returns `None` if `request_path` does not start with `prefix` at a
/// segment boundary, or if a segment does not decode to UTF-8.
pub fn trailing_segments(request_path: &str, prefix: &str) -> Option<Vec<String>> {
    let prefix = prefix.trim_end_matches('/');
    let rest = request_path.strip_prefix(prefix)?;
    if rest.is_empty() || rest == "/" {
        return Some(Vec::new());
    }
    let rest = rest.strip_prefix('/')?;
    rest.trim_end_matches('/')
        .split('/')
        .map(|segment| urlencoding::decode(segment).ok().map(Cow::into_owned))
        .collect()
}

/// Percent-encodes one path segment.
pub fn encode_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}
