use crate::constants::*;
use once_cell::sync::Lazy;
use regex::Regex;

/// Outcome of classifying an inbound path that did not address the proxy
/// endpoint explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
  /// Preview-app content; not ours to handle
  PassThrough,
  /// A client-side route of the embedded site; redirected into the proxy
  /// endpoint so the page gets full HTML rewriting
  NavigationRoute,
  /// An asset of the embedded site; forwarded directly
  ProxyAsset,
}

static ASSET_EXTENSION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\.(js|mjs|css|woff2?|ttf|eot|svg|png|jpe?g|gif|webp|ico|json)$").unwrap());

/// Code-split chunk filenames look like `name.hash.ext` at the document root
static CHUNK_FILENAME_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)^/[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.(js|css|mjs)$").unwrap());

/// Pure classification of an inbound request path
pub fn classify_path(path: &str) -> PathClass {
  if path.is_empty() || path == "/" {
    return PathClass::PassThrough;
  }
  if RESERVED_PREVIEW_PATHS
    .iter()
    .any(|p| path.starts_with(p) || path == p.trim_end_matches('/'))
  {
    return PathClass::PassThrough;
  }
  if SITE_NAVIGATION_ROUTES.iter().any(|r| path.starts_with(r)) {
    return PathClass::NavigationRoute;
  }
  if ASSET_PATH_PREFIXES.iter().any(|p| path.starts_with(p)) || ASSET_EXTENSION_RE.is_match(path) {
    return PathClass::ProxyAsset;
  }
  PathClass::PassThrough
}

/// Repair a bare code-split chunk path missing its asset-folder prefix.
/// Browsers resolve split-bundle imports against the preview app's document
/// root instead of the original site's asset directory.
pub fn repair_chunk_path(path: &str) -> Option<String> {
  if CHUNK_FILENAME_RE.is_match(path) && !path.starts_with(&format!("{CHUNK_ASSET_PREFIX}/")) {
    return Some(format!("{CHUNK_ASSET_PREFIX}{path}"));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn root_and_reserved_paths_pass_through() {
    assert_eq!(classify_path("/"), PathClass::PassThrough);
    assert_eq!(classify_path("/index.html"), PathClass::PassThrough);
    assert_eq!(classify_path("/preview/app.js"), PathClass::PassThrough);
    assert_eq!(classify_path("/docs"), PathClass::PassThrough);
  }

  #[test]
  fn navigation_routes_win_over_asset_patterns() {
    assert_eq!(classify_path("/services"), PathClass::NavigationRoute);
    assert_eq!(classify_path("/maps/region.png"), PathClass::NavigationRoute);
  }

  #[test]
  fn asset_prefixes_and_extensions_are_candidates() {
    assert_eq!(classify_path("/_nuxt/entry.BhYfDVsa.js"), PathClass::ProxyAsset);
    assert_eq!(classify_path("/api/stations"), PathClass::ProxyAsset);
    assert_eq!(classify_path("/images/logo.svg"), PathClass::ProxyAsset);
    assert_eq!(classify_path("/unknown/route"), PathClass::PassThrough);
  }

  #[test]
  fn bare_chunks_get_the_asset_prefix() {
    assert_eq!(
      repair_chunk_path("/BhYfDVsa.CzOzmLo0.js").as_deref(),
      Some("/_nuxt/BhYfDVsa.CzOzmLo0.js")
    );
    assert_eq!(
      repair_chunk_path("/Thumbnail.CzOzmLo0.css").as_deref(),
      Some("/_nuxt/Thumbnail.CzOzmLo0.css")
    );
    // already prefixed or not chunk-shaped
    assert!(repair_chunk_path("/_nuxt/BhYfDVsa.CzOzmLo0.js").is_none());
    assert!(repair_chunk_path("/app.js").is_none());
    assert!(repair_chunk_path("/a/b.c.js").is_none());
  }
}
