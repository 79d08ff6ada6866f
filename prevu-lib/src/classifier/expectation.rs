/// Inferred MIME category of a request, used to pick fallback bodies when the
/// upstream answer is broken or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
  Html,
  Javascript,
  Css,
  Font,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentExpectation {
  pub kind: ContentKind,
}

impl ContentExpectation {
  /// Derive the expectation from the Accept header, falling back to the
  /// requested path's extension.
  pub fn derive(accept: Option<&str>, path: &str) -> Self {
    if let Some(accept) = accept {
      let accept = accept.to_ascii_lowercase();
      if accept.contains("text/html") {
        return Self { kind: ContentKind::Html };
      }
      if accept.contains("text/css") {
        return Self { kind: ContentKind::Css };
      }
      if accept.contains("javascript") {
        return Self { kind: ContentKind::Javascript };
      }
      if accept.contains("font/") {
        return Self { kind: ContentKind::Font };
      }
    }
    Self {
      kind: kind_from_extension(path),
    }
  }

  /// MIME type matching the expectation, used on synthesized bodies
  pub fn mime(&self) -> &'static str {
    match self.kind {
      ContentKind::Html => "text/html; charset=utf-8",
      ContentKind::Javascript => "application/javascript",
      ContentKind::Css => "text/css",
      ContentKind::Font => "font/woff2",
    }
  }
}

fn kind_from_extension(path: &str) -> ContentKind {
  let ext = path
    .rsplit('/')
    .next()
    .and_then(|segment| segment.rsplit_once('.'))
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "js" | "mjs" => ContentKind::Javascript,
    "css" => ContentKind::Css,
    "woff" | "woff2" | "ttf" | "eot" | "otf" => ContentKind::Font,
    _ => ContentKind::Html,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accept_header_has_priority() {
    let e = ContentExpectation::derive(Some("text/html,application/xhtml+xml"), "/bundle.js");
    assert_eq!(e.kind, ContentKind::Html);
    let e = ContentExpectation::derive(Some("text/css,*/*;q=0.1"), "/whatever");
    assert_eq!(e.kind, ContentKind::Css);
  }

  #[test]
  fn extension_is_the_fallback() {
    let e = ContentExpectation::derive(Some("*/*"), "/_nuxt/entry.BhYfDVsa.js");
    assert_eq!(e.kind, ContentKind::Javascript);
    let e = ContentExpectation::derive(None, "/fonts/inter.woff2");
    assert_eq!(e.kind, ContentKind::Font);
    let e = ContentExpectation::derive(None, "/about-us");
    assert_eq!(e.kind, ContentKind::Html);
  }

  #[test]
  fn stub_mime_types_match_kinds() {
    assert_eq!(
      ContentExpectation { kind: ContentKind::Javascript }.mime(),
      "application/javascript"
    );
    assert_eq!(ContentExpectation { kind: ContentKind::Css }.mime(), "text/css");
  }
}
