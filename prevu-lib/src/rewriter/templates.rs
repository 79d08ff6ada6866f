use super::url_rewrite::RewriteContext;
use once_cell::sync::Lazy;

/// Versioned client-side script templates shipped inside rewritten HTML.
/// Generation is a pure formatting step over exactly three substitution
/// points (proxy origin, target origin, analytics blocklist) plus the debug
/// flag; the script content itself mirrors the server-side rewrite algorithm
/// and must be kept in sync with it.
pub(crate) struct ScriptTemplates {
  interceptor: &'static str,
  hydration_guard: &'static str,
}

pub(crate) static TEMPLATES: Lazy<ScriptTemplates> = Lazy::new(ScriptTemplates::load);

impl ScriptTemplates {
  fn load() -> Self {
    Self {
      interceptor: include_str!("assets/interceptor.js"),
      hydration_guard: include_str!("assets/hydration_guard.js"),
    }
  }

  pub(crate) fn render_interceptor(&self, ctx: &RewriteContext, debug: bool) -> String {
    self
      .interceptor
      .replace("{{proxy_base}}", &js_string(&ctx.proxy_origin))
      .replace("{{target_origin}}", &js_string(&ctx.target_origin))
      .replace("{{analytics_blocklist}}", &js_string_array(&ctx.analytics_blocklist))
      .replace("{{debug}}", js_bool(debug))
  }

  pub(crate) fn render_hydration_guard(&self, debug: bool) -> String {
    self.hydration_guard.replace("{{debug}}", js_bool(debug))
  }
}

fn js_bool(value: bool) -> &'static str {
  if value {
    "true"
  } else {
    "false"
  }
}

/// JSON is a subset of JS literals, so this is a safe embedding
fn js_string(value: &str) -> String {
  serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_string_array(values: &[String]) -> String {
  serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::{evaluate_target, PolicySet};

  fn ctx() -> RewriteContext {
    let target = evaluate_target("https://www.site.example/a/", &PolicySet::default()).unwrap();
    RewriteContext::new(&target, "http://preview.local:8100", &["hotjar.com".to_string()])
  }

  #[test]
  fn interceptor_substitution_is_complete() {
    let script = TEMPLATES.render_interceptor(&ctx(), true);
    assert!(!script.contains("{{"), "unsubstituted placeholder left in template");
    assert!(script.contains("var PROXY_BASE = \"http://preview.local:8100\";"));
    assert!(script.contains("var TARGET_ORIGIN = \"https://www.site.example\";"));
    assert!(script.contains("var ANALYTICS_BLOCKLIST = [\"hotjar.com\"];"));
    assert!(script.contains("var DEBUG = true;"));
  }

  #[test]
  fn hydration_guard_substitution_is_complete() {
    let script = TEMPLATES.render_hydration_guard(false);
    assert!(!script.contains("{{"));
    assert!(script.contains("var DEBUG = false;"));
  }

  #[test]
  fn templates_carry_no_premature_close_tag() {
    // a literal close tag inside the script body would truncate the injected element
    assert!(!TEMPLATES.interceptor.contains("</script>"));
    assert!(!TEMPLATES.hydration_guard.contains("</script>"));
  }
}
