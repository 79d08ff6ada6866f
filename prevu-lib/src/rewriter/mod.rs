mod html_rewrite;
mod inject;
mod templates;
mod url_rewrite;

pub use html_rewrite::rewrite_document;
pub use inject::ensure_base_href;
pub use url_rewrite::{rewrite_srcset, rewrite_url, RewriteContext};
