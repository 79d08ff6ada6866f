pub const RESPONSE_HEADER_SERVER: &str = "prevu";
pub const TCP_LISTEN_BACKLOG: u32 = 1024;
pub const MAX_CLIENTS: usize = 512;

/// Path of the explicit proxy endpoint, i.e. `/proxy?url=...`
pub const PROXY_ENDPOINT: &str = "/proxy";
/// Health endpoint answered locally without touching any upstream
pub const HEALTH_ENDPOINT: &str = "/healthz";

/// Cookie carrying the resolved target origin across asset requests.
/// The only state surviving a single request/response cycle; treated as an
/// untrusted client-writable input and re-validated on every read.
pub const ORIGIN_COOKIE_NAME: &str = "__pv_proxy_origin";
pub const ORIGIN_COOKIE_MAX_AGE_SECS: u64 = 3600;

/// Maximum redirect hops the forwarder resolves within one logical call
pub const MAX_REDIRECT_HOPS: usize = 10;

pub const DEFAULT_USER_AGENT: &str =
  "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 PrevuPreviewProxy/1.0";
pub const DEFAULT_ACCEPT: &str = "*/*";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Paths that always belong to the preview application and are never proxied
pub const RESERVED_PREVIEW_PATHS: &[&str] = &[
  "/preview/",
  "/index.html",
  "/favicon.ico",
  "/robots.txt",
  "/_headers",
  "/_redirects",
  "/config/",
  "/tests/",
  "/lib/",
  "/docs/",
];

/// Client-side route names the preview surface recognizes for the embedded
/// site; navigations here are redirected into the proxy endpoint.
pub const SITE_NAVIGATION_ROUTES: &[&str] = &[
  "/train-to",
  "/bus-to",
  "/light-rail-to",
  "/services",
  "/status",
  "/tickets",
  "/destinations",
  "/maps",
  "/travel-alerts",
  "/accessibility",
  "/about-us",
  "/careers",
  "/contact",
  "/subscribe",
  "/privacy",
  "/sitemap",
];

/// Well-known static directories and API prefixes of proxied sites
pub const ASSET_PATH_PREFIXES: &[&str] = &["/_nuxt/", "/_next/", "/static/", "/assets/", "/cdn-cgi/", "/api/"];

/// Asset folder prepended to bare code-split chunk filenames, which browsers
/// otherwise resolve against the preview app's document root.
pub const CHUNK_ASSET_PREFIX: &str = "/_nuxt";

/// Inbound headers copied verbatim onto catch-all asset requests
pub const SAFE_FORWARD_HEADERS: &[&str] = &[
  "accept",
  "accept-encoding",
  "accept-language",
  "cache-control",
  "if-modified-since",
  "if-none-match",
];

/// Response headers passed through from upstream to the client
pub const PASSTHROUGH_RESPONSE_HEADERS: &[&str] = &["cache-control", "expires", "pragma"];

pub const DEFAULT_TARGET_ALLOWLIST: &[&str] = &["*"];
pub const DEFAULT_TARGET_BLOCKLIST: &[&str] = &["localhost", "127.", "::1"];

/// Cookie-name substrings stripped before a request leaves for the target.
/// An explicitly empty configured list disables the filter entirely.
pub const DEFAULT_SENSITIVE_COOKIE_PATTERNS: &[&str] =
  &["session", "auth", "token", "csrf", "jwt", "secret", "password", "credential"];

/// Tracker hosts rewritten to the neutral placeholder instead of the proxy
pub const DEFAULT_ANALYTICS_BLOCKLIST: &[&str] = &[
  "google-analytics.com",
  "googletagmanager.com",
  "doubleclick.net",
  "connect.facebook.net",
  "hotjar.com",
  "segment.com",
  "segment.io",
  "mixpanel.com",
  "amplitude.com",
  "clarity.ms",
  "newrelic.com",
  "nr-data.net",
];
pub const ANALYTICS_PLACEHOLDER_URL: &str = "about:blank";

/// `server` header substring identifying the edge CDN whose challenge pages
/// are classified aggressively (status alone is enough)
pub const EDGE_CDN_SERVER_MARKER: &str = "cloudflare";

/// Markers found in challenge-page URLs or bodies
pub const CHALLENGE_MARKERS: &[&str] = &[
  "cf-chl",
  "challenge-platform",
  "cf_chl_opt",
  "_cf_chl_tk",
  "just a moment",
  "checking your browser",
  "turnstile",
];

/// Challenge-resolution scripts must pass through even under 403, otherwise
/// the challenge can never complete.
pub const CHALLENGE_SCRIPT_PATH: &str = "/cdn-cgi/challenge-platform/";

/// Cookie-consent overlays hidden inside rewritten pages
pub const CONSENT_BANNER_SELECTORS: &[&str] = &[
  "#onetrust-banner-sdk",
  ".onetrust-pc-dark-filter",
  ".optanon-alert-box-wrapper",
  ".cc-window",
  ".cc-banner",
  ".cookie-consent",
  ".cookie-consent-container",
  "#cookie-consent",
  ".js-consent-banner",
  ".app-consent-banner",
  ".osano-cm-window",
  ".osano-cm-wrapper",
  ".cky-consent-container",
  ".cky-overlay",
  ".gdprCookieMessage",
  "#cookiebanner",
  ".cookieBanner",
  ".truste_overlay",
  ".truste_box_overlay",
];
