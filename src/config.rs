use std::time::Duration;

use url::Url;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_MAX_URL_LENGTH: usize = 2000;
pub const DEFAULT_LOOKUP_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 30 * 60;
pub const DEFAULT_DOWNLOAD_BASE_PATH: &str = "/download";
pub const DEFAULT_FORM_URL: &str = "/";
pub const DEV_ORIGINS: [&str; 2] = ["http://127.0.0.1:5173", "http://localhost:5173"];

pub const SUPPORTED_DOMAINS: [&str; 6] = [
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "facebook.com",
    "instagram.com",
];

/// How a submitted host is compared against the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainMatch {
    /// Host contains the entry anywhere. Accepts `notyoutube.com.evil.example`.
    #[default]
    Substring,
    /// Host equals the entry or is a subdomain of it.
    Suffix,
}

impl DomainMatch {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "substring" | "contains" => Some(Self::Substring),
            "suffix" | "strict" => Some(Self::Suffix),
            _ => None,
        }
    }

    pub fn matches(self, host: &str, domain: &str) -> bool {
        match self {
            Self::Substring => host.contains(domain),
            Self::Suffix => host == domain || host.ends_with(&format!(".{domain}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AntiForgeryMode {
    /// Any non-empty token passes.
    #[default]
    Placeholder,
    /// Only tokens issued by `/api/token` to the same client pass, once.
    Issued,
}

impl AntiForgeryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "placeholder" | "off" => Some(Self::Placeholder),
            "issued" | "session" | "on" => Some(Self::Issued),
            _ => None,
        }
    }
}

/// Process-wide settings, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub trust_proxy_headers: bool,
    pub allowed_domains: Vec<String>,
    pub domain_match: DomainMatch,
    pub max_url_length: usize,
    pub lookup_timeout: Duration,
    pub anti_forgery: AntiForgeryMode,
    pub token_ttl_seconds: i64,
    pub download_base_path: String,
    /// Where the submission form lives; error pages link back to it.
    pub form_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            allowed_origins: Vec::new(),
            trust_proxy_headers: false,
            allowed_domains: SUPPORTED_DOMAINS.iter().map(ToString::to_string).collect(),
            domain_match: DomainMatch::default(),
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            lookup_timeout: Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECONDS),
            anti_forgery: AntiForgeryMode::default(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            download_base_path: DEFAULT_DOWNLOAD_BASE_PATH.to_string(),
            form_url: DEFAULT_FORM_URL.to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Unset or
    /// unparseable values fall back to the defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = resolve_bind_addr(&var);
        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let trust_proxy_headers = var("TRUST_PROXY_HEADERS")
            .as_deref()
            .and_then(read_bool)
            .unwrap_or(defaults.trust_proxy_headers);
        let domain_match = var("DOMAIN_MATCH")
            .as_deref()
            .and_then(DomainMatch::parse)
            .unwrap_or(defaults.domain_match);
        let max_url_length = var("MAX_URL_LENGTH")
            .as_deref()
            .and_then(read_usize)
            .filter(|value| *value > 0)
            .unwrap_or(defaults.max_url_length);
        let lookup_timeout = var("LOOKUP_TIMEOUT_SECONDS")
            .as_deref()
            .and_then(read_usize)
            .filter(|value| *value > 0)
            .map(|seconds| Duration::from_secs(seconds as u64))
            .unwrap_or(defaults.lookup_timeout);
        let anti_forgery = var("ANTI_FORGERY")
            .as_deref()
            .and_then(AntiForgeryMode::parse)
            .unwrap_or(defaults.anti_forgery);
        let token_ttl_seconds = var("TOKEN_TTL_SECONDS")
            .as_deref()
            .and_then(read_usize)
            .filter(|value| *value > 0)
            .map(|seconds| seconds as i64)
            .unwrap_or(defaults.token_ttl_seconds);
        let download_base_path = var("DOWNLOAD_BASE_PATH")
            .as_deref()
            .and_then(non_empty)
            .filter(|path| is_free_route(path))
            .map(ToString::to_string)
            .unwrap_or(defaults.download_base_path);
        let form_url = var("FORM_URL")
            .as_deref()
            .and_then(non_empty)
            .filter(|value| is_form_url(value))
            .map(ToString::to_string)
            .unwrap_or(defaults.form_url);

        Self {
            bind_addr,
            allowed_origins,
            trust_proxy_headers,
            allowed_domains: defaults.allowed_domains,
            domain_match,
            max_url_length,
            lookup_timeout,
            anti_forgery,
            token_ttl_seconds,
            download_base_path,
            form_url,
        }
    }

    /// Origins the CORS layer should accept. Development origins stand in
    /// when none are configured; the flag reports that fallback.
    pub fn cors_origins(&self) -> (Vec<String>, bool) {
        if self.allowed_origins.is_empty() {
            (DEV_ORIGINS.iter().map(ToString::to_string).collect(), true)
        } else {
            (self.allowed_origins.clone(), false)
        }
    }
}

fn resolve_bind_addr(var: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) = var("APP_ADDR")
        .as_deref()
        .and_then(non_empty)
        .map(ToString::to_string)
    {
        return configured;
    }

    if let Some(port) = var("PORT").and_then(|value| value.trim().parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

/// The download path must not collide with the fixed routes.
fn is_free_route(path: &str) -> bool {
    path.starts_with('/')
        && path.len() > 1
        && path != "/savefrom"
        && !path.starts_with("/api/")
        && !path.contains(['{', '}', '*'])
}

/// A site-relative path, or an absolute http(s) URL.
fn is_form_url(value: &str) -> bool {
    if value.starts_with("//") {
        return false;
    }
    if value.starts_with('/') {
        return true;
    }
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn read_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServiceConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.max_url_length, 2000);
        assert_eq!(config.domain_match, DomainMatch::Substring);
        assert_eq!(config.anti_forgery, AntiForgeryMode::Placeholder);
        assert_eq!(config.allowed_domains.len(), SUPPORTED_DOMAINS.len());
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn app_addr_wins_over_port() {
        let config = config_from(&[("APP_ADDR", "10.0.0.1:9000"), ("PORT", "3000")]);
        assert_eq!(config.bind_addr, "10.0.0.1:9000");

        let config = config_from(&[("PORT", " 3000 ")]);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn parses_overrides_and_ignores_garbage() {
        let config = config_from(&[
            ("DOMAIN_MATCH", "Suffix"),
            ("ANTI_FORGERY", "issued"),
            ("MAX_URL_LENGTH", "abc"),
            ("LOOKUP_TIMEOUT_SECONDS", "3"),
            ("TRUST_PROXY_HEADERS", "yes"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ]);

        assert_eq!(config.domain_match, DomainMatch::Suffix);
        assert_eq!(config.anti_forgery, AntiForgeryMode::Issued);
        assert_eq!(config.max_url_length, DEFAULT_MAX_URL_LENGTH);
        assert_eq!(config.lookup_timeout, Duration::from_secs(3));
        assert!(config.trust_proxy_headers);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn download_path_cannot_shadow_fixed_routes() {
        for path in ["/api/health", "/savefrom", "download", "/", "/files/{id}"] {
            let config = config_from(&[("DOWNLOAD_BASE_PATH", path)]);
            assert_eq!(config.download_base_path, DEFAULT_DOWNLOAD_BASE_PATH, "{path}");
        }

        let config = config_from(&[("DOWNLOAD_BASE_PATH", "/fake-download")]);
        assert_eq!(config.download_base_path, "/fake-download");
    }

    #[test]
    fn form_url_accepts_paths_and_web_urls_only() {
        assert_eq!(config_from(&[]).form_url, DEFAULT_FORM_URL);

        let config = config_from(&[("FORM_URL", "https://savefrom.example/")]);
        assert_eq!(config.form_url, "https://savefrom.example/");

        let config = config_from(&[("FORM_URL", "/tools/savefrom")]);
        assert_eq!(config.form_url, "/tools/savefrom");

        for rejected in ["javascript:alert(1)", "//evil.example", "relative/path"] {
            let config = config_from(&[("FORM_URL", rejected)]);
            assert_eq!(config.form_url, DEFAULT_FORM_URL, "{rejected}");
        }
    }

    #[test]
    fn cors_falls_back_to_dev_origins() {
        let (origins, fallback) = config_from(&[]).cors_origins();
        assert!(fallback);
        assert_eq!(origins.len(), DEV_ORIGINS.len());

        let (origins, fallback) =
            config_from(&[("ALLOWED_ORIGINS", "https://a.example")]).cors_origins();
        assert!(!fallback);
        assert_eq!(origins, vec!["https://a.example".to_string()]);
    }

    #[test]
    fn substring_match_is_lax_and_suffix_is_not() {
        let crafted = "notyoutube.com.evil.example";

        assert!(DomainMatch::Substring.matches(crafted, "youtube.com"));
        assert!(!DomainMatch::Suffix.matches(crafted, "youtube.com"));
        assert!(DomainMatch::Suffix.matches("m.youtube.com", "youtube.com"));
        assert!(DomainMatch::Suffix.matches("youtube.com", "youtube.com"));
        assert!(!DomainMatch::Suffix.matches("evilyoutube.com", "youtube.com"));
    }
}
