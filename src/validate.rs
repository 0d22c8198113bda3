use std::sync::Arc;

use axum::http::Method;
use url::Url;

use crate::{config::ServiceConfig, error::Rejection, token::TokenVerifier};

/// Raw fields of one inbound submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub method: Method,
    pub url: String,
    pub token: Option<String>,
    pub client: String,
}

/// A submission that passed every gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub url: Url,
    pub host: String,
}

pub struct Validator {
    config: Arc<ServiceConfig>,
    verifier: Arc<dyn TokenVerifier>,
}

impl Validator {
    pub fn new(config: Arc<ServiceConfig>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { config, verifier }
    }

    /// Runs the gates in order: method, token, presence, length, syntax,
    /// domain. The first failure is returned.
    pub fn validate(&self, submission: &Submission) -> Result<NormalizedRequest, Rejection> {
        if submission.method != Method::POST {
            return Err(Rejection::InvalidMethod);
        }

        let token_ok = submission
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .is_some_and(|token| self.verifier.verify(token, &submission.client));
        if !token_ok {
            return Err(Rejection::InvalidToken);
        }

        self.check_target(&submission.url)
    }

    /// Presence, length, syntax and domain gates on their own. Also used for
    /// the `url` parameter of download links.
    pub fn check_target(&self, raw: &str) -> Result<NormalizedRequest, Rejection> {
        let url = raw.trim();
        if url.is_empty() {
            return Err(Rejection::EmptyUrl);
        }

        if url.chars().count() > self.config.max_url_length {
            return Err(Rejection::UrlTooLong);
        }

        if !is_strict_absolute(url) {
            return Err(Rejection::MalformedUrl);
        }
        let parsed = Url::parse(url).map_err(|_| Rejection::MalformedUrl)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Rejection::MalformedUrl);
        }
        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => return Err(Rejection::MalformedUrl),
        };

        let supported = self
            .config
            .allowed_domains
            .iter()
            .any(|domain| self.config.domain_match.matches(&host, domain));
        if !supported {
            return Err(Rejection::UnsupportedDomain);
        }

        Ok(NormalizedRequest { url: parsed, host })
    }
}

/// `Url::parse` repairs input (missing slashes, backslashes, embedded
/// whitespace). Only text that is already `scheme://...` with no such
/// characters is handed to it.
fn is_strict_absolute(url: &str) -> bool {
    if url
        .chars()
        .any(|character| character.is_whitespace() || character.is_control() || character == '\\')
    {
        return false;
    }

    match url.split_once(':') {
        Some((scheme, rest)) => !scheme.is_empty() && rest.starts_with("//"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DomainMatch,
        token::{IssuedTokenStore, PlaceholderVerifier},
    };

    fn validator() -> Validator {
        Validator::new(
            Arc::new(ServiceConfig::default()),
            Arc::new(PlaceholderVerifier),
        )
    }

    fn post(url: &str) -> Submission {
        Submission {
            method: Method::POST,
            url: url.to_string(),
            token: Some("token".to_string()),
            client: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn accepts_listed_hosts_and_normalizes() {
        let request = validator()
            .validate(&post("  https://www.YouTube.com/watch?v=abc  "))
            .expect("valid");

        assert_eq!(request.host, "www.youtube.com");
        assert_eq!(request.url.as_str(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn accepts_mobile_and_short_hosts() {
        let validator = validator();
        for url in [
            "https://m.youtube.com/watch?v=x",
            "https://youtu.be/abc",
            "http://vimeo.com/123",
            "https://www.dailymotion.com/video/x7",
            "https://www.facebook.com/watch/?v=1",
            "https://www.instagram.com/reel/abc/",
        ] {
            assert!(validator.validate(&post(url)).is_ok(), "{url}");
        }
    }

    #[test]
    fn substring_matching_lets_crafted_hosts_through() {
        let request = validator()
            .validate(&post("https://notyoutube.com.evil.example/watch"))
            .expect("substring match");
        assert_eq!(request.host, "notyoutube.com.evil.example");
    }

    #[test]
    fn suffix_matching_rejects_crafted_hosts() {
        let config = ServiceConfig {
            domain_match: DomainMatch::Suffix,
            ..ServiceConfig::default()
        };
        let validator = Validator::new(Arc::new(config), Arc::new(PlaceholderVerifier));

        assert_eq!(
            validator.validate(&post("https://notyoutube.com.evil.example/watch")),
            Err(Rejection::UnsupportedDomain)
        );
        assert!(validator.validate(&post("https://m.youtube.com/watch?v=x")).is_ok());
    }

    #[test]
    fn wrong_method_wins_over_everything() {
        let validator = validator();
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::HEAD] {
            let submission = Submission {
                method,
                url: String::new(),
                token: None,
                client: "127.0.0.1".to_string(),
            };
            assert_eq!(
                validator.validate(&submission),
                Err(Rejection::InvalidMethod)
            );
        }
    }

    #[test]
    fn missing_or_blank_token_is_rejected_before_url_checks() {
        let validator = validator();
        let mut submission = post("");
        submission.token = None;
        assert_eq!(validator.validate(&submission), Err(Rejection::InvalidToken));

        submission.token = Some("  ".to_string());
        assert_eq!(validator.validate(&submission), Err(Rejection::InvalidToken));
    }

    #[test]
    fn token_store_is_consulted() {
        let store = Arc::new(IssuedTokenStore::new(60));
        let validator = Validator::new(Arc::new(ServiceConfig::default()), store.clone());
        let issued = store.issue("127.0.0.1");

        let mut submission = post("https://youtu.be/abc");
        submission.token = Some("forged".to_string());
        assert_eq!(validator.validate(&submission), Err(Rejection::InvalidToken));

        submission.token = Some(issued.token);
        assert!(validator.validate(&submission).is_ok());
    }

    #[test]
    fn blank_urls_are_empty() {
        let validator = validator();
        for url in ["", " ", "\t\n", "   \r\n  "] {
            assert_eq!(validator.validate(&post(url)), Err(Rejection::EmptyUrl));
        }
    }

    #[test]
    fn long_urls_are_too_long_not_malformed() {
        let validator = validator();
        let prefix = "https://www.youtube.com/watch?v=";
        let exact = format!("{prefix}{}", "a".repeat(2000 - prefix.len()));
        let over = format!("{exact}a");

        assert!(validator.validate(&post(&exact)).is_ok());
        assert_eq!(validator.validate(&post(&over)), Err(Rejection::UrlTooLong));

        let long_garbage = "x".repeat(2001);
        assert_eq!(
            validator.validate(&post(&long_garbage)),
            Err(Rejection::UrlTooLong)
        );
    }

    #[test]
    fn syntactically_invalid_urls_are_malformed() {
        let validator = validator();
        for url in [
            "not-a-url",
            "youtube.com/watch?v=x",
            "http//youtube.com",
            "https://",
            "mailto:someone@youtube.com",
            "ftp://youtube.com/file",
            "https:youtube.com/watch?v=x",
            "https:/youtube.com/watch",
            "https://youtube.com/watch?v=a b",
            "https:\\\\youtube.com\\watch",
            "https://you\ttube.com/x",
            "https://youtube.com/watch?v=a\u{7f}",
        ] {
            assert_eq!(
                validator.validate(&post(url)),
                Err(Rejection::MalformedUrl),
                "{url}"
            );
        }
    }

    #[test]
    fn malformed_is_reported_before_unsupported_domain() {
        assert_eq!(
            validator().validate(&post("http//evil.example/video")),
            Err(Rejection::MalformedUrl)
        );
    }

    #[test]
    fn unlisted_hosts_are_unsupported() {
        let validator = validator();
        for url in [
            "https://example.com/watch?v=x",
            "https://tiktok.com/@a/video/1",
            "http://127.0.0.1/",
        ] {
            assert_eq!(
                validator.validate(&post(url)),
                Err(Rejection::UnsupportedDomain),
                "{url}"
            );
        }
    }
}
