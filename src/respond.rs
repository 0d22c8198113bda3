use axum::{
    Json,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ACCEPT, AsHeaderName, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{error::Rejection, lookup::MediaInfo};

const HISTORY_BACK: &str = "javascript:history.back()";
const SIMULATION_NOTICE: &str = "This is a simulation only. Real downloading requires video processing tools like yt-dlp or a third-party API.";

/// Presentation chosen once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Structured,
    Rendered,
}

impl OutputMode {
    /// Script-driven callers get JSON; plain navigation gets HTML.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let xhr = header_str(headers, "x-requested-with")
            .is_some_and(|value| value.eq_ignore_ascii_case("xmlhttprequest"));
        let wants_json = header_str(headers, ACCEPT).is_some_and(prefers_json);

        if xhr || wants_json {
            Self::Structured
        } else {
            Self::Rendered
        }
    }
}

fn header_str(headers: &HeaderMap, name: impl AsHeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// True when the first media range of an `Accept` header is JSON.
fn prefers_json(accept: &str) -> bool {
    accept
        .split(',')
        .next()
        .and_then(|range| range.split(';').next())
        .map(|range| range.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatEntry {
    pub format: String,
    pub url: String,
    pub quality: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessBody {
    pub success: bool,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub formats: Vec<FormatEntry>,
}

impl From<&MediaInfo> for SuccessBody {
    fn from(info: &MediaInfo) -> Self {
        Self {
            success: true,
            title: info.title.clone(),
            url: info.download_url.clone(),
            thumbnail: info.thumbnail_url.clone(),
            formats: info
                .formats
                .iter()
                .map(|option| FormatEntry {
                    format: option.label.clone(),
                    url: option.url.clone(),
                    quality: option.quality_tag.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
}

/// Writes one response in the mode picked at the boundary.
#[derive(Debug, Clone)]
pub struct Responder {
    mode: OutputMode,
    lang: String,
    retry_href: String,
}

impl Responder {
    pub fn new(mode: OutputMode, lang: Option<&str>) -> Self {
        Self {
            mode,
            lang: sanitize_lang(lang),
            retry_href: HISTORY_BACK.to_string(),
        }
    }

    /// Error pages link here instead of stepping back in history.
    pub fn with_retry(mut self, href: &str) -> Self {
        self.retry_href = href.to_string();
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, info: &MediaInfo, source_url: &str) -> Response {
        match self.mode {
            OutputMode::Structured => Json(SuccessBody::from(info)).into_response(),
            OutputMode::Rendered => html(StatusCode::OK, self.success_page(info, source_url)),
        }
    }

    pub fn error(&self, rejection: &Rejection) -> Response {
        self.failure(rejection.status(), &rejection.to_string())
    }

    /// Error-shaped answer with an explicit status, for outcomes that are not
    /// submission rejections.
    pub fn failure(&self, status: StatusCode, message: &str) -> Response {
        match self.mode {
            OutputMode::Structured => (
                status,
                Json(FailureBody {
                    success: false,
                    error: message.to_string(),
                }),
            )
                .into_response(),
            OutputMode::Rendered => html(status, self.error_page(message)),
        }
    }

    pub fn simulation_notice(&self) -> Response {
        self.failure(StatusCode::NOT_IMPLEMENTED, SIMULATION_NOTICE)
    }

    /// The submission form, always rendered as markup.
    pub fn form_page(&self, action: &str, token: &str) -> Response {
        let body = format!(
            "<h2>Download a video</h2>\n\
             <form method=\"post\" action=\"{action}\">\n\
             <input type=\"url\" name=\"sf_url\" placeholder=\"https://www.youtube.com/watch?v=...\" required>\n\
             <input type=\"hidden\" name=\"csrf_token\" value=\"{token}\">\n\
             <input type=\"hidden\" name=\"lang\" value=\"{lang}\">\n\
             <button type=\"submit\">Download</button>\n\
             </form>",
            action = escape_html(action),
            token = escape_html(token),
            lang = self.lang,
        );

        html(StatusCode::OK, self.document("Download a video", &body))
    }

    fn success_page(&self, info: &MediaInfo, source_url: &str) -> String {
        let mut items = String::new();
        for option in &info.formats {
            items.push_str(&format!(
                "<li class=\"format\" data-quality=\"{quality}\"><a href=\"{href}\" target=\"_blank\" rel=\"noopener\">Download {label}</a></li>\n",
                quality = escape_html(&option.quality_tag),
                href = escape_html(&option.url),
                label = escape_html(&option.label),
            ));
        }

        let body = format!(
            "<h2>Download Ready</h2>\n\
             <img src=\"{thumbnail}\" alt=\"Video Thumbnail\" style=\"max-width: 100%; height: auto;\">\n\
             <p><strong>Title:</strong> {title}</p>\n\
             <p><strong>Duration:</strong> {duration}</p>\n\
             <p><strong>URL:</strong> {source}</p>\n\
             <p>Choose a format:</p>\n\
             <ul style=\"list-style: none; padding: 0;\">\n{items}</ul>\n\
             <p style=\"font-size: 0.9em; color: gray;\">{notice}</p>",
            thumbnail = escape_html(&info.thumbnail_url),
            title = escape_html(&info.title),
            duration = escape_html(&info.duration_label),
            source = escape_html(source_url),
            notice = escape_html(SIMULATION_NOTICE),
        );

        self.document(&escape_html(&info.title), &body)
    }

    fn error_page(&self, message: &str) -> String {
        let body = format!(
            "<h2>Something went wrong</h2>\n\
             <p style=\"color: red;\">Error: {message}</p>\n\
             <p><a href=\"{retry}\">Try again</a></p>",
            message = escape_html(message),
            retry = escape_html(&self.retry_href),
        );

        self.document("Error", &body)
    }

    fn document(&self, title: &str, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n\
             <html lang=\"{lang}\">\n\
             <head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n\
             <body style=\"font-family: Arial, sans-serif; max-width: 600px;\">\n{body}\n</body>\n\
             </html>\n",
            lang = self.lang,
        )
    }
}

fn html(status: StatusCode, page: String) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        page,
    )
        .into_response()
}

fn sanitize_lang(lang: Option<&str>) -> String {
    lang.map(str::trim)
        .filter(|value| {
            (2..=12).contains(&value.len())
                && value
                    .chars()
                    .all(|character| character.is_ascii_alphanumeric() || character == '-')
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "en".to_string())
}

/// Escapes text for element content and quoted attribute values.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }

    escaped
}
