use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Browser-like headers sent with every request to the statistics site.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:141.0) Gecko/20100101 Firefox/141.0",
    ),
    ("accept", "application/json"),
    ("accept-language", "en-US,en;q=0.5"),
    ("x-requested-with", "XMLHttpRequest"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("priority", "u=0"),
];

/// One entry of a browser cookie export. Extra export fields are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Load the cookie store. Absence or malformed content is a fatal precondition.
pub fn load_cookies(path: &Path) -> Result<Vec<Cookie>> {
    if !path.exists() {
        return Err(AppError::Cookies(format!(
            "cookie file '{}' does not exist",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path)?;
    let cookies: Vec<Cookie> = serde_json::from_str(&raw).map_err(|e| {
        AppError::Cookies(format!("failed to parse '{}': {e}", path.display()))
    })?;
    if cookies.is_empty() {
        return Err(AppError::Cookies(format!(
            "cookie file '{}' contains no cookies",
            path.display()
        )));
    }
    info!("Loaded {} cookies from '{}'", cookies.len(), path.display());
    Ok(cookies)
}

/// `name=value; name=value` as sent in the `Cookie` header.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Authenticated context shared by every component of a run.
#[derive(Debug, Clone)]
pub struct Session {
    pub client: reqwest::Client,
    pub base_url: String,
    pub access_token: String,
    pub user_email: Option<String>,
}

impl Session {
    /// Build a session around an already-known access token.
    pub fn new(client: reqwest::Client, base_url: &str, access_token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            user_email: None,
        }
    }

    /// GET the landing page with the supplied cookies and pull the access token
    /// out of it. Missing session markers abort the run before any fetching.
    pub async fn login(cfg: &Config, cookies: &[Cookie]) -> Result<Self> {
        let client = build_client(cfg, cookies)?;
        let url = format!("{}/", cfg.base_url);
        let resp = client.get(&url).send().await?;
        info!("Url: {url}, Status: {}", resp.status().as_u16());
        let html = resp.text().await?;

        let markers = parse_landing_page(&html);
        match (markers.email, markers.access_token) {
            (Some(email), Some(token)) => {
                info!("User is logged in as: {email}");
                let mut session = Session::new(client, &cfg.base_url, &token);
                session.user_email = Some(email);
                Ok(session)
            }
            (None, Some(_)) => {
                warn!("Access token present but no user e-mail on landing page");
                Err(AppError::NotLoggedIn(
                    "landing page has no user e-mail marker, please update cookies".to_string(),
                ))
            }
            _ => Err(AppError::NotLoggedIn(
                "landing page has no access token, please update cookies".to_string(),
            )),
        }
    }
}

fn build_client(cfg: &Config, cookies: &[Cookie]) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    for &(name, value) in DEFAULT_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    let origin = HeaderValue::from_str(&cfg.base_url)
        .map_err(|_| AppError::Config(format!("invalid base url {:?}", cfg.base_url)))?;
    headers.insert(reqwest::header::ORIGIN, origin);
    let cookie = HeaderValue::from_str(&cookie_header(cookies))
        .map_err(|_| AppError::Cookies("cookie values contain invalid characters".to_string()))?;
    headers.insert(COOKIE, cookie);

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(60))
        .build()?)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LandingMarkers {
    pub email: Option<String>,
    pub access_token: Option<String>,
}

/// Extract the logged-in user's e-mail (`div.email`) and the embedded access
/// token (`#accesstoken[value]`).
pub fn parse_landing_page(html: &str) -> LandingMarkers {
    let doc = Html::parse_document(html);
    let (Ok(email_sel), Ok(token_sel)) = (Selector::parse("div.email"), Selector::parse("#accesstoken"))
    else {
        return LandingMarkers::default();
    };

    let email = doc
        .select(&email_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());
    let access_token = doc
        .select(&token_sel)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty());

    LandingMarkers { email, access_token }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_logged_in_landing_page() {
        let html = r#"<html><body>
            <div class="email"> someone@example.com </div>
            <input type="hidden" id="accesstoken" value="tok-123">
        </body></html>"#;
        let markers = parse_landing_page(html);
        assert_eq!(markers.email.as_deref(), Some("someone@example.com"));
        assert_eq!(markers.access_token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn logged_out_page_has_no_markers() {
        let markers = parse_landing_page("<html><body><a href='/login'>Log in</a></body></html>");
        assert_eq!(markers, LandingMarkers::default());
    }

    #[test]
    fn loads_browser_export_ignoring_extra_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"JSESSIONID","value":"abc","domain":"dsrdata.com.au","httpOnly":true}},
               {{"name":"remember","value":"1"}}]"#
        )
        .unwrap();
        let cookies = load_cookies(file.path()).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookie_header(&cookies), "JSESSIONID=abc; remember=1");
    }

    #[test]
    fn missing_cookie_file_is_fatal() {
        let err = load_cookies(Path::new("/definitely/not/here/cookies.json")).unwrap_err();
        assert!(matches!(err, AppError::Cookies(_)));
    }

    #[test]
    fn malformed_cookie_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name":"only-an-object"}}"#).unwrap();
        assert!(matches!(load_cookies(file.path()), Err(AppError::Cookies(_))));
    }

    #[tokio::test]
    async fn login_extracts_token_from_landing_page() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("cookie", "sid=xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="email">me@example.com</div><input id="accesstoken" value="t-1">"#,
            ))
            .mount(&server)
            .await;

        let cfg = Config { base_url: server.uri(), ..Config::default() };
        let cookies = vec![Cookie { name: "sid".to_string(), value: "xyz".to_string() }];
        let session = Session::login(&cfg, &cookies).await.unwrap();
        assert_eq!(session.access_token, "t-1");
        assert_eq!(session.user_email.as_deref(), Some("me@example.com"));
    }
}
