use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::capture::Capture;
use crate::config::ClientConfig;
use crate::cookies::CookieJar;
use crate::document::{Document, Form, FormMethod};
use crate::error::Error;

/// Request body for [`DocumentClient::navigate`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

impl RequestBody {
    #[must_use]
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `value` cannot be serialized.
    pub fn json(value: &impl Serialize) -> Result<Self, Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

/// Browser-like HTTP client: follows redirects, keeps cookies, remembers the last page.
///
/// Not safe for concurrent navigation: every call replaces the current
/// document. Independent sessions use independent clients.
pub struct DocumentClient {
    http: reqwest::Client,
    jar: Arc<CookieJar>,
    capture: Option<Capture>,
    document: Option<Document>,
}

impl DocumentClient {
    /// # Errors
    ///
    /// Returns [`Error::CookieStore`] or [`Error::Capture`] if the configured
    /// cookie file or capture directory cannot be prepared, or
    /// [`Error::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let jar = match &config.cookie_file {
            Some(path) => CookieJar::open(path)?,
            None => CookieJar::in_memory(),
        };
        let capture = config.capture_dir.as_ref().map(Capture::new).transpose()?;
        Self::with_jar(config, Arc::new(jar), capture)
    }

    fn with_jar(
        config: &ClientConfig,
        jar: Arc<CookieJar>,
        capture: Option<Capture>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            jar,
            capture,
            document: None,
        })
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    /// The current document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] before the first navigation.
    pub fn document(&self) -> Result<&Document, Error> {
        self.document
            .as_ref()
            .ok_or_else(|| Error::NotFound("no document loaded".into()))
    }

    /// GET `url`, or POST `body` to it, following redirects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure and
    /// [`Error::UnexpectedStatus`] if the final response is not 2xx/3xx.
    pub async fn navigate(&mut self, url: Url, body: Option<RequestBody>) -> Result<&Document, Error> {
        let request = match body {
            None => self.http.get(url.clone()),
            Some(RequestBody::Form(pairs)) => self.http.post(url.clone()).form(&pairs),
            Some(RequestBody::Json(value)) => self.http.post(url.clone()).json(&value),
        };

        tracing::debug!(url = %redacted(&url), "Navigating");
        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let text = response.text().await?;

        if let Some(capture) = self.capture.as_mut() {
            let path = capture.record(&text)?;
            tracing::debug!(path = %path.display(), "Page captured");
        }

        if !(status.is_success() || status.is_redirection()) {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                url: redacted(&final_url),
            });
        }

        tracing::debug!(url = %redacted(&final_url), status = status.as_u16(), "Document loaded");
        Ok(self
            .document
            .insert(Document::parse(final_url, status.as_u16(), text)))
    }

    pub async fn get(&mut self, url: Url) -> Result<&Document, Error> {
        self.navigate(url, None).await
    }

    /// Submit `form` as a browser would, with `overrides` applied on top of its fields.
    ///
    /// # Errors
    ///
    /// Same as [`navigate`](Self::navigate).
    pub async fn submit(&mut self, form: &Form, overrides: &[(&str, &str)]) -> Result<&Document, Error> {
        let (url, body) = form_request(form, overrides);
        self.navigate(url, body).await
    }

    /// Submit the current document's first form, or the one named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the current document has no such form,
    /// otherwise the same as [`navigate`](Self::navigate).
    pub async fn submit_current_form(
        &mut self,
        name: Option<&str>,
        overrides: &[(&str, &str)],
    ) -> Result<&Document, Error> {
        let doc = self.document()?;
        let form = match name {
            Some(name) => doc.form_named(name),
            None => doc.forms().first(),
        }
        .cloned()
        .ok_or_else(|| {
            Error::NotFound(format!(
                "form {} on {}",
                name.unwrap_or("<first>"),
                redacted(doc.url())
            ))
        })?;
        self.submit(&form, overrides).await
    }
}

/// Target URL and body a browser would send for `form` with `overrides` applied.
///
/// GET forms carry their fields in the query string.
#[must_use]
pub fn form_request(form: &Form, overrides: &[(&str, &str)]) -> (Url, Option<RequestBody>) {
    let mut form = form.clone();
    for (name, value) in overrides {
        form.set(name, *value);
    }
    let pairs = form.submission();

    match form.method() {
        FormMethod::Post => (form.action().clone(), Some(RequestBody::Form(pairs))),
        FormMethod::Get => {
            let mut url = form.action().clone();
            url.query_pairs_mut().clear().extend_pairs(pairs);
            (url, None)
        }
    }
}

/// URL without its query string, safe to log.
pub(crate) fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string(body)
    }

    #[test]
    fn redacted_drops_query() {
        let url: Url = "https://verify.test/frame/web/v1/auth?tx=TX|secret&parent=x"
            .parse()
            .unwrap();
        assert_eq!(redacted(&url), "https://verify.test/frame/web/v1/auth");
    }

    #[tokio::test]
    async fn navigate_follows_redirects_and_keeps_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/landing")
                    .insert_header("set-cookie", "sid=42; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .and(header("cookie", "sid=42"))
            .respond_with(html("<html>landed</html>"))
            .mount(&server)
            .await;

        let mut client = DocumentClient::new(&ClientConfig::default()).unwrap();
        let url: Url = format!("{}/start", server.uri()).parse().unwrap();
        let doc = client.get(url).await.unwrap();

        assert_eq!(doc.url().path(), "/landing");
        assert!(doc.contains_text("landed"));
        assert_eq!(client.cookies().get("127.0.0.1", "sid"), Some("42".into()));
    }

    #[tokio::test]
    async fn error_status_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut client = DocumentClient::new(&ClientConfig::default()).unwrap();
        let url: Url = format!("{}/broken?q=1", server.uri()).parse().unwrap();
        let err = client.get(url).await.unwrap_err();

        match err {
            Error::UnexpectedStatus { status, url } => {
                assert_eq!(status, 500);
                assert!(!url.contains("q=1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn submit_current_form_posts_fields_with_overrides() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/form"))
            .respond_with(html(
                r#"<form name="f" method="post" action="/post">
                     <input type="hidden" name="token" value="abc">
                     <input name="user">
                   </form>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/post"))
            .and(body_string_contains("token=abc"))
            .and(body_string_contains("user=alice"))
            .respond_with(html("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = DocumentClient::new(&ClientConfig::default()).unwrap();
        client
            .get(format!("{}/form", server.uri()).parse().unwrap())
            .await
            .unwrap();
        let doc = client
            .submit_current_form(Some("f"), &[("user", "alice")])
            .await
            .unwrap();
        assert!(doc.contains_text("ok"));
    }

    #[tokio::test]
    async fn missing_form_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<html>no forms</html>"))
            .mount(&server)
            .await;

        let mut client = DocumentClient::new(&ClientConfig::default()).unwrap();
        client.get(server.uri().parse().unwrap()).await.unwrap();
        let err = client.submit_current_form(None, &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn capture_writes_each_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<html>page</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            capture_dir: Some(dir.path().join("LOGS")),
            ..ClientConfig::default()
        };
        let mut client = DocumentClient::new(&config).unwrap();
        let url: Url = server.uri().parse().unwrap();
        client.get(url.clone()).await.unwrap();
        client.get(url).await.unwrap();

        assert!(dir.path().join("LOGS/0001.html").exists());
        assert!(dir.path().join("LOGS/0002.html").exists());
    }
}
