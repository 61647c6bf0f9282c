//! Mock leave site, identity provider and Duo frame on one wiremock server.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use vsl_reporter::{Credentials, DuoConfig, LoginIndicators, ReporterConfig};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const SESSION_COOKIE: &str = "vsl_session";

/// Matches requests carrying the named cookie.
pub struct HasCookie(pub &'static str);

impl Match for HasCookie {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|cookies| cookies.contains(&format!("{}=", self.0)))
    }
}

pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body.into())
}

pub fn config(server: &MockServer, dir: &Path) -> ReporterConfig {
    ReporterConfig::new(Credentials::new("alice", "secret").unwrap())
        .with_base_url(server.uri().parse().unwrap())
        .with_login_indicators(LoginIndicators {
            path_prefixes: vec!["/login".into(), "/idp".into()],
            hosts: vec![],
        })
        .with_cookie_file(dir.join("cookiefile"))
        .with_duo(duo_config(server))
}

/// Duo frame on the mock server, polling quickly.
pub fn duo_config(server: &MockServer) -> DuoConfig {
    DuoConfig::default()
        .with_base_url(format!("{}/frame/", server.uri()).parse().unwrap())
        .with_max_attempts(3)
        .with_poll_interval(Duration::from_millis(10))
}

pub const INDEX_PAGE: &str = r#"<html><body>
    <table>
      <tr><th>Reporting Period Signature Due</th></tr>
      <tr><td><a href="sign.asp">03/16/2024 - 04/15/2024</a></td></tr>
    </table>
    </body></html>"#;

/// `/vacation/` requires the session cookie; anything without it bounces to login.
pub async fn mount_protected_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/vacation/"))
        .and(HasCookie(SESSION_COOKIE))
        .respond_with(html(INDEX_PAGE))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vacation/"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/login.asp?/vacation/"),
        )
        .mount(server)
        .await;
}

/// Bounce page, credential form, and a Duo page with the given markup.
pub async fn mount_identity_provider(server: &MockServer, duo_page: &str, logins: u64) {
    Mock::given(method("GET"))
        .and(path("/login.asp"))
        .respond_with(html(
            r#"<html><body onload="document.forms[0].submit()">
               <form method="post" action="/idp/profile/SAML2/Redirect/SSO">
                 <input type="hidden" name="SAMLRequest" value="req123">
               </form></body></html>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/idp/profile/SAML2/Redirect/SSO"))
        .and(body_string_contains("SAMLRequest=req123"))
        .respond_with(html(
            r#"<html><body>
               <form method="post" action="/idp/login">
                 <input type="text" name="j_username">
                 <input type="password" name="j_password">
                 <input type="hidden" name="_eventId_proceed" value="">
               </form></body></html>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/idp/login"))
        .and(body_string_contains("j_username=alice"))
        .and(body_string_contains("j_password=secret"))
        .respond_with(html(duo_page))
        .expect(logins)
        .mount(server)
        .await;
}

pub const DUO_PAGE: &str = r#"<html><body>
    <iframe id="duo_iframe" data-host="api-test.duosecurity.com"
            data-sig-request="TX|abc:APP|def" data-post-action="/idp/duo"></iframe>
    <form method="post" id="duo_form" action="/idp/duo">
      <input type="hidden" name="csrf_token" value="t0k">
    </form></body></html>"#;

/// Duo frame endpoints approving on the second status poll.
pub async fn mount_duo(server: &MockServer, approvals: u64) {
    mount_duo_push(server, approvals).await;
    Mock::given(method("GET"))
        .and(path("/frame/devices/authStatus/txid-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pushed" })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/frame/devices/authStatus/txid-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "allow", "authSig": "AUTH|sig" })),
        )
        .mount(server)
        .await;
}

/// Duo frame endpoints answering every status poll with `status`.
pub async fn mount_duo_status(server: &MockServer, status: &str, approvals: u64) {
    mount_duo_push(server, approvals).await;
    Mock::given(method("GET"))
        .and(path("/frame/devices/authStatus/txid-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": status })))
        .mount(server)
        .await;
}

/// Frame, device listing and push; `approvals` pushes are expected.
pub async fn mount_duo_push(server: &MockServer, approvals: u64) {
    Mock::given(method("GET"))
        .and(path("/frame/web/v1/auth"))
        .respond_with(html("<html>duo frame</html>"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/frame/devices/preAuth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "device": "DPHONE1", "defDevice": true }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/frame/devices/authPush_async"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "txid-1" })))
        .expect(approvals)
        .mount(server)
        .await;
}

/// Hand-back, "press continue" page and the service provider's assertion consumer.
pub async fn mount_hand_back(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/idp/duo"))
        .and(body_string_contains("sig_response=AUTH%7Csig%3AAPP%7Cdef"))
        .and(body_string_contains("_eventId=proceed"))
        .and(body_string_contains("csrf_token=t0k"))
        .respond_with(html(
            r#"<html><body>
               <p>Press Continue button to proceed</p>
               <form method="post" action="/Shibboleth.sso/SAML2/POST">
                 <input type="hidden" name="SAMLResponse" value="resp456">
                 <input type="submit" value="Continue">
               </form></body></html>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Shibboleth.sso/SAML2/POST"))
        .and(body_string_contains("SAMLResponse=resp456"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/vacation/")
                .insert_header("set-cookie", format!("{SESSION_COOKIE}=ok; Path=/")),
        )
        .mount(server)
        .await;
}
