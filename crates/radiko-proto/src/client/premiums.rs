use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::Http;
use crate::error::{Error, Result};

const LOGIN_PATH: &str = "/ap/member/login/login";
const LOGIN_PAGE_PATH: &str = "/ap/member/login/login_page";
const LOGIN_CHECK_PATH: &str = "/ap/member/webapi/member/login/check";
const LOGOUT_PATH: &str = "/ap/member/webapi/member/logout";

/// Class the login page puts on its error banner, e.g. `caution mb20`.
static LOGIN_ERROR_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"caution mb\d+").expect("login error class pattern"));
static WITH_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class]").expect("class selector"));

/// Membership state reported by the login check endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumStatus {
    pub area_free: String,
    pub paid_member: String,
    pub user_key: String,
}

impl PremiumStatus {
    fn from_json(json: &Value) -> Self {
        Self {
            area_free: field_text(json, "areafree"),
            paid_member: field_text(json, "paid_member"),
            user_key: field_text(json, "user_key"),
        }
    }

    pub fn is_area_free(&self) -> bool {
        self.area_free == "1"
    }
}

/// radiko premium login state. The flag is shared with the station client
/// so live manifests can switch to the area-free variant.
#[derive(Debug, Clone)]
pub struct PremiumClient {
    http: Http,
    logged_in: Arc<AtomicBool>,
}

impl PremiumClient {
    pub(crate) fn new(http: Http) -> Self {
        Self {
            http,
            logged_in: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn set_logged_in(&self, value: bool) {
        self.logged_in.store(value, Ordering::SeqCst);
    }

    pub async fn login(&self, mail: &str, pass: &str) -> Result<bool> {
        if mail.is_empty() || pass.is_empty() {
            return Err(Error::invalid_argument("mail and pass are required"));
        }

        let request = self
            .http
            .post(&self.http.url(LOGIN_PATH))
            .header(reqwest::header::REFERER, self.http.url(LOGIN_PAGE_PATH))
            .form(&[("mail", mail), ("pass", pass)]);
        let res = self.http.send(request).await?;
        let status = res.status();
        let body = res.text().await?;

        match login_error(&body) {
            Some(banner) => {
                self.set_logged_in(false);
                error!(
                    "premium login failed, status code: {}, err: {}, mail: {}",
                    status, banner, mail
                );
                Ok(false)
            }
            None => {
                self.set_logged_in(true);
                info!("premium login ok");
                Ok(true)
            }
        }
    }

    pub async fn logout(&self) -> Result<bool> {
        if !self.is_logged_in() {
            return Ok(true);
        }

        let res = self.http.send(self.http.get(&self.http.url(LOGOUT_PATH))).await?;
        let json: Value = serde_json::from_str(&res.text().await?)?;

        if status_is_ok(&json) {
            self.set_logged_in(false);
            info!("premium logout ok");
            Ok(true)
        } else {
            error!("premium logout failed, message: {}", json);
            Ok(false)
        }
    }

    pub async fn status(&self) -> Result<PremiumStatus> {
        let url = self.http.url(LOGIN_CHECK_PATH);
        let res = self.http.send(self.http.get(&url)).await?;
        let http_status = res.status().as_u16();
        let json: Value = serde_json::from_str(&res.text().await?)?;

        if !status_is_ok(&json) {
            self.set_logged_in(false);
            return Err(Error::auth(
                format!("could not get status, message: {}", json),
                http_status,
                url,
            ));
        }

        self.set_logged_in(true);
        Ok(PremiumStatus::from_json(&json))
    }
}

/// Text of the login error banner, if the page carries one.
fn login_error(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    doc.select(&WITH_CLASS)
        .find(|el| {
            el.value()
                .attr("class")
                .is_some_and(|c| LOGIN_ERROR_CLASS.is_match(c))
        })
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// `status` is 200, sent either as a number or a string.
fn status_is_ok(json: &Value) -> bool {
    match json.get("status") {
        Some(Value::Number(n)) => n.as_i64() == Some(200),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(200),
        _ => false,
    }
}

fn field_text(json: &Value, key: &str) -> String {
    match json.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_http;
    use mockito::Matcher;

    const LOGIN_FAILED_PAGE: &str = r#"<html><body>
        <form><p class="caution mb20">メールアドレスまたはパスワードが違います</p></form>
        </body></html>"#;

    #[test]
    fn status_accepts_number_or_string() {
        assert!(status_is_ok(&serde_json::json!({ "status": 200 })));
        assert!(status_is_ok(&serde_json::json!({ "status": "200" })));
        assert!(!status_is_ok(&serde_json::json!({ "status": "400" })));
        assert!(!status_is_ok(&serde_json::json!({})));
    }

    #[test]
    fn detects_login_error_banner() {
        assert_eq!(
            login_error(LOGIN_FAILED_PAGE).as_deref(),
            Some("メールアドレスまたはパスワードが違います")
        );
        assert_eq!(
            login_error(r#"<div class="caution">hint</div>"#),
            None
        );
    }

    #[tokio::test]
    async fn login_posts_form_with_referer() {
        let mut server = mockito::Server::new_async().await;
        let referer = format!("{}/ap/member/login/login_page", server.url());
        let login = server
            .mock("POST", "/ap/member/login/login")
            .match_header("referer", referer.as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("mail".into(), "a@example.com".into()),
                Matcher::UrlEncoded("pass".into(), "secret".into()),
            ]))
            .with_body("<html><body>welcome</body></html>")
            .create_async()
            .await;

        let premiums = PremiumClient::new(test_http(&server));
        assert!(premiums.login("a@example.com", "secret").await.unwrap());
        assert!(premiums.is_logged_in());
        login.assert_async().await;
    }

    #[tokio::test]
    async fn login_error_page_leaves_logged_out() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ap/member/login/login")
            .with_body(LOGIN_FAILED_PAGE)
            .create_async()
            .await;

        let premiums = PremiumClient::new(test_http(&server));
        assert!(!premiums.login("a@example.com", "wrong").await.unwrap());
        assert!(!premiums.is_logged_in());
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let server = mockito::Server::new_async().await;
        let premiums = PremiumClient::new(test_http(&server));
        assert!(matches!(
            premiums.login("", "secret").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn status_and_logout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ap/member/webapi/member/login/check")
            .with_body(r#"{"status":"200","areafree":"1","paid_member":"1","user_key":"vowJs24"}"#)
            .create_async()
            .await;
        let logout = server
            .mock("GET", "/ap/member/webapi/member/logout")
            .with_body(r#"{"status":200}"#)
            .expect(1)
            .create_async()
            .await;

        let premiums = PremiumClient::new(test_http(&server));
        let status = premiums.status().await.unwrap();
        assert!(status.is_area_free());
        assert_eq!(status.paid_member, "1");
        assert_eq!(status.user_key, "vowJs24");
        assert!(premiums.is_logged_in());

        assert!(premiums.logout().await.unwrap());
        assert!(!premiums.is_logged_in());
        // Already logged out: no request.
        assert!(premiums.logout().await.unwrap());
        logout.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_status_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ap/member/webapi/member/login/check")
            .with_body(r#"{"status":"400","message":"not logged in"}"#)
            .create_async()
            .await;

        let premiums = PremiumClient::new(test_http(&server));
        assert!(matches!(premiums.status().await, Err(Error::Auth { .. })));
        assert!(!premiums.is_logged_in());
    }
}
