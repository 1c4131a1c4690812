//! Two-step token handshake.
//!
//! ```text
//!   auth1  ── X-Radiko-AuthToken / KeyLength / KeyOffset ──▶
//!   partial key = base_key[offset .. offset + length]   (base key scraped once)
//!   auth2  ◀── token + base64(partial key) ──  token is now active
//! ```
//!
//! A token is never cached here: every [`AuthClient::token`] call runs the
//! whole handshake again.

use std::sync::{Arc, LazyLock, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use reqwest::{Response, StatusCode};
use tracing::{debug, info};

use super::Http;
use crate::error::{Error, Result};

pub const AUTH_APP: &str = "pc_html5";
pub const AUTH_APP_VERSION: &str = "0.0.1";
pub const AUTH_USER: &str = "dummy_user";
pub const AUTH_DEVICE: &str = "pc";

pub const HEADER_AUTH_TOKEN: &str = "X-Radiko-AuthToken";
pub const HEADER_KEY_LENGTH: &str = "X-Radiko-KeyLength";
pub const HEADER_KEY_OFFSET: &str = "X-Radiko-KeyOffset";

const AUTH1_PATH: &str = "/v2/api/auth1";
const AUTH2_PATH: &str = "/v2/api/auth2";

/// Constructor call in the player script whose third argument is the key:
/// `new RadikoJSPlayer($audio[0], 'pc_html5', 'bcd151073c03b352e1ef2fd66c32209da9ca0afa', {`
static PLAYER_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"new RadikoJSPlayer.*\{").expect("player call pattern"));

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Http,
    base_key: Arc<RwLock<Option<String>>>,
}

/// Values handed out by auth1.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Challenge {
    token: String,
    key_length: usize,
    key_offset: usize,
}

impl AuthClient {
    pub(crate) fn new(http: Http) -> Self {
        Self {
            http,
            base_key: Arc::new(RwLock::new(None)),
        }
    }

    /// Run auth1 + auth2 and return the now-active token.
    pub async fn token(&self) -> Result<String> {
        let challenge = self.auth1().await?;
        let partial_key = self
            .partial_key(challenge.key_length, challenge.key_offset)
            .await?;
        let encoded = STANDARD.encode(partial_key.as_bytes());
        self.auth2(&challenge.token, &encoded).await?;

        info!("auth token activated");
        Ok(challenge.token)
    }

    async fn auth1(&self) -> Result<Challenge> {
        let url = self.http.url(AUTH1_PATH);
        let request = self
            .http
            .get(&url)
            .header("pragma", "no-cache")
            .header("X-Radiko-App", AUTH_APP)
            .header("X-Radiko-App-Version", AUTH_APP_VERSION)
            .header("X-Radiko-User", AUTH_USER)
            .header("X-Radiko-Device", AUTH_DEVICE);
        let res = self.http.send(request).await?;

        if res.status() != StatusCode::OK {
            return Err(Error::auth("auth1 failed", res.status().as_u16(), res.url().as_str()));
        }

        let challenge = Challenge {
            token: header(&res, HEADER_AUTH_TOKEN)?.to_string(),
            key_length: header_usize(&res, HEADER_KEY_LENGTH)?,
            key_offset: header_usize(&res, HEADER_KEY_OFFSET)?,
        };
        debug!(
            "auth1 ok: key length={} offset={}",
            challenge.key_length, challenge.key_offset
        );
        Ok(challenge)
    }

    async fn auth2(&self, token: &str, partial_key: &str) -> Result<()> {
        if token.is_empty() || partial_key.is_empty() {
            return Err(Error::invalid_argument("auth2 needs a token and a partial key"));
        }

        let url = self.http.url(AUTH2_PATH);
        let request = self
            .http
            .get(&url)
            .header("x-radiko-authtoken", token)
            .header("x-radiko-device", AUTH_DEVICE)
            .header("x-radiko-partialkey", partial_key)
            .header("x-radiko-user", AUTH_USER);
        let res = self.http.send(request).await?;

        if res.status() != StatusCode::OK {
            return Err(Error::auth("auth2 failed", res.status().as_u16(), res.url().as_str()));
        }
        Ok(())
    }

    async fn partial_key(&self, length: usize, offset: usize) -> Result<String> {
        let base_key = self.base_key().await?;
        slice_key(&base_key, length, offset).map(str::to_string)
    }

    /// Scrape the base key from the player script, once.
    pub async fn base_key(&self) -> Result<String> {
        if let Some(key) = self.base_key.read().ok().and_then(|g| g.clone()) {
            return Ok(key);
        }

        let url = self.http.config().player_script_url.clone();
        let res = self.http.send_ok(self.http.get(&url)).await?;
        let script = res.text().await?;
        let key = extract_base_key(&script)?;

        if let Ok(mut guard) = self.base_key.write() {
            *guard = Some(key.clone());
        }
        Ok(key)
    }
}

fn header<'a>(res: &'a Response, name: &str) -> Result<&'a str> {
    res.headers()
        .get(name)
        .ok_or_else(|| Error::parse(format!("auth1 response has no {} header", name)))?
        .to_str()
        .map_err(|e| Error::parse(format!("{} header is not text: {}", name, e)))
}

fn header_usize(res: &Response, name: &str) -> Result<usize> {
    let raw = header(res, name)?;
    raw.trim()
        .parse()
        .map_err(|e| Error::parse(format!("{} header '{}' is not a count: {}", name, raw, e)))
}

/// Third comma-separated field of the first constructor call, unquoted.
fn extract_base_key(script: &str) -> Result<String> {
    let call = PLAYER_CALL
        .find(script)
        .ok_or_else(|| Error::not_found("base partial key not found"))?;

    let key = call
        .as_str()
        .split(',')
        .nth(2)
        .map(|field| field.replace('\'', "").trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::not_found("base partial key not found"))?;
    Ok(key)
}

fn slice_key(base_key: &str, length: usize, offset: usize) -> Result<&str> {
    let end = offset.checked_add(length);
    end.filter(|&end| end <= base_key.len())
        .and_then(|end| base_key.get(offset..end))
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "invalid partial key, key: '{}', length: '{}', offset: '{}'",
                base_key, length, offset
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_http;

    const KEY: &str = "bcd151073c03b352e1ef2fd66c32209da9ca0afa";

    fn script() -> String {
        format!(
            "var a = 1;\nvar player = new RadikoJSPlayer($audio[0], 'pc_html5', '{}', {{\n  x: 1\n}});\n\
             var other = new RadikoJSPlayer($audio[1], 'pc_html5', 'ffffffff', {{",
            KEY
        )
    }

    #[test]
    fn base_key_is_third_field_of_first_match() {
        assert_eq!(extract_base_key(&script()).unwrap(), KEY);
        assert!(matches!(
            extract_base_key("function noPlayer() {}"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            extract_base_key("new RadikoJSPlayer(a, {"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn slicing_respects_key_bounds() {
        assert_eq!(slice_key(KEY, 16, 0).unwrap(), "bcd151073c03b352");
        assert_eq!(slice_key(KEY, 4, 36).unwrap(), "0afa");
        assert!(matches!(slice_key(KEY, 5, 36), Err(Error::InvalidArgument(_))));
        assert!(matches!(slice_key(KEY, 41, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            slice_key(KEY, usize::MAX, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn full_handshake_returns_active_token() {
        let mut server = mockito::Server::new_async().await;
        let auth1 = server
            .mock("GET", "/v2/api/auth1")
            .match_header("X-Radiko-App", AUTH_APP)
            .match_header("X-Radiko-App-Version", AUTH_APP_VERSION)
            .match_header("X-Radiko-User", AUTH_USER)
            .match_header("X-Radiko-Device", AUTH_DEVICE)
            .with_header(HEADER_AUTH_TOKEN, "tok123")
            .with_header(HEADER_KEY_LENGTH, "16")
            .with_header(HEADER_KEY_OFFSET, "8")
            .with_header("set-cookie", "session=s1")
            .expect(2)
            .create_async()
            .await;
        let script_mock = server
            .mock("GET", "/apps/js/playerCommon.js")
            .with_body(script())
            .expect(1)
            .create_async()
            .await;
        let expected_key = STANDARD.encode(&KEY[8..24]);
        let auth2 = server
            .mock("GET", "/v2/api/auth2")
            .match_header("x-radiko-authtoken", "tok123")
            .match_header("x-radiko-device", AUTH_DEVICE)
            .match_header("x-radiko-user", AUTH_USER)
            .match_header("x-radiko-partialkey", expected_key.as_str())
            .match_header("cookie", "session=s1")
            .expect(2)
            .create_async()
            .await;

        let auths = AuthClient::new(test_http(&server));
        assert_eq!(auths.token().await.unwrap(), "tok123");
        // Second call re-runs the handshake but reuses the scraped key.
        assert_eq!(auths.token().await.unwrap(), "tok123");

        auth1.assert_async().await;
        script_mock.assert_async().await;
        auth2.assert_async().await;
    }

    #[tokio::test]
    async fn auth1_rejection_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api/auth1")
            .with_status(403)
            .create_async()
            .await;

        let auths = AuthClient::new(test_http(&server));
        match auths.token().await {
            Err(Error::Auth { message, status, url }) => {
                assert_eq!(message, "auth1 failed");
                assert_eq!(status, 403);
                assert!(url.ends_with("/v2/api/auth1"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_key_length_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api/auth1")
            .with_header(HEADER_AUTH_TOKEN, "tok123")
            .with_header(HEADER_KEY_OFFSET, "8")
            .create_async()
            .await;
        let script_mock = server
            .mock("GET", "/apps/js/playerCommon.js")
            .with_body(script())
            .expect(0)
            .create_async()
            .await;

        let auths = AuthClient::new(test_http(&server));
        assert!(matches!(auths.token().await, Err(Error::Parse(_))));
        script_mock.assert_async().await;
    }

    #[tokio::test]
    async fn auth2_rejection_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api/auth1")
            .with_header(HEADER_AUTH_TOKEN, "tok123")
            .with_header(HEADER_KEY_LENGTH, "16")
            .with_header(HEADER_KEY_OFFSET, "0")
            .create_async()
            .await;
        server
            .mock("GET", "/apps/js/playerCommon.js")
            .with_body(script())
            .create_async()
            .await;
        server
            .mock("GET", "/v2/api/auth2")
            .with_status(401)
            .create_async()
            .await;

        let auths = AuthClient::new(test_http(&server));
        assert!(matches!(
            auths.token().await,
            Err(Error::Auth { status: 401, ref message, .. }) if message == "auth2 failed"
        ));
    }

    #[tokio::test]
    async fn oversized_key_window_is_invalid_argument() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api/auth1")
            .with_header(HEADER_AUTH_TOKEN, "tok123")
            .with_header(HEADER_KEY_LENGTH, "16")
            .with_header(HEADER_KEY_OFFSET, "30")
            .create_async()
            .await;
        server
            .mock("GET", "/apps/js/playerCommon.js")
            .with_body(script())
            .create_async()
            .await;

        let auths = AuthClient::new(test_http(&server));
        assert!(matches!(auths.token().await, Err(Error::InvalidArgument(_))));
    }
}
