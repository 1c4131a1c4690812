use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use tracing::info;

use super::Http;
use crate::error::{Error, Result};

static AREA_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"JP[0-9]+").expect("area code pattern"));

/// Resolves the caller's area code (`JP13` …) from the public probe page.
///
/// The first successful answer is cached for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct AreaClient {
    http: Http,
    code: Arc<RwLock<Option<String>>>,
}

impl AreaClient {
    pub(crate) fn new(http: Http) -> Self {
        Self {
            http,
            code: Arc::new(RwLock::new(None)),
        }
    }

    pub fn cached_code(&self) -> Option<String> {
        self.code.read().ok().and_then(|g| g.clone())
    }

    pub async fn code(&self) -> Result<String> {
        if let Some(code) = self.cached_code() {
            return Ok(code);
        }

        let url = self.http.config().area_url.clone();
        let res = self.http.send_ok(self.http.get(&url)).await?;
        let body = res.text().await?;

        let code = extract_area_code(&body)
            .ok_or_else(|| Error::not_found("area id not found"))?;
        info!("area code resolved: {}", code);

        if let Ok(mut guard) = self.code.write() {
            *guard = Some(code.clone());
        }
        Ok(code)
    }
}

/// Last `JP<digits>` token in the body.
///
/// `document.write('<span class="JP13">TOKYO JAPAN</span>');` → `JP13`
fn extract_area_code(body: &str) -> Option<String> {
    AREA_CODE
        .find_iter(body)
        .last()
        .map(|m| m.as_str().replace('\'', "").trim().to_string())
        .filter(|c| !c.is_empty())
}
