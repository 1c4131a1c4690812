use chrono::NaiveDate;

use super::Http;
use crate::error::{Error, Result};
use crate::markup::Document;

/// Schedule documents per station.
#[derive(Debug, Clone)]
pub struct ProgramClient {
    http: Http,
}

impl ProgramClient {
    pub(crate) fn new(http: Http) -> Self {
        Self { http }
    }

    /// Schedule of one broadcast day.
    pub async fn one_day(&self, channel_code: &str, date: NaiveDate) -> Result<Document> {
        require(channel_code)?;
        let path = format!(
            "/v3/program/station/date/{}/{}.xml",
            date.format("%Y%m%d"),
            channel_code
        );
        self.fetch(&path).await
    }

    /// Roughly two weeks around today, as published by the weekly endpoint.
    pub async fn two_weeks(&self, channel_code: &str) -> Result<Document> {
        require(channel_code)?;
        self.fetch(&format!("/v3/program/station/weekly/{}.xml", channel_code))
            .await
    }

    async fn fetch(&self, path: &str) -> Result<Document> {
        let res = self.http.send_ok(self.http.get(&self.http.url(path))).await?;
        Document::parse(&res.text().await?)
    }
}

fn require(channel_code: &str) -> Result<()> {
    if channel_code.is_empty() {
        return Err(Error::invalid_argument("channel code is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_http;

    #[tokio::test]
    async fn day_url_uses_compact_date() {
        let mut server = mockito::Server::new_async().await;
        let day = server
            .mock("GET", "/v3/program/station/date/20240105/TBS.xml")
            .with_body(r#"<radiko><stations><station id="TBS"><progs><prog id="1" ft="20240105050000" to="20240105060000"><title>a</title></prog></progs></station></stations></radiko>"#)
            .create_async()
            .await;

        let programs = ProgramClient::new(test_http(&server));
        let doc = programs
            .one_day("TBS", NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .await
            .unwrap();
        assert_eq!(doc.elements_by_tag("prog").len(), 1);
        day.assert_async().await;
    }

    #[tokio::test]
    async fn weekly_schedule_and_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/program/station/weekly/TBS.xml")
            .with_body("<radiko><stations/></radiko>")
            .create_async()
            .await;
        server
            .mock("GET", "/v3/program/station/weekly/NOPE.xml")
            .with_status(404)
            .create_async()
            .await;

        let programs = ProgramClient::new(test_http(&server));
        assert!(programs.two_weeks("TBS").await.is_ok());
        assert!(matches!(
            programs.two_weeks("NOPE").await,
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            programs.two_weeks("").await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
