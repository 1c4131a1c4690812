#![allow(dead_code)]

use mockito::{Mock, ServerGuard};

pub const BASE_KEY: &str = "bcd151073c03b352e1ef2fd66c32209da9ca0afa";

pub const AREA_PAGE: &str = r#"document.write('<span class="JP13">TOKYO JAPAN</span>');"#;

pub const FULL_DIRECTORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<region>
  <stations ascii_name="KANTO" region_id="kanto" region_name="関東">
    <station><id>TBS</id><name>TBSラジオ</name></station>
    <station><id>QRR</id><name>文化放送</name></station>
    <station><id>JOAK</id><name>NHKラジオ第1（東京）</name></station>
  </stations>
  <stations ascii_name="KINKI" region_id="kinki" region_name="近畿">
    <station><id>ABC</id><name>ABCラジオ</name></station>
  </stations>
</region>"#;

pub const JP13_DIRECTORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<stations area_id="JP13" area_name="TOKYO JAPAN">
  <station><id>TBS</id><name>TBSラジオ</name></station>
  <station><id>QRR</id><name>文化放送</name></station>
  <station><id>JOAK</id><name>NHKラジオ第1（東京）</name></station>
</stations>"#;

pub fn player_script() -> String {
    format!(
        "var player = new RadikoJSPlayer($audio[0], 'pc_html5', '{}', {{\n  start: true\n}});",
        BASE_KEY
    )
}

pub fn stream_document(station: &str) -> String {
    format!(
        r#"<urls>
  <url areafree="0"><playlist_create_url>https://f-radiko.smartstream.ne.jp/{0}/_definst_/simul-stream.stream/playlist.m3u8</playlist_create_url></url>
  <url areafree="1"><playlist_create_url>https://f-radiko.smartstream.ne.jp/{0}/_definst_/simul-stream-af.stream/playlist.m3u8</playlist_create_url></url>
</urls>"#,
        station
    )
}

/// Directory endpoints an update walks through.
pub async fn mock_directories(server: &mut ServerGuard) -> Vec<Mock> {
    vec![
        server
            .mock("GET", "/area/")
            .with_body(AREA_PAGE)
            .create_async()
            .await,
        server
            .mock("GET", "/v3/station/list/JP13.xml")
            .with_body(JP13_DIRECTORY)
            .create_async()
            .await,
        server
            .mock("GET", "/v3/station/region/full.xml")
            .with_body(FULL_DIRECTORY)
            .create_async()
            .await,
    ]
}

/// auth1 / player script / auth2 answering with `token`.
pub async fn mock_handshake(server: &mut ServerGuard, token: &str) -> Vec<Mock> {
    vec![
        server
            .mock("GET", "/v2/api/auth1")
            .with_header("X-Radiko-AuthToken", token)
            .with_header("X-Radiko-KeyLength", "16")
            .with_header("X-Radiko-KeyOffset", "4")
            .create_async()
            .await,
        server
            .mock("GET", "/apps/js/playerCommon.js")
            .with_body(player_script())
            .create_async()
            .await,
        server
            .mock("GET", "/v2/api/auth2")
            .match_header("x-radiko-authtoken", token)
            .with_body("OK")
            .create_async()
            .await,
    ]
}
