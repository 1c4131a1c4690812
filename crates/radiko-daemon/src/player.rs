use std::path::PathBuf;
use std::process::ExitStatus;

use radiko_proto::config::PlayerConfig;
use radiko_proto::platform;
use reqwest::Url;
use tracing::info;

use crate::proxy::HEADER_AUTH_TOKEN;

/// Hands a resolved manifest to mpv, with mpv's HTTP proxy pointed at the
/// relay so media requests pick up the session headers.
#[derive(Debug, Clone)]
pub struct Player {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl Player {
    pub fn from_config(config: &PlayerConfig) -> anyhow::Result<Self> {
        let binary = match &config.mpv_path {
            Some(path) => path.clone(),
            None => platform::find_mpv_binary()
                .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?,
        };
        Ok(Self {
            binary,
            extra_args: config.extra_args.clone(),
        })
    }

    fn args(&self, manifest: &Url, relay: Option<&Url>, auth_token: Option<&str>) -> Vec<String> {
        let mut args = vec!["--no-video".to_string(), "--quiet".to_string()];
        if let Some(relay) = relay {
            args.push(format!("--http-proxy={}", relay));
        }
        if let Some(token) = auth_token {
            args.push(format!("--http-header-fields={}: {}", HEADER_AUTH_TOKEN, token));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(manifest.to_string());
        args
    }

    /// Run mpv until it exits.
    ///
    /// `auth_token` is sent by mpv itself on every request, for manifests on
    /// hosts the relay does not rewrite.
    pub async fn play(
        &self,
        manifest: &Url,
        relay: Option<&Url>,
        auth_token: Option<&str>,
    ) -> anyhow::Result<ExitStatus> {
        info!("player: {} {}", self.binary.display(), manifest);
        let mut child = tokio::process::Command::new(&self.binary)
            .args(self.args(manifest, relay, auth_token))
            .kill_on_drop(true)
            .spawn()?;
        Ok(child.wait().await?)
    }
}
