mod player;
mod proxy;
mod selector;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use radiko_proto::broadcaster::{now_jst, Broadcaster, RadikoBroadcaster, RadiruBroadcaster};
use radiko_proto::config::Config;
use radiko_proto::model::{Channel, Program};
use radiko_proto::parser;
use reqwest::Url;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use player::Player;
use proxy::{RelayState, TokenSlot, HEADER_AUTH_TOKEN};
use selector::ProxySelector;

#[derive(Debug, Parser)]
#[command(name = "radiko-daemon", version, about = "radiko client with a header-injecting HLS relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay until interrupted.
    Serve,
    /// List stations.
    Stations {
        /// Only stations receivable in the detected area.
        #[arg(long)]
        area: bool,
        /// NHK radio (らじる★らじる) instead of radiko.
        #[arg(long)]
        radiru: bool,
    },
    /// Print a station's schedule.
    Programs {
        station: String,
        /// Broadcast day as yyyyMMdd, today when omitted.
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        radiru: bool,
    },
    /// Play a station live.
    Play {
        station: String,
        #[arg(long)]
        radiru: bool,
    },
    /// Play a catch-up window, times as yyyyMMddHHmmss.
    Timefree {
        station: String,
        #[arg(value_parser = parse_time)]
        ft: NaiveDateTime,
        #[arg(value_parser = parse_time)]
        to: NaiveDateTime,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| format!("expected yyyyMMdd: {}", e))
}

fn parse_time(s: &str) -> Result<NaiveDateTime, String> {
    parser::parse_timestamp(s).map_err(|e| e.to_string())
}

fn init_logging() -> anyhow::Result<()> {
    let data_dir = radiko_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("radiko-daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("cannot open {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,radiko_daemon=debug,radiko_proto=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Stations { area, radiru } => {
            if radiru {
                let nhk = radiru_broadcaster(&config).await?;
                print_stations(&nhk, false);
            } else {
                let radiko = radiko_broadcaster(&config).await?;
                info!("area code: {}", radiko.area_code());
                print_stations(&radiko, area);
            }
            Ok(())
        }
        Command::Programs { station, date, radiru } => {
            let date = date.unwrap_or_else(|| now_jst().date());
            if radiru {
                let nhk = radiru_broadcaster(&config).await?;
                print_programs(&nhk, &station, date).await
            } else {
                let radiko = radiko_broadcaster(&config).await?;
                print_programs(&radiko, &station, date).await
            }
        }
        Command::Play { station, radiru } => {
            if radiru {
                let nhk = radiru_broadcaster(&config).await?;
                let channel = find_channel(&nhk, &station)?;
                let manifest = nhk.stream_url(&channel)?;
                let status = Player::from_config(&config.player)?.play(&manifest, None, None).await?;
                info!("player exited: {}", status);
                Ok(())
            } else {
                play_live(&config, &station).await
            }
        }
        Command::Timefree { station, ft, to } => play_timefree(&config, &station, ft, to).await,
    }
}

// ── Broadcasters ──────────────────────────────────────────────────────────────

async fn radiko_broadcaster(config: &Config) -> anyhow::Result<RadikoBroadcaster> {
    let mut radiko = RadikoBroadcaster::new(&config.radiko)?;
    radiko.init().await.context("radiko catalog")?;

    if let Some((mail, pass)) = config.premium.credentials() {
        match radiko.client().premiums().login(mail, pass).await {
            Ok(true) => match radiko.client().premiums().status().await {
                Ok(status) => info!("premium: area free = {}", status.is_area_free()),
                Err(e) => warn!("premium status failed: {}", e),
            },
            Ok(false) => warn!("premium login rejected, continuing without area free"),
            Err(e) => warn!("premium login failed: {}", e),
        }
    }
    Ok(radiko)
}

async fn radiru_broadcaster(config: &Config) -> anyhow::Result<RadiruBroadcaster> {
    let mut nhk = RadiruBroadcaster::new(&config.radiru)?;
    nhk.init().await.context("radiru catalog")?;
    Ok(nhk)
}

/// Channel by station code, preferring the default area's.
fn find_channel<B: Broadcaster>(broadcaster: &B, station: &str) -> anyhow::Result<Channel> {
    let default_area = broadcaster.default_area().map(|a| a.id().to_string());
    let mut matches = broadcaster
        .catalog()
        .channels()
        .iter()
        .filter(|c| c.code().eq_ignore_ascii_case(station));

    let first = matches
        .next()
        .ok_or_else(|| anyhow::anyhow!("unknown station: {}", station))?;
    let preferred = std::iter::once(first)
        .chain(matches)
        .find(|c| Some(c.area_id()) == default_area.as_deref())
        .unwrap_or(first);
    Ok(preferred.clone())
}

fn print_stations<B: Broadcaster>(broadcaster: &B, receivable_only: bool) {
    for area in broadcaster.catalog().areas() {
        let channels: Vec<&Channel> = broadcaster
            .catalog()
            .channels_by_area(area.id())
            .into_iter()
            .filter(|c| !receivable_only || broadcaster.is_playable_channel(c))
            .collect();
        if channels.is_empty() {
            continue;
        }
        println!("{} ({})", area.name(), area.id());
        for channel in channels {
            let mark = if broadcaster.is_playable_channel(channel) { "*" } else { " " };
            println!("  {} {:<10} {}", mark, channel.code(), channel.name());
        }
    }
}

async fn print_programs<B: Broadcaster>(
    broadcaster: &B,
    station: &str,
    date: NaiveDate,
) -> anyhow::Result<()> {
    let channel = find_channel(broadcaster, station)?;
    let programs = broadcaster.programs_for_day(&channel, date).await?;
    println!("{} {} ({})", channel.name(), date, broadcaster.broadcaster_type());
    for program in &programs {
        println!("{}", describe(broadcaster, program));
    }
    Ok(())
}

fn describe<B: Broadcaster>(broadcaster: &B, program: &Program) -> String {
    let flag = match (broadcaster.is_playable(program), broadcaster.is_recordable(program)) {
        (true, _) => "▶",
        (false, true) => "●",
        (false, false) => " ",
    };
    format!(
        "{} {}-{} {}",
        flag,
        program.start().format("%H:%M"),
        program.finish().format("%H:%M"),
        program.title()
    )
}

// ── Relay-backed playback ─────────────────────────────────────────────────────

struct Relay {
    token: TokenSlot,
    selector: ProxySelector,
    _server: tokio::task::JoinHandle<()>,
}

async fn start_relay(config: &Config) -> anyhow::Result<Relay> {
    let selector = ProxySelector::from_config(&config.proxy)?;
    let state = RelayState::new(TokenSlot::new(), Some(config.proxy.streaming_host.clone()))?;
    let token = state.token().clone();
    let (_, server) =
        proxy::start_server(&config.proxy.bind_address, config.proxy.port, state).await?;
    Ok(Relay {
        token,
        selector,
        _server: server,
    })
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let relay = start_relay(config).await?;

    match RadikoBroadcaster::new(&config.radiko)?.client().auths().token().await {
        Ok(token) => relay.token.set(token),
        Err(e) => warn!("no token yet, relaying without one: {}", e),
    }

    info!("relay ready at {}, Ctrl-C to stop", relay.selector.relay());
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Fetch the manifest once, routed the way the player will fetch it, so an
/// auth problem shows up in the log before the player starts.
async fn preflight(selector: &ProxySelector, manifest: &Url, direct_token: Option<&str>) {
    let client = match reqwest::Client::builder()
        .proxy(selector.reqwest_proxy())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("preflight: {}", e);
            return;
        }
    };
    let mut request = client.get(selector.via_relay(manifest));
    if let Some(token) = direct_token {
        request = request.header(HEADER_AUTH_TOKEN, token);
    }
    match request.send().await {
        Ok(res) if res.status().is_success() => info!("preflight: manifest {}", res.status()),
        Ok(res) => warn!("preflight: manifest answered {}", res.status()),
        Err(e) => warn!("preflight: {}", e),
    }
}

/// Manifests on the streaming host get the token from the relay; anything
/// else (catch-up chunklists on radiko.jp) has mpv send it itself.
async fn play_through_relay(config: &Config, relay: &Relay, manifest: &Url) -> anyhow::Result<()> {
    let token = relay.token.get();
    let direct_token = relay.selector.direct_token(manifest, &token);
    preflight(&relay.selector, manifest, direct_token).await;
    let status = Player::from_config(&config.player)?
        .play(
            &relay.selector.via_relay(manifest),
            Some(relay.selector.relay()),
            direct_token,
        )
        .await?;
    info!("player exited: {}", status);
    Ok(())
}

async fn play_live(config: &Config, station: &str) -> anyhow::Result<()> {
    let relay = start_relay(config).await?;
    let radiko = radiko_broadcaster(config).await?;
    let channel = find_channel(&radiko, station)?;
    if !radiko.is_playable_channel(&channel) {
        warn!("{} is outside area {}", channel.code(), radiko.area_code());
    }

    relay.token.set(radiko.client().auths().token().await?);
    let manifest = radiko.live_manifest(&channel).await?;
    info!("live {}: {}", channel.code(), manifest);
    play_through_relay(config, &relay, &manifest).await
}

async fn play_timefree(
    config: &Config,
    station: &str,
    ft: NaiveDateTime,
    to: NaiveDateTime,
) -> anyhow::Result<()> {
    let relay = start_relay(config).await?;
    let radiko = radiko_broadcaster(config).await?;
    let channel = find_channel(&radiko, station)?;

    let programs = radiko.programs_for_day(&channel, ft.date()).await?;
    match programs.iter().find(|p| p.start() == ft) {
        Some(program) if !radiko.is_playable(program) => {
            warn!("{} is outside the catch-up window", program.title());
        }
        Some(program) => info!("timefree: {}", program.title()),
        None => {}
    }

    let manifest = radiko
        .client()
        .time_frees()
        .manifest_url(channel.code(), ft, to)
        .await?;
    // Handshake after resolving so the token handed out is the newest one.
    relay.token.set(radiko.client().auths().token().await?);
    info!("timefree {} {}-{}: {}", channel.code(), ft, to, manifest);
    play_through_relay(config, &relay, &manifest).await
}
