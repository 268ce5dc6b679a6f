use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{DeviceBackend, HttpDeviceBackend, LinkEvent, LinkSupervisor, NoticeKind};
use shared::domain::LinkPhase;
use tokio::sync::broadcast;
use tracing::warn;

mod config;

use config::{load_settings, prepare_backend_url, Settings};

const FIRST_OBSERVATION_WAIT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
struct Cli {
    /// Base url of the dashboard backend, overriding console.toml and env.
    #[arg(long)]
    backend_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot device status query.
    Status,
    /// Poll continuously and print status, phase and notices.
    Watch,
    /// Start the device link and wait for it to settle.
    Connect {
        /// Device uid; defaults to the uid the backend reports.
        #[arg(long)]
        uid: Option<String>,
    },
    /// Stop the device link and wait for it to settle.
    Disconnect,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.backend_url {
        settings.backend_url = url;
    }
    let backend_url = prepare_backend_url(&settings.backend_url)?;
    let backend = Arc::new(HttpDeviceBackend::new(backend_url));

    match cli.command {
        Command::Status => run_status(backend).await,
        Command::Watch => run_watch(backend, &settings).await,
        Command::Connect { uid } => run_connect(backend, &settings, uid).await,
        Command::Disconnect => run_disconnect(backend, &settings).await,
    }
}

async fn run_status(backend: Arc<HttpDeviceBackend>) -> Result<()> {
    match backend.fetch_uid().await {
        Ok(uid) => println!("uid: {uid}"),
        Err(err) => {
            warn!(error = %err, "device uid unavailable");
            println!("uid: unknown");
        }
    }
    let status = backend.fetch_status().await.context("status query failed")?;
    println!("connected: {}", status.is_connected);
    println!("battery: {}", battery_label(status.battery_percent()));
    Ok(())
}

async fn run_watch(backend: Arc<HttpDeviceBackend>, settings: &Settings) -> Result<()> {
    let supervisor = LinkSupervisor::new_with_options(backend, settings.supervisor_options());
    let mut events = supervisor.subscribe_events();
    supervisor.activate().await;
    println!("watching device status, press ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(LinkEvent::SnapshotUpdated(snapshot)) => println!(
                    "status: connected={} battery={}",
                    snapshot.connected,
                    battery_label(snapshot.battery_percent),
                ),
                Ok(LinkEvent::PhaseChanged(phase)) => println!("phase: {}", phase_label(phase)),
                Ok(LinkEvent::NoticePosted(notice)) => match notice.kind {
                    NoticeKind::Success => println!("ok: {}", notice.message),
                    NoticeKind::Error => println!("error: {}", notice.message),
                },
                Ok(LinkEvent::NoticeDismissed { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    supervisor.deactivate().await;
    Ok(())
}

async fn run_connect(
    backend: Arc<HttpDeviceBackend>,
    settings: &Settings,
    uid: Option<String>,
) -> Result<()> {
    let options = settings.supervisor_options();
    let settle_wait = options.confirm_timeout + options.poll_interval * 2;
    let supervisor = LinkSupervisor::new_with_options(backend, options);
    let mut events = supervisor.subscribe_events();
    supervisor.activate().await;
    wait_until_observed(&supervisor, &mut events).await?;

    let uid = match uid {
        Some(uid) => uid,
        None => supervisor.device_uid().await,
    };
    supervisor.request_connect(&uid).await?;
    let settled = wait_until_settled(&mut events, LinkPhase::Connected, settle_wait).await;
    supervisor.deactivate().await;
    settled?;

    match supervisor.latest_snapshot().await {
        Some(snapshot) => println!("connected, battery {}", battery_label(snapshot.battery_percent)),
        None => println!("connected"),
    }
    Ok(())
}

async fn run_disconnect(backend: Arc<HttpDeviceBackend>, settings: &Settings) -> Result<()> {
    let options = settings.supervisor_options();
    let settle_wait = options.confirm_timeout + options.poll_interval * 2;
    let supervisor = LinkSupervisor::new_with_options(backend, options);
    let mut events = supervisor.subscribe_events();
    supervisor.activate().await;
    wait_until_observed(&supervisor, &mut events).await?;

    supervisor.request_disconnect().await?;
    let settled = wait_until_settled(&mut events, LinkPhase::Disconnected, settle_wait).await;
    supervisor.deactivate().await;
    settled?;

    println!("disconnected");
    Ok(())
}

/// Requests are rejected until the first status observation, so block until
/// one arrives.
async fn wait_until_observed(
    supervisor: &Arc<LinkSupervisor>,
    events: &mut broadcast::Receiver<LinkEvent>,
) -> Result<()> {
    if supervisor.phase().await != LinkPhase::Unknown {
        return Ok(());
    }
    tokio::time::timeout(FIRST_OBSERVATION_WAIT, async {
        loop {
            match events.recv().await {
                Ok(LinkEvent::SnapshotUpdated(_)) => break,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await
    .map_err(|_| anyhow!("backend did not report device status"))?;
    Ok(())
}

async fn wait_until_settled(
    events: &mut broadcast::Receiver<LinkEvent>,
    want: LinkPhase,
    wait: Duration,
) -> Result<()> {
    tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(LinkEvent::PhaseChanged(phase)) if phase == want => break Ok(()),
                Ok(LinkEvent::NoticePosted(notice)) if notice.kind == NoticeKind::Error => {
                    break Err(anyhow!(notice.message));
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    break Err(anyhow!("event stream closed"));
                }
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for the device to settle"))?
}

fn battery_label(battery: Option<u8>) -> String {
    match battery {
        Some(level) => format!("{level}%"),
        None => "unknown".to_string(),
    }
}

fn phase_label(phase: LinkPhase) -> &'static str {
    match phase {
        LinkPhase::Unknown => "unknown",
        LinkPhase::Disconnected => "disconnected",
        LinkPhase::Connected => "connected",
        LinkPhase::PendingStart => "connecting",
        LinkPhase::PendingStop => "disconnecting",
    }
}
