use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use clap_derive::{Parser, Subcommand, ValueEnum};
use mqtt_switch_rs::logging::{LogConfig, RotationPeriod, setup_logging};
use mqtt_switch_rs::{Hub, MqttSwitch, RumqttTransport, Settings, StateNotifier, SwitchConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SwitchState {
    On,
    Off,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Attach every configured switch and log state changes until interrupted.
    /// Lines such as `<switch> on` read from stdin are sent as commands.
    Run,
    /// Publish a single command and exit
    Set {
        #[arg(long)]
        switch: String,
        #[arg(long)]
        state: SwitchState,
    },
}

#[derive(Parser, Debug)]
struct Params {
    /// Settings file (JSON) describing the broker and the switches
    #[clap(long)]
    settings: String,
    /// Broker host, overrides the settings file
    #[clap(long)]
    host: Option<String>,
    /// Broker port, overrides the settings file
    #[clap(long)]
    port: Option<u16>,
    /// Broker user name, overrides the settings file
    #[clap(long)]
    user: Option<String>,
    /// Broker password, overrides the settings file
    #[clap(long)]
    password: Option<String>,
    /// Directory for rotating log files (if not set, logs only go to stdout)
    #[clap(long)]
    log_dir: Option<String>,
    /// Log rotation period: hourly, daily or never
    #[clap(long, default_value = "daily")]
    log_rotation: RotationPeriod,

    #[command(subcommand)]
    command: Commands,
}

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let params = Params::parse();

    let _log_guard = setup_logging(params.log_dir.as_ref().map(|dir| LogConfig {
        log_dir: dir.into(),
        rotation: params.log_rotation,
        ..Default::default()
    }))
    .context("Failed to set up logging")?;

    let settings = load_settings(&params)?;
    let configs = settings
        .switch_configs()
        .context("Invalid switch configuration")?;

    let (transport, eventloop) = RumqttTransport::new(settings.broker.mqtt_options());
    let result = match params.command {
        Commands::Run => run(transport.clone(), configs).await,
        Commands::Set { switch, state } => set(transport.clone(), configs, &switch, state).await,
    };

    if let Err(e) = transport.disconnect().await {
        warn!("Failed to disconnect: {e}");
    }
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, eventloop).await.is_err() {
        warn!("Event loop did not stop in time");
    }
    result
}

fn load_settings(params: &Params) -> Result<Settings> {
    let json = std::fs::read_to_string(&params.settings)
        .with_context(|| format!("Failed to read settings file {}", params.settings))?;
    let mut settings = Settings::from_json(&json).context("Failed to parse settings file")?;

    if let Some(host) = &params.host {
        settings.broker.host = host.clone();
    }
    if let Some(port) = params.port {
        settings.broker.port = port;
    }
    if let Some(user) = &params.user {
        settings.broker.user = Some(user.clone());
    }
    if let Some(password) = &params.password {
        settings.broker.password = Some(password.clone());
    }
    Ok(settings)
}

async fn set(
    transport: RumqttTransport,
    configs: Vec<SwitchConfig>,
    name: &str,
    state: SwitchState,
) -> Result<()> {
    let config = configs
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| anyhow!("Unknown switch: {name}"))?;
    let (notifier, _changes) = StateNotifier::channel();
    let switch = MqttSwitch::new(config, transport, notifier);

    match state {
        SwitchState::On => switch.turn_on().await?,
        SwitchState::Off => switch.turn_off().await?,
    }
    info!("Sent {state:?} to {}", switch.command_topic());
    Ok(())
}

async fn run(transport: RumqttTransport, configs: Vec<SwitchConfig>) -> Result<()> {
    let (hub, mut changes) = Hub::new(transport);
    for config in configs {
        let name = config.name.clone();
        hub.add_switch(config)
            .await
            .with_context(|| format!("Failed to add switch {name}"))?;
    }
    info!("Switches ready: {}", hub.names().join(", "));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else { break };
                info!(
                    "Switch {} is {} ({})",
                    change.name,
                    if change.is_on { "on" } else { "off" },
                    if change.assumed_state { "assumed" } else { "confirmed" }
                );
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_command(&hub, line.trim()).await,
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("Cannot read commands from stdin: {e}");
                        stdin_open = false;
                    }
                }
            }
            res = &mut shutdown => {
                res?;
                info!("signal received, starting graceful shutdown");
                break;
            }
        }
    }
    Ok(())
}

async fn handle_command(hub: &Hub<RumqttTransport>, line: &str) {
    if line.is_empty() {
        return;
    }
    let Some((name, state)) = line.rsplit_once(' ') else {
        warn!("Expected '<switch> on|off', got {line:?}");
        return;
    };
    let result = match state.to_lowercase().as_str() {
        "on" => hub.turn_on(name.trim()).await,
        "off" => hub.turn_off(name.trim()).await,
        other => {
            warn!("Unknown state {other:?}, expected on or off");
            return;
        }
    };
    if let Err(e) = result {
        error!("Command {line:?} failed: {e}");
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    Ok(())
}
