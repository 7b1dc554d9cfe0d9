use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::Result;
use log::{error, info};

use wearable_rs::client::{WearableClient, WearableConfig};
use wearable_rs::types::{LedChannel, Melody, WearableEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=wearable_rs=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    // The kit's advertised name; override with the first CLI argument or
    // change it at runtime with the `name` command.
    let device_name = std::env::args().nth(1).unwrap_or_else(|| "wearable".into());
    let config = WearableConfig { device_name };

    // ── Connect ───────────────────────────────────────────────────────────────
    info!("Looking for wearable {:?} …", config.device_name);
    let handle = WearableClient::new(config).start().await?;
    let mut events = handle.subscribe();

    info!("Commands (type + Enter):");
    info!("  r|g|b <0-255>  – set LED channel");
    info!("  off            – LED off");
    info!("  m <1-3>        – play melody");
    info!("  p              – poll sensors once");
    info!("  name <name>    – switch to another wearable");
    info!("  raw <frame>    – send a raw frame (terminator added)");
    info!("  q              – quit\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (to avoid holding a non-Send
    // StdinLock across await points), then relayed to an async task.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let handle_cmd = handle.clone();
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if line.is_empty() {
                continue;
            }
            if let Err(e) = run_command(&handle_cmd, &line).await {
                error!("Command error: {e}");
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    // While connected, poll the sensors once a second — the same cadence the
    // original companion app used for its live display.
    let mut poller: Option<tokio::task::JoinHandle<()>> = None;

    while let Ok(event) = events.recv().await {
        match event {
            WearableEvent::Connection { connected: true } => {
                info!("Wearable connected.");
                let poll_handle = handle.clone();
                poller = Some(tokio::spawn(async move {
                    let mut tick = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        tick.tick().await;
                        if poll_handle.poll_sensors().await.is_err() {
                            break;
                        }
                    }
                }));
            }
            WearableEvent::Connection { connected: false } => {
                info!("Wearable disconnected — scanning again.");
                if let Some(task) = poller.take() {
                    task.abort();
                }
            }
            WearableEvent::Telemetry { kind, value } => {
                println!("[{kind}] {value}");
            }
        }
    }

    info!("Event loop finished — exiting.");
    Ok(())
}

async fn run_command(handle: &wearable_rs::client::WearableHandle, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next();

    match (cmd, arg) {
        ("q", _) => {
            info!("Quit requested.");
            handle.shutdown().await.ok();
            std::process::exit(0);
        }
        ("off", _) => handle.led_off().await,
        ("r" | "g" | "b", Some(value)) => {
            let channel = match cmd {
                "r" => LedChannel::Red,
                "g" => LedChannel::Green,
                _ => LedChannel::Blue,
            };
            let value: u8 = value.parse()?;
            handle.set_led(channel, value).await
        }
        ("m", Some(which)) => {
            let melody = match which {
                "1" => Melody::First,
                "2" => Melody::Second,
                "3" => Melody::Third,
                other => anyhow::bail!("no melody {other:?} (use 1-3)"),
            };
            handle.play_melody(melody).await
        }
        ("p", _) => handle.poll_sensors().await,
        ("name", Some(name)) => handle.set_device_name(name).await,
        ("raw", Some(_)) => {
            // Everything after "raw " is the frame body.
            let frame = line["raw".len()..].trim_start();
            handle.send_frame(format!("{frame}\n\r")).await
        }
        _ => anyhow::bail!("unrecognized command {line:?}"),
    }
}
