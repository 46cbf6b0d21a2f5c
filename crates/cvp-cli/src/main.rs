use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use cvp_devices::{AdbEndpoint, CommandExecutor, Device, DeviceEnumerator, SimEndpoint};
use cvp_installer::{is_eligible, LogEntry, LogKind, RunSummary, Session, VersionPolicy};
use futures_util::StreamExt;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

#[derive(Parser)]
#[command(name = "cvp", version, about = "CTS Verifier device provisioning CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Scan for attached devices and print the device table
    Scan {
        /// Use the simulated device bench instead of a real adb binary
        #[arg(long)]
        simulate: bool,
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
        /// Version policy file (defaults to the built-in table)
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Print the supported-version policy table
    Versions {
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Run the CTS Verifier install sequence against selected devices
    Install {
        /// Device serial to install to (repeatable)
        #[arg(long = "device")]
        devices: Vec<String>,
        /// Install to every eligible device
        #[arg(long, conflicts_with = "devices")]
        all: bool,
        /// Use the simulated device bench instead of a real adb binary
        #[arg(long)]
        simulate: bool,
        /// Version policy file (defaults to the built-in table)
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Write the final log stream to this file as JSON
        #[arg(long)]
        export_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = cvp_util::init_tracing() {
        eprintln!("failed to initialize tracing: {err}");
    }

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Scan {
            simulate,
            json,
            policy,
        } => run_scan(simulate, json, policy.as_deref()).await,
        Cmd::Versions { policy } => run_versions(policy.as_deref()),
        Cmd::Install {
            devices,
            all,
            simulate,
            policy,
            export_log,
        } => run_install(devices, all, simulate, policy.as_deref(), export_log).await,
    }
}

fn load_policy(path: Option<&std::path::Path>) -> Result<VersionPolicy, ExitCode> {
    match path {
        Some(path) => VersionPolicy::from_json_file(path).map_err(|err| {
            eprintln!("{err}");
            ExitCode::FAILURE
        }),
        None => Ok(VersionPolicy::builtin()),
    }
}

fn endpoints(simulate: bool) -> (Arc<dyn DeviceEnumerator>, Arc<dyn CommandExecutor>) {
    if simulate {
        let sim = Arc::new(SimEndpoint::bench().with_latency(Duration::from_millis(250)));
        (sim.clone() as Arc<dyn DeviceEnumerator>, sim)
    } else {
        let adb = Arc::new(AdbEndpoint::new());
        (adb.clone() as Arc<dyn DeviceEnumerator>, adb)
    }
}

fn session(simulate: bool, policy: VersionPolicy) -> Session {
    let (enumerator, executor) = endpoints(simulate);
    Session::new(enumerator, executor, Arc::new(policy))
}

async fn run_scan(simulate: bool, json: bool, policy: Option<&std::path::Path>) -> ExitCode {
    let policy = match load_policy(policy) {
        Ok(policy) => policy,
        Err(code) => return code,
    };
    let mut session = session(simulate, policy);

    if let Err(err) = session.scan().await {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    if json {
        match serde_json::to_string_pretty(session.devices()) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("failed to serialize device list: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_device_table(session.devices());
    }
    ExitCode::SUCCESS
}

fn run_versions(policy: Option<&std::path::Path>) -> ExitCode {
    let policy = match load_policy(policy) {
        Ok(policy) => policy,
        Err(code) => return code,
    };
    println!("{:<8} {:<14} INSTALL PATH", "VERSION", "LABEL");
    for version in policy.entries() {
        println!(
            "{:<8} {:<14} {}",
            version.id,
            version.label,
            policy.install_path(version)
        );
    }
    ExitCode::SUCCESS
}

async fn run_install(
    requested: Vec<String>,
    all: bool,
    simulate: bool,
    policy: Option<&std::path::Path>,
    export_log: Option<PathBuf>,
) -> ExitCode {
    let policy = match load_policy(policy) {
        Ok(policy) => policy,
        Err(code) => return code,
    };
    let mut session = session(simulate, policy);

    eprintln!("Scanning for devices...");
    if let Err(err) = session.scan().await {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    if all {
        session.select_all();
    } else {
        for id in &requested {
            let Some(found) = session.devices().iter().find(|device| device.id == *id) else {
                eprintln!("device {id} is not attached");
                return ExitCode::FAILURE;
            };
            if !is_eligible(found) {
                eprintln!(
                    "device {id} is not eligible (status {}, Android {})",
                    found.status, found.version
                );
                return ExitCode::FAILURE;
            }
            session.toggle(id, true);
        }
    }

    if session.selection().is_empty() {
        eprintln!("no eligible devices selected");
        return ExitCode::FAILURE;
    }

    let logs = session.logs();
    let (_, receiver) = logs.subscribe();
    let mut entries = BroadcastStream::new(receiver);

    let handle = match session.start() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = session.orchestrator().clone();
    let mut settled = Box::pin(handle.wait());
    let summary = loop {
        tokio::select! {
            summary = &mut settled => break summary,
            _ = tokio::signal::ctrl_c() => orchestrator.cancel(),
            entry = entries.next() => match entry {
                Some(Ok(entry)) => print_entry(&entry),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!("log stream lagged; skipped {skipped} entries");
                }
                None => {}
            },
        }
    };

    // Every entry of a settled run is already buffered; drain the tail.
    while let Ok(Some(Ok(entry))) =
        tokio::time::timeout(Duration::from_millis(20), entries.next()).await
    {
        print_entry(&entry);
    }

    print_outcomes(&summary);

    if let Some(path) = export_log {
        match cvp_util::write_json_atomic(&path, &logs.snapshot()) {
            Ok(()) => eprintln!("log written to {}", path.display()),
            Err(err) => {
                eprintln!("failed to write log to {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    if summary.cancelled || !summary.all_succeeded() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_device_table(devices: &[Device]) {
    if devices.is_empty() {
        println!("No devices attached.");
        return;
    }
    println!(
        "{:<16} {:<13} {:<8} {:<10} MODEL",
        "SERIAL", "STATUS", "ANDROID", "SUPPORTED"
    );
    for device in devices {
        println!(
            "{:<16} {:<13} {:<8} {:<10} {}",
            device.id,
            device.status,
            device.version,
            if device.is_supported { "yes" } else { "no" },
            device.model
        );
    }
}

fn print_entry(entry: &LogEntry) {
    let tag = match entry.kind {
        LogKind::Info => "INFO",
        LogKind::Command => " CMD",
        LogKind::Success => "  OK",
        LogKind::Error => " ERR",
    };
    match entry.device_id.as_deref() {
        Some(id) => println!("[{tag}] [{id}] {}", entry.message),
        None => println!("[{tag}] {}", entry.message),
    }
}

fn print_outcomes(summary: &RunSummary) {
    println!();
    println!("Run {} outcomes:", summary.run_id);
    for (id, state) in &summary.outcomes {
        println!("  {id:<16} {state:?}");
    }
}
