use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use ringlog::{dump_continuous, dump_snapshot, DumpOptions, Error, Ringlogger, StampZone, Stopped};

/// Print the lines of a shared log region.
#[derive(Parser)]
#[command(name = "ringlog-dump")]
struct DumpCommand {
    /// Path of the region, usually a file on a tmpfs.
    ///
    /// Without a path or another source the region passed by the service manager as
    /// `RINGLOG_FD` is used.
    region: Option<PathBuf>,

    /// A descriptor token inherited from the process that created the region.
    #[arg(long, conflicts_with_all = ["region", "handle_env", "listen"])]
    handle: Option<String>,

    /// Read the descriptor token from this environment variable.
    #[arg(long, value_name = "VAR", conflicts_with_all = ["region", "listen"])]
    handle_env: Option<String>,

    /// Use the descriptor passed under this name by the service manager.
    #[arg(long, value_name = "NAME", conflicts_with = "region")]
    listen: Option<String>,

    /// Keep printing new lines until interrupted.
    #[arg(short, long)]
    follow: bool,

    /// Print timestamps in local time instead of UTC.
    #[arg(long)]
    local_time: bool,
}

const TAG: &str = "DMP";
const LISTEN_NAME: &str = "RINGLOG_FD";

fn main() -> ExitCode {
    let command = DumpCommand::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("ringlog-dump: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: DumpCommand) -> Result<(), Error> {
    // Safety: the tokens are handed to us for exactly this purpose, nothing else in this process
    // takes ownership of the descriptors.
    let logger = if let Some(path) = &command.region {
        Ringlogger::open(path, TAG)?
    } else if let Some(token) = &command.handle {
        unsafe { Ringlogger::attach(token, TAG)? }
    } else if let Some(var) = &command.handle_env {
        unsafe { Ringlogger::attach_env(var, TAG)? }
    } else {
        let name = command.listen.as_deref().unwrap_or(LISTEN_NAME);
        unsafe { Ringlogger::attach_listen(name, TAG)? }
    };

    let options = DumpOptions {
        zone: if command.local_time {
            StampZone::Local
        } else {
            StampZone::Utc
        },
        ..DumpOptions::default()
    };

    let stdout = std::io::stdout();
    let mut sink = stdout.lock();

    if !command.follow {
        dump_snapshot(&logger, &mut sink, &options)?;
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(%err, "could not install the interrupt handler");
    }

    match dump_continuous(&logger, &mut sink, &cancel, &options)? {
        Stopped::Cancelled => tracing::debug!("interrupted"),
        Stopped::SinkClosed => tracing::debug!("stdout closed"),
    }

    Ok(())
}
