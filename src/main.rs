//! `skronk` - time-boxed penalty role bot

use clap::Parser;
use tokio_util::sync::CancellationToken;

use skronk::cli::args::Cli;
use skronk::cli::commands;
use skronk::error::ExitCode;
use skronk::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match commands::dispatch(cli, cancel).await {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First SIGINT/SIGTERM cancels `cancel`; a second one exits immediately.
async fn shutdown_on_signal(cancel: CancellationToken) {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                None
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = recv_sigterm(sigterm.as_mut()) => {}
    }

    eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
    cancel.cancel();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
        () = recv_sigterm(sigterm.as_mut()) => std::process::exit(ExitCode::TERMINATED),
    }
}

async fn recv_sigterm(sigterm: Option<&mut tokio::signal::unix::Signal>) {
    match sigterm {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}
