//! passabot binary entry point.

use std::process::ExitCode;

use passabot::booking::BookingClient;
use passabot::cli::{self, Args};
use passabot::config::Config;
use passabot::notify::TelegramNotifier;
use passabot::scheduler::PollScheduler;
use passabot::session::{IdentityBackend, PosteIdBackend, SessionManager, StaticBackend};
use passabot::logging;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage information");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> passabot::Result<()> {
    let config = Config::load(&args).map_err(|e| {
        eprintln!("error: {}", e);
        passabot::PassabotError::from(e)
    })?;

    if let Err(e) = logging::init_with_level(config.log_filter()) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    info!("passabot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        province = %config.booking.province,
        interval_secs = config.polling.interval_secs,
        "Starting availability watch"
    );

    let backend: Box<dyn IdentityBackend> = match config.static_session() {
        Some((session_id, csrf_token)) => {
            info!("Using pre-obtained session, SPID login disabled");
            Box::new(StaticBackend::new(session_id, csrf_token))
        }
        None => Box::new(PosteIdBackend::new(config.posteid_settings())?),
    };

    let sessions = SessionManager::new(backend, config.credentials()?)
        .with_approval_timeout(config.approval_timeout())
        .with_approval_poll(config.approval_poll());
    let checker = BookingClient::new(config.booking_settings())?;
    let notifier = TelegramNotifier::new(config.telegram.bot_token.clone(), config.request_timeout())?
        .with_api_url(config.telegram.api_url.clone());

    let mut scheduler = PollScheduler::new(sessions, checker, notifier, config.data_chat())
        .with_settings(config.poll_settings())
        .with_control_chat(config.control_chat());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await?;

    info!("passabot stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
