//! Process entry point (spec §6 "Exit codes"): load configuration, load
//! the VAD model, bind the operator REST surface, and drain in-flight
//! calls on SIGINT/SIGTERM/SIGQUIT/SIGABRT before exiting.
//!
//! Grounded on the teacher's `server/src/main.rs` shape — load settings,
//! init tracing, init metrics, build the router, serve with graceful
//! shutdown — narrowed to this bridge's collaborators.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callbridge_config::load_settings;
use callbridge_media::CallEvents;
use callbridge_server::{create_router, ensure_vad_model, init_metrics, AppState, CallEventHandler};
use callbridge_vad::VadEngine;

#[tokio::main]
async fn main() {
    init_tracing();

    let settings = match load_settings() {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            tracing::error!(error = %e, "fatal: failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = ensure_vad_model(&settings).await {
        tracing::error!(error = %e, "fatal: failed to provision vad model");
        std::process::exit(1);
    }

    let vad_engine = match VadEngine::load(&settings.vad_model_path) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "fatal: failed to load vad model");
            std::process::exit(1);
        }
    };

    let metrics_handle = init_metrics();

    let state = match AppState::new(settings.clone(), vad_engine, metrics_handle) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "fatal: failed to build application state");
            std::process::exit(1);
        }
    };

    let registry = state.registry.clone();

    // The incoming-call/RTP-frame glue (spec §9 "rewrite native
    // callbacks"). A real SIP driver calls `on_incoming_call`/
    // `on_frame_received` on this as its own events arrive; wiring one up
    // is out of scope here (spec §1 Non-goals: no SIP stack
    // reimplementation).
    let _call_events: Arc<dyn CallEvents> = Arc::new(CallEventHandler::new(state.clone()));

    let app = create_router(state);

    let addr = format!("{}:{}", settings.server_host, settings.server_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "fatal: failed to bind operator REST listener");
            std::process::exit(1);
        }
    };
    tracing::info!(address = %addr, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }

    drain_all_calls(&registry).await;
    tracing::info!("shutdown complete");
}

/// Wait for SIGINT/SIGTERM/SIGQUIT/SIGABRT (spec §6 "Exit codes").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
        // SIGABRT has no named `SignalKind` constructor; 6 is its signal number on Linux.
        let mut abort = signal(SignalKind::from_raw(6)).expect("failed to install SIGABRT handler");
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = quit.recv() => tracing::info!("received SIGQUIT"),
            _ = abort.recv() => tracing::info!("received SIGABRT"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, draining in-flight calls"),
        _ = terminate => tracing::info!("draining in-flight calls"),
    }
}

/// Tear down every live call's backend session before exit (spec §3
/// "Lifecycle" close path; spec §6 drains in-flight calls on shutdown).
async fn drain_all_calls(registry: &callbridge_server::CallRegistry) {
    let calls = registry.snapshot();
    tracing::info!(count = calls.len(), "draining in-flight calls");
    let closes = calls.into_iter().map(|engine| async move {
        engine.close_session("shutdown").await;
    });
    futures::future::join_all(closes).await;
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "callbridge=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
