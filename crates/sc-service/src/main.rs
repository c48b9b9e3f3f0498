//! Signaling Coordinator
//!
//! Real-time signaling server for live classroom sessions.
//!
//! # Servers
//!
//! - WebSocket server for client signaling (default: 0.0.0.0:8080)
//! - HTTP server for health, metrics and introspection (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus metrics recorder
//! 3. Build the LMS collaborator clients and the credential verifier
//! 4. Start the attendance dispatcher
//! 5. Create the session registry
//! 6. Start the health server, then the signaling server
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sc_service::actors::{ActorMetrics, SessionRegistry};
use sc_service::auth::admission::Admission;
use sc_service::auth::jwt::JwtCredentialVerifier;
use sc_service::config::{Config, LogFormat};
use sc_service::observability::{health_router, init_metrics_recorder, HealthState};
use sc_service::services::access::HttpAccessClient;
use sc_service::services::attendance::HttpAttendanceClient;
use sc_service::services::LmsEndpoint;
use sc_service::tasks::{AttendanceDispatcher, AttendanceDispatcherConfig};
use sc_service::transport::{introspection_router, signaling_router, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Deadline for each session actor during shutdown.
const SESSION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for draining the attendance queue during shutdown.
const ATTENDANCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: the log format comes from it
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    info!("Starting Signaling Coordinator");
    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        lms_api_url = %config.lms_api_url,
        auth_timeout_seconds = config.auth_timeout_seconds,
        connection_buffer = config.connection_buffer,
        attendance_queue_capacity = config.attendance_queue_capacity,
        "Configuration loaded successfully"
    );

    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    // LMS collaborators
    let lms = LmsEndpoint::new(
        &config.lms_api_url,
        config.lms_service_token.clone(),
        config.lms_timeout(),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to configure LMS client");
        e
    })?;
    let access = Arc::new(HttpAccessClient::new(lms.clone()));
    let attendance_recorder = Arc::new(HttpAttendanceClient::new(lms));

    let verifier = Arc::new(JwtCredentialVerifier::new(
        &config.jwt_secret,
        config.jwt_clock_skew,
    ));
    let admission = Admission::new(verifier, config.auth_timeout());

    // The attendance worker outlives the registry so leave events from
    // shutdown are still delivered.
    let attendance_token = CancellationToken::new();
    let (attendance, attendance_task) = AttendanceDispatcher::start(
        attendance_recorder,
        AttendanceDispatcherConfig {
            queue_capacity: config.attendance_queue_capacity,
            max_attempts: config.attendance_max_attempts,
            ..AttendanceDispatcherConfig::default()
        },
        attendance_token.clone(),
    );

    info!("Initializing actor system...");
    let root_token = CancellationToken::new();
    let registry = SessionRegistry::new(
        access,
        attendance,
        ActorMetrics::new(),
        root_token.clone(),
    );
    info!("Actor system initialized");

    let server_token = CancellationToken::new();

    // Health, metrics and introspection server
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .merge(introspection_router(registry.clone()));

    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = server_token.child_token();
    let health_task = tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Signaling server
    let signaling_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let signaling_app = signaling_router(AppState {
        registry: registry.clone(),
        admission,
        connection_buffer: config.connection_buffer,
    });

    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;
    info!(addr = %signaling_addr, "Signaling server bound successfully");

    let signaling_shutdown_token = server_token.child_token();
    let signaling_task = tokio::spawn(async move {
        let server = axum::serve(signaling_listener, signaling_app).with_graceful_shutdown(
            async move {
                signaling_shutdown_token.cancelled().await;
                info!("Signaling server shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!("Signaling Coordinator running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    // Closing the registry first ends every open socket, which lets the
    // signaling server's graceful shutdown complete.
    registry.shutdown(SESSION_SHUTDOWN_TIMEOUT).await;
    server_token.cancel();

    if let Err(e) = signaling_task.await {
        warn!(error = ?e, "Signaling server task failed");
    }
    if let Err(e) = health_task.await {
        warn!(error = ?e, "Health server task failed");
    }

    info!("Draining attendance queue...");
    attendance_token.cancel();
    match tokio::time::timeout(ATTENDANCE_DRAIN_TIMEOUT, attendance_task).await {
        Ok(Ok(())) => info!("Attendance queue drained"),
        Ok(Err(e)) => warn!(error = ?e, "Attendance worker failed"),
        Err(_) => warn!("Attendance drain timed out, remaining events dropped"),
    }

    info!("Signaling Coordinator shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sc_service=info,sc=info,tower_http=info".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the
/// service cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
