/*
 * 5D Labs Agent Platform - Kubernetes Orchestrator for AI Coding Agents
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Orchestrator binary - runs the `Run`/`Workspace`/`Provider`/`NamespaceDefaults`
//! controllers side by side and serves `/health` and `/ready` for the cluster.

use axum::{routing::get, Json, Router};
use controller::config::TelemetryConfig;
use controller::reconcile::{namespace_defaults, provider, run, workspace};
use controller::{Context, ControllerConfig, NamespaceDefaults, Provider, Run, Workspace};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::controller::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Instrument, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(load_controller_config());
    init_tracing(&config.telemetry);

    info!(
        "Starting agent-run-operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());

    let ctx = Arc::new(Context {
        client: client.clone(),
        namespace: namespace.clone(),
        config: config.clone(),
    });

    let run_handle = tokio::spawn(run_reconcilers(ctx.clone()));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(60))),
        );

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("HTTP server listening on 0.0.0.0:8080");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    run_handle.abort();
    info!("agent-run-operator stopped");

    Ok(())
}

/// Starts the four reconcile loops and waits on all of them. They never
/// return under normal operation, so this only resolves on a bug (a panic
/// propagated through `try_join!`) or process shutdown aborting the task.
async fn run_reconcilers(ctx: Arc<Context>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Starting Run, Workspace, Provider and NamespaceDefaults controllers");

    let run_handle = tokio::spawn(run_run_controller(ctx.clone()));
    let workspace_handle = tokio::spawn(run_workspace_controller(ctx.clone()));
    let provider_handle = tokio::spawn(run_provider_controller(ctx.clone()));
    let namespace_defaults_handle = tokio::spawn(run_namespace_defaults_controller(ctx.clone()));

    let (run_result, workspace_result, provider_result, namespace_defaults_result) = tokio::try_join!(
        run_handle,
        workspace_handle,
        provider_handle,
        namespace_defaults_handle
    )?;
    run_result?;
    workspace_result?;
    provider_result?;
    namespace_defaults_result?;

    Ok(())
}

async fn run_run_controller(ctx: Arc<Context>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let runs: Api<Run> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let claims: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(runs, watcher_config.clone())
        .owns(jobs, watcher_config.clone())
        .owns(claims, watcher_config)
        .run(run::reconcile, run::error_policy, ctx)
        .for_each(|result| {
            let span = tracing::info_span!("run_reconciliation_result");
            async move {
                if let Err(e) = result {
                    error!(error = ?e, "Run reconciliation error");
                }
            }
            .instrument(span)
        })
        .await;

    info!("Run controller shutting down");
    Ok(())
}

async fn run_workspace_controller(ctx: Arc<Context>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let workspaces: Api<Workspace> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let claims: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(workspaces, watcher_config.clone())
        .owns(jobs, watcher_config.clone())
        .owns(claims, watcher_config)
        .run(workspace::reconcile, workspace::error_policy, ctx)
        .for_each(|result| {
            let span = tracing::info_span!("workspace_reconciliation_result");
            async move {
                if let Err(e) = result {
                    error!(error = ?e, "Workspace reconciliation error");
                }
            }
            .instrument(span)
        })
        .await;

    info!("Workspace controller shutting down");
    Ok(())
}

async fn run_provider_controller(ctx: Arc<Context>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let providers: Api<Provider> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(providers, watcher_config)
        .run(provider::reconcile, provider::error_policy, ctx)
        .for_each(|result| {
            let span = tracing::info_span!("provider_reconciliation_result");
            async move {
                if let Err(e) = result {
                    error!(error = ?e, "Provider reconciliation error");
                }
            }
            .instrument(span)
        })
        .await;

    info!("Provider controller shutting down");
    Ok(())
}

async fn run_namespace_defaults_controller(
    ctx: Arc<Context>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let defaults: Api<NamespaceDefaults> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(defaults, watcher_config)
        .run(
            namespace_defaults::reconcile,
            namespace_defaults::error_policy,
            ctx,
        )
        .for_each(|result| {
            let span = tracing::info_span!("namespace_defaults_reconciliation_result");
            async move {
                if let Err(e) = result {
                    error!(error = ?e, "NamespaceDefaults reconciliation error");
                }
            }
            .instrument(span)
        })
        .await;

    info!("NamespaceDefaults controller shutting down");
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "agent-run-operator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check() -> Json<Value> {
    Json(json!({
        "status": "ready",
        "service": "agent-run-operator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Sets up the `tracing` subscriber. When `telemetry.enabled` is unset this
/// is just `EnvFilter` + a format layer, matching the teacher's own
/// controller binary. When set, an OTLP span exporter is layered in on top
/// (the teacher's binary never flips this on, but carries the same
/// dependency for whichever deployment does).
fn init_tracing(telemetry: &TelemetryConfig) {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    if !telemetry.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return;
    }

    match build_otlp_layer(telemetry) {
        Ok(otel_layer) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(otel_layer)
                .init();
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            warn!("Failed to initialize OTLP exporter: {}. Continuing without it.", err);
        }
    }
}

fn build_otlp_layer(
    telemetry: &TelemetryConfig,
) -> Result<
    impl tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync,
    opentelemetry::trace::TraceError,
> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&telemetry.otlp_endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                "agent-run-operator",
            )]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

fn load_controller_config() -> ControllerConfig {
    let override_path = std::env::var("CONTROLLER_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or("/config/config.yaml");

    let config = match ControllerConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("Loaded controller configuration from {}", config_path);
            cfg
        }
        Err(err) => {
            warn!(
                "Failed to load configuration from {}: {}. Using defaults.",
                config_path, err
            );
            ControllerConfig::default()
        }
    };

    if let Err(err) = config.validate() {
        warn!("Configuration failed validation: {}. Using defaults.", err);
        return ControllerConfig::default();
    }

    config
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
