// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use postgres_operator::{
    admission::{run_webhook_server, KubeLookup, PostgresValidator},
    config::OperatorConfig,
    constants::{
        ERROR_REQUEUE_DURATION_SECS, KIND_DORMANT_DATABASE, KIND_POSTGRES, PENDING_REQUEUE_SECS,
        RUNNING_REQUEUE_SECS, TOKIO_WORKER_THREADS,
    },
    context::{Context, Stores},
    crd::{DatabasePhase, DormantDatabase, Postgres},
    health::{HealthEvaluator, HealthScheduler, KubeHealthStore},
    metrics::{
        record_reconciliation_error, record_reconciliation_requeue, record_reconciliation_success,
    },
    postgres::{certs::CertStore, probe::PgSessionFactory, PostgresProber},
    reconcilers::{
        backup::{CronJobScheduler, KubeJobRunner},
        reconcile_dormant_database, reconcile_postgres,
    },
    server::{run_metrics_server, Readiness},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("postgres-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

fn init_logging() {
    // RUST_LOG selects levels (default info); RUST_LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    init_logging();
    info!("Starting PostgreSQL operator");
    debug!(?config, "Configuration loaded");

    // The webhook server and the probe TLS both build rustls configs; pick one provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = Arc::new(config);
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized");

    let postgres_controller = Controller::new(Api::<Postgres>::all(client.clone()), Config::default())
        .owns(Api::<StatefulSet>::all(client.clone()), Config::default());
    let dormant_controller =
        Controller::new(Api::<DormantDatabase>::all(client.clone()), Config::default());

    let stores = Stores {
        postgreses: postgres_controller.store(),
        dormant_databases: dormant_controller.store(),
    };

    let ctx = Arc::new(Context {
        client: client.clone(),
        config: config.clone(),
        stores: stores.clone(),
        backups: Arc::new(CronJobScheduler::new(client.clone(), config.clone())),
        jobs: Arc::new(KubeJobRunner::new(client.clone(), config.clone())),
    });

    let readiness = Arc::new(Readiness::default());

    let (stop_health, stop_rx) = watch::channel(false);
    let health_task = if config.enable_health_checker {
        let certs = Arc::new(CertStore::new(config.cert_dir.clone()));
        let prober = Arc::new(PostgresProber::new(
            client.clone(),
            certs,
            Arc::new(PgSessionFactory),
        ));
        let store = Arc::new(KubeHealthStore::new(
            client.clone(),
            config.clone(),
            stores.postgreses.clone(),
        ));
        let evaluator = Arc::new(HealthEvaluator::new(
            store,
            prober,
            config.governing_service.clone(),
        ));
        let scheduler = HealthScheduler::new(evaluator, config.readiness_probe_interval());
        Some(tokio::spawn(scheduler.run(stop_rx)))
    } else {
        info!("Database health checker disabled");
        None
    };

    let webhook = {
        let config = config.clone();
        let client = client.clone();
        async move {
            if !config.enable_webhook {
                info!("Admission webhook disabled");
                return std::future::pending().await;
            }
            let validator = Arc::new(PostgresValidator::new(config.immutable_spec_fields.clone()));
            validator
                .initialize(Arc::new(KubeLookup::new(client)))
                .await;
            run_webhook_server(validator, config.webhook_port, &config.webhook_cert, &config.webhook_key)
                .await
        }
    };

    info!("Starting controllers");
    readiness.set_ready(true);

    // Controllers and servers should never exit on their own.
    let outcome = tokio::select! {
        () = run_postgres_controller(postgres_controller, ctx.clone()) => {
            error!("CRITICAL: Postgres controller exited unexpectedly");
            Err(anyhow::anyhow!("Postgres controller exited unexpectedly"))
        }
        () = run_dormant_controller(dormant_controller, ctx.clone()) => {
            error!("CRITICAL: DormantDatabase controller exited unexpectedly");
            Err(anyhow::anyhow!("DormantDatabase controller exited unexpectedly"))
        }
        result = run_metrics_server(readiness.clone(), config.metrics_port) => {
            error!("CRITICAL: metrics server exited: {:?}", result);
            result.map_err(anyhow::Error::from)
        }
        result = webhook => {
            error!("CRITICAL: admission webhook exited: {:?}", result);
            result.map_err(anyhow::Error::from)
        }
        () = shutdown_signal() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    readiness.set_ready(false);
    if stop_health.send(true).is_err() {
        debug!("Health checker already stopped");
    }
    if let Some(task) = health_task {
        if let Err(e) = task.await {
            warn!("Health checker task failed: {}", e);
        }
    }

    info!("PostgreSQL operator stopped");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Run the `Postgres` controller
async fn run_postgres_controller(controller: Controller<Postgres>, ctx: Arc<Context>) {
    info!("Starting Postgres controller");

    controller
        .run(reconcile_postgres_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;
}

/// Run the `DormantDatabase` controller
async fn run_dormant_controller(controller: Controller<DormantDatabase>, ctx: Arc<Context>) {
    info!("Starting DormantDatabase controller");

    controller
        .run(reconcile_dormant_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;
}

/// Reconcile wrapper for `Postgres`
async fn reconcile_postgres_wrapper(
    pg: Arc<Postgres>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    debug!(
        name = %pg.name_any(),
        namespace = ?pg.namespace(),
        "Reconcile wrapper called for Postgres"
    );

    match reconcile_postgres(ctx, (*pg).clone()).await {
        Ok(()) => {
            record_reconciliation_success(KIND_POSTGRES, start.elapsed());

            let settled = matches!(
                pg.phase(),
                Some(DatabasePhase::Running | DatabasePhase::Failed)
            );
            if settled {
                Ok(Action::requeue(Duration::from_secs(RUNNING_REQUEUE_SECS)))
            } else {
                record_reconciliation_requeue(KIND_POSTGRES, "provisioning");
                Ok(Action::requeue(Duration::from_secs(PENDING_REQUEUE_SECS)))
            }
        }
        Err(e) => {
            record_reconciliation_error(KIND_POSTGRES, start.elapsed());
            error!("Failed to reconcile Postgres {}: {:#}", pg.name_any(), e);
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `DormantDatabase`
async fn reconcile_dormant_wrapper(
    dd: Arc<DormantDatabase>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    match reconcile_dormant_database(ctx, (*dd).clone()).await {
        Ok(()) => {
            record_reconciliation_success(KIND_DORMANT_DATABASE, start.elapsed());
            Ok(Action::requeue(Duration::from_secs(RUNNING_REQUEUE_SECS)))
        }
        Err(e) => {
            record_reconciliation_error(KIND_DORMANT_DATABASE, start.elapsed());
            error!("Failed to reconcile DormantDatabase {}: {:#}", dd.name_any(), e);
            Err(e.into())
        }
    }
}

/// Error policy for both controllers
fn error_policy(
    _resource: Arc<impl std::fmt::Debug>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
