use foo_controller::controller::{Controller, ControllerConfig, ExternalClients, Informer};
use foo_controller::crd::Foo;
use foo_controller::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{error, info};

/// Watch `namespace` if given, otherwise the whole cluster
fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Foo controller");

    let config = match ControllerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        workers = config.workers,
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        resync = ?config.resync_period,
        "Configuration loaded"
    );

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let health_port = config.health_port;
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            error!(error = %e, "Health server failed");
        }
    });

    let namespace = config.namespace.as_deref();
    let foo_informer = Informer::from_api(
        api_for::<Foo>(&client, namespace),
        config.resync_period,
    );
    let deployment_informer = Informer::from_api(
        api_for::<Deployment>(&client, namespace),
        config.resync_period,
    );

    let controller = Controller::new(
        ExternalClients::from_client(client),
        foo_informer,
        deployment_informer,
        &config,
    )
    .with_metrics(metrics)
    .with_readiness(readiness.clone());
    let mut controller_handle = tokio::spawn(controller.run(shutdown_signal));

    let result = tokio::select! {
        res = &mut controller_handle => res,
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Cannot listen for signals, shutting down"),
            }
            readiness.set_not_ready();
            shutdown_controller.shutdown();
            controller_handle.await
        }
    };

    health_handle.abort();

    match result {
        Ok(Ok(())) => {
            info!("Foo controller shut down gracefully");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Controller failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Controller task panicked");
            Err(e.into())
        }
    }
}
