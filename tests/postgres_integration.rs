// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the PostgreSQL operator.
//!
//! These tests need a cluster with the CRDs installed, a `PostgresVersion`
//! named `9.6` and the operator running.
//!
//! Run with: cargo test --test postgres_integration -- --ignored

#![allow(clippy::items_after_statements)]

mod common;

use common::{cleanup_test_namespace, create_test_namespace, get_kube_client_or_skip, wait_for};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use postgres_operator::crd::{
    DatabasePhase, DormantDatabase, Postgres, PostgresSpec, StorageSpec, StorageType,
    TerminationPolicy,
};
use serde_json::json;
use std::time::Duration;

const VERSION: &str = "9.6";
const READY_TIMEOUT: Duration = Duration::from_secs(300);

fn quick_postgres(name: &str, namespace: &str, policy: TerminationPolicy) -> Postgres {
    let mut pg = Postgres::new(
        name,
        PostgresSpec {
            version: VERSION.to_string(),
            replicas: Some(1),
            storage_type: Some(StorageType::Durable),
            storage: Some(StorageSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                size: Some("50Mi".to_string()),
                ..Default::default()
            }),
            termination_policy: Some(policy),
            ..Default::default()
        },
    );
    pg.metadata.namespace = Some(namespace.to_string());
    pg
}

async fn wait_for_phase(api: &Api<Postgres>, name: &str, phase: DatabasePhase) -> bool {
    wait_for(READY_TIMEOUT, || async move {
        matches!(api.get_opt(name).await, Ok(Some(pg)) if pg.phase() == Some(phase))
    })
    .await
}

#[tokio::test]
#[ignore] // Run with: cargo test --test postgres_integration -- --ignored
async fn test_crds_installed() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let list = crds.list(&ListParams::default()).await.unwrap();
    let kinds: Vec<String> = list
        .items
        .iter()
        .filter(|crd| crd.spec.group.ends_with("kubedb.com"))
        .map(|crd| crd.spec.names.kind.clone())
        .collect();

    for expected in ["Postgres", "PostgresVersion", "DormantDatabase", "Snapshot"] {
        assert!(kinds.iter().any(|k| k == expected), "missing CRD {expected}");
    }
}

#[tokio::test]
#[ignore]
async fn test_create_reaches_running_with_generated_secret() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "pg-it-create";
    create_test_namespace(&client, namespace).await.unwrap();

    let api: Api<Postgres> = Api::namespaced(client.clone(), namespace);
    let pg = quick_postgres("quick-postgres", namespace, TerminationPolicy::WipeOut);
    api.create(&PostParams::default(), &pg).await.unwrap();

    assert!(
        wait_for_phase(&api, "quick-postgres", DatabasePhase::Running).await,
        "Postgres never reached Running"
    );

    let created = api.get("quick-postgres").await.unwrap();
    assert_eq!(created.auth_secret_name(), Some("quick-postgres-auth"));

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    assert!(secrets.get_opt("quick-postgres-auth").await.unwrap().is_some());

    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    assert!(services.get_opt("quick-postgres").await.unwrap().is_some());
    assert!(services.get_opt("quick-postgres-replicas").await.unwrap().is_some());

    api.delete("quick-postgres", &DeleteParams::default()).await.unwrap();
    cleanup_test_namespace(&client, namespace).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_halt_then_resume() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "pg-it-resume";
    create_test_namespace(&client, namespace).await.unwrap();

    let api: Api<Postgres> = Api::namespaced(client.clone(), namespace);
    let dormant: Api<DormantDatabase> = Api::namespaced(client.clone(), namespace);
    let (api, dormant) = (&api, &dormant);
    let pg = quick_postgres("halted-postgres", namespace, TerminationPolicy::Halt);
    api.create(&PostParams::default(), &pg).await.unwrap();
    assert!(wait_for_phase(api, "halted-postgres", DatabasePhase::Running).await);

    api.delete("halted-postgres", &DeleteParams::default()).await.unwrap();
    let paused = wait_for(READY_TIMEOUT, || async move {
        matches!(api.get_opt("halted-postgres").await, Ok(None))
            && matches!(dormant.get_opt("halted-postgres").await, Ok(Some(_)))
    })
    .await;
    assert!(paused, "Halt did not leave a DormantDatabase behind");

    // Resume through the dormant record.
    let patch = json!({ "spec": { "resume": true } });
    dormant
        .patch("halted-postgres", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .unwrap();

    assert!(
        wait_for_phase(api, "halted-postgres", DatabasePhase::Running).await,
        "resumed Postgres never reached Running"
    );
    let gone = wait_for(READY_TIMEOUT, || async move {
        matches!(dormant.get_opt("halted-postgres").await, Ok(None))
    })
    .await;
    assert!(gone, "DormantDatabase was not removed after resume");

    let patch = json!({ "spec": { "terminationPolicy": "WipeOut" } });
    api.patch("halted-postgres", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .unwrap();
    api.delete("halted-postgres", &DeleteParams::default()).await.unwrap();
    cleanup_test_namespace(&client, namespace).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_do_not_terminate_blocks_delete() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "pg-it-locked";
    create_test_namespace(&client, namespace).await.unwrap();

    let api: Api<Postgres> = Api::namespaced(client.clone(), namespace);
    let api = &api;
    let pg = quick_postgres("locked-postgres", namespace, TerminationPolicy::DoNotTerminate);
    api.create(&PostParams::default(), &pg).await.unwrap();
    assert!(wait_for_phase(api, "locked-postgres", DatabasePhase::Running).await);

    // Either the webhook denies the delete or the finalizer holds the object.
    let _ = api.delete("locked-postgres", &DeleteParams::default()).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(api.get_opt("locked-postgres").await.unwrap().is_some());

    let patch = json!({ "spec": { "terminationPolicy": "WipeOut" } });
    api.patch("locked-postgres", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .unwrap();
    api.delete("locked-postgres", &DeleteParams::default()).await.ok();
    let gone = wait_for(READY_TIMEOUT, || async move {
        matches!(api.get_opt("locked-postgres").await, Ok(None))
    })
    .await;
    assert!(gone, "Postgres was not released after switching to WipeOut");

    cleanup_test_namespace(&client, namespace).await.unwrap();
}
