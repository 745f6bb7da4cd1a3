// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PostgreSQL Kubernetes resource builders
//!
//! This module builds every object the operator creates for a `Postgres`:
//! services, RBAC, the `StatefulSet`, the `PodDisruptionBudget`, the generated auth
//! secret and the backup/restore jobs. All functions are pure and easily testable.
//!
//! Every offshoot object carries the `kubedb.com/kind` + `kubedb.com/name` labels
//! so that halt and wipe-out can find it again by selector.

use crate::constants::{
    API_GROUP_VERSION, AUTH_SECRET_SUFFIX, BACKUP_CRONJOB_SUFFIX, EXPORTER_PORT,
    EXPORTER_PORT_NAME, GENERATED_PASSWORD_LENGTH, KIND_POSTGRES, LEADER_LOCK_SUFFIX,
    POSTGRES_CONTAINER_PORT_NAME, POSTGRES_DEFAULT_USER, POSTGRES_PORT, POSTGRES_PORT_NAME,
    REPLICAS_SERVICE_SUFFIX, RESTORE_JOB_SUFFIX, SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME,
    STATS_SERVICE_SUFFIX,
};
use crate::crd::{
    BackupScheduleSpec, Postgres, PostgresVersion, ScriptSourceSpec, Snapshot, StorageType,
};
use crate::labels::{offshoot_labels, K8S_MANAGED_BY, LABEL_ROLE, MANAGED_BY_KUBEDB};
use k8s_openapi::api::{
    apps::v1::{StatefulSet, StatefulSetSpec},
    batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec},
    core::v1::{
        ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
        EnvVarSource, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
        PodTemplateSpec, SecretKeySelector, SecretVolumeSource, Service, ServiceAccount,
        ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
    },
    policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject},
};
use k8s_openapi::apimachinery::pkg::{
    api::resource::Quantity,
    apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
    util::intstr::IntOrString,
};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;

pub const CONTAINER_NAME_POSTGRES: &str = "postgres";
pub const CONTAINER_NAME_EXPORTER: &str = "exporter";

// Volume names and mount points inside the database pod
const VOLUME_DATA: &str = "data";
const VOLUME_SERVER_CERT: &str = "server-cert";
const VOLUME_CLIENT_CERT: &str = "client-cert";
const VOLUME_INIT_SCRIPT: &str = "initial-script";
const VOLUME_OSM_CONFIG: &str = "osmconfig";
const DATA_MOUNT_PATH: &str = "/var/pv";
const SERVER_CERT_MOUNT_PATH: &str = "/tls/certs/server";
const CLIENT_CERT_MOUNT_PATH: &str = "/tls/certs/client";
const INIT_SCRIPT_MOUNT_PATH: &str = "/var/initdb";
const OSM_CONFIG_MOUNT_PATH: &str = "/etc/osm";

const ROLE_PRIMARY: &str = "primary";
const ROLE_REPLICA: &str = "replica";

/// Job label distinguishing backup and restore jobs
pub const LABEL_JOB_TYPE: &str = "kubedb.com/job-type";
const JOB_TYPE_RESTORE: &str = "restore";
const JOB_TYPE_BACKUP: &str = "backup";

/// Builds owner references for a resource owned by a `Postgres`.
///
/// Sets up cascade deletion so that deleting the `Postgres` object collects its
/// offshoots once the finalizer has run.
#[must_use]
pub fn build_owner_references(pg: &Postgres) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_POSTGRES.to_string(),
        name: pg.name_any(),
        uid: pg.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

/// Labels stamped on every offshoot object of `pg`.
#[must_use]
pub fn build_labels(pg: &Postgres) -> BTreeMap<String, String> {
    offshoot_labels(KIND_POSTGRES, &pg.name_any())
}

fn offshoot_meta(pg: &Postgres, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: pg.namespace(),
        labels: Some(build_labels(pg)),
        owner_references: Some(build_owner_references(pg)),
        ..Default::default()
    }
}

fn selector_with_role(pg: &Postgres, role: &str) -> BTreeMap<String, String> {
    let mut selector = pg.offshoot_selectors();
    selector.insert(LABEL_ROLE.to_string(), role.to_string());
    selector
}

#[must_use]
pub fn default_auth_secret_name(pg: &Postgres) -> String {
    format!("{}-{AUTH_SECRET_SUFFIX}", pg.name_any())
}

/// Auth secret referenced by the spec, or the name a generated one would get.
#[must_use]
pub fn auth_secret_name(pg: &Postgres) -> String {
    pg.auth_secret_name()
        .map_or_else(|| default_auth_secret_name(pg), str::to_string)
}

#[must_use]
pub fn replicas_service_name(pg: &Postgres) -> String {
    format!("{}-{REPLICAS_SERVICE_SUFFIX}", pg.name_any())
}

#[must_use]
pub fn stats_service_name(pg: &Postgres) -> String {
    format!("{}-{STATS_SERVICE_SUFFIX}", pg.name_any())
}

#[must_use]
pub fn leader_lock_name(pg: &Postgres) -> String {
    format!("{}-{LEADER_LOCK_SUFFIX}", pg.name_any())
}

#[must_use]
pub fn backup_cronjob_name(pg: &Postgres) -> String {
    format!("{}-{BACKUP_CRONJOB_SUFFIX}", pg.name_any())
}

#[must_use]
pub fn restore_job_name(pg: &Postgres, snapshot: &str) -> String {
    format!("{}-{RESTORE_JOB_SUFFIX}-{snapshot}", pg.name_any())
}

// ============================================================================
// Services
// ============================================================================

/// Builds the headless governing service giving database pods stable DNS names.
///
/// The service is shared by every database in the namespace, so it carries no
/// owner reference and selects on the management label only.
#[must_use]
pub fn build_governing_service(name: &str, namespace: &str) -> Service {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_KUBEDB.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRES_CONTAINER_PORT_NAME.to_string()),
                port: i32::from(POSTGRES_PORT),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn database_service(pg: &Postgres, name: String, role: &str) -> Service {
    Service {
        metadata: offshoot_meta(pg, name),
        spec: Some(ServiceSpec {
            selector: Some(selector_with_role(pg, role)),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRES_PORT_NAME.to_string()),
                port: i32::from(POSTGRES_PORT),
                target_port: Some(IntOrString::String(
                    POSTGRES_CONTAINER_PORT_NAME.to_string(),
                )),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the primary service `<name>`, selecting the pod labeled `kubedb.com/role=primary`.
#[must_use]
pub fn build_primary_service(pg: &Postgres) -> Service {
    database_service(pg, pg.name_any(), ROLE_PRIMARY)
}

/// Builds `<name>-replicas`, selecting the standby pods.
#[must_use]
pub fn build_replicas_service(pg: &Postgres) -> Service {
    database_service(pg, replicas_service_name(pg), ROLE_REPLICA)
}

/// Builds `<name>-stats`, exposing the exporter sidecar to Prometheus.
#[must_use]
pub fn build_stats_service(pg: &Postgres, annotations: BTreeMap<String, String>) -> Service {
    let port = exporter_port(pg);
    let mut metadata = offshoot_meta(pg, stats_service_name(pg));
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(pg.offshoot_selectors()),
            ports: Some(vec![ServicePort {
                name: Some(EXPORTER_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::String(EXPORTER_PORT_NAME.to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Exporter port from the monitor spec, or the builtin default.
#[must_use]
pub fn exporter_port(pg: &Postgres) -> i32 {
    pg.spec
        .monitor
        .as_ref()
        .and_then(|m| m.prometheus.as_ref())
        .and_then(|p| p.port)
        .unwrap_or(EXPORTER_PORT)
}

// ============================================================================
// RBAC
// ============================================================================

#[must_use]
pub fn build_service_account(pg: &Postgres) -> ServiceAccount {
    ServiceAccount {
        metadata: offshoot_meta(pg, pg.name_any()),
        ..Default::default()
    }
}

/// Builds the role the database pods run with.
///
/// Pods patch their own role label during failover and hold a ConfigMap lock
/// for leader election.
#[must_use]
pub fn build_role(pg: &Postgres) -> Role {
    let name = pg.name_any();
    Role {
        metadata: offshoot_meta(pg, name.clone()),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["apps".to_string()]),
                resources: Some(vec!["statefulsets".to_string()]),
                verbs: vec!["get".to_string()],
                resource_names: Some(vec![name]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec!["list".to_string(), "patch".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["configmaps".to_string()]),
                verbs: vec!["create".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["configmaps".to_string()]),
                verbs: vec!["get".to_string(), "update".to_string()],
                resource_names: Some(vec![leader_lock_name(pg)]),
                ..Default::default()
            },
        ]),
    }
}

#[must_use]
pub fn build_role_binding(pg: &Postgres) -> RoleBinding {
    let name = pg.name_any();
    RoleBinding {
        metadata: offshoot_meta(pg, name.clone()),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: pg.namespace(),
            ..Default::default()
        }]),
    }
}

// ============================================================================
// StatefulSet
// ============================================================================

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn build_postgres_env(pg: &Postgres) -> Vec<EnvVar> {
    let secret = auth_secret_name(pg);
    let mut env = vec![
        secret_env("POSTGRES_USER", &secret, SECRET_KEY_USERNAME),
        secret_env("POSTGRES_PASSWORD", &secret, SECRET_KEY_PASSWORD),
        plain_env("NAMESPACE", pg.namespace().unwrap_or_default()),
        plain_env("PRIMARY_HOST", pg.name_any()),
        plain_env("SSL_MODE", pg.spec.ssl_mode().to_string()),
        plain_env(
            "CLIENT_AUTH_MODE",
            format!("{:?}", pg.spec.client_auth_mode()).to_lowercase(),
        ),
    ];

    if let Some(standby) = pg.spec.standby_mode {
        env.push(plain_env("STANDBY", format!("{standby:?}").to_lowercase()));
    }
    if let Some(streaming) = pg.spec.streaming_mode {
        env.push(plain_env("STREAMING", format!("{streaming:?}").to_lowercase()));
    }
    if let Some(election) = &pg.spec.leader_election {
        if let Some(lease) = election.lease_duration_seconds {
            env.push(plain_env("LEASE_DURATION", lease.to_string()));
        }
        env.push(plain_env("ELECTION_TICK", election.election_tick.to_string()));
        env.push(plain_env("HEARTBEAT_TICK", election.heartbeat_tick.to_string()));
    }
    if let Some(template) = &pg.spec.pod_template {
        env.extend(template.env.iter().cloned());
    }
    env
}

fn build_volumes(pg: &Postgres) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = Vec::new();
    let mut mounts = vec![VolumeMount {
        name: VOLUME_DATA.to_string(),
        mount_path: DATA_MOUNT_PATH.to_string(),
        ..Default::default()
    }];

    if pg.spec.storage_type == Some(StorageType::Ephemeral) {
        volumes.push(Volume {
            name: VOLUME_DATA.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    if pg.spec.tls.is_some() {
        volumes.push(secret_volume(VOLUME_SERVER_CERT, pg.server_cert_secret_name()));
        mounts.push(read_only_mount(VOLUME_SERVER_CERT, SERVER_CERT_MOUNT_PATH));
        volumes.push(secret_volume(VOLUME_CLIENT_CERT, pg.client_cert_secret_name()));
        mounts.push(read_only_mount(VOLUME_CLIENT_CERT, CLIENT_CERT_MOUNT_PATH));
    }

    if let Some(script) = pg.spec.init.as_ref().and_then(|i| i.script_source.as_ref()) {
        volumes.push(init_script_volume(script));
        mounts.push(VolumeMount {
            name: VOLUME_INIT_SCRIPT.to_string(),
            mount_path: INIT_SCRIPT_MOUNT_PATH.to_string(),
            sub_path: script.script_path.clone(),
            ..Default::default()
        });
    }

    (volumes, mounts)
}

fn secret_volume(name: &str, secret: String) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret),
            default_mode: Some(0o600),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn init_script_volume(script: &ScriptSourceSpec) -> Volume {
    Volume {
        name: VOLUME_INIT_SCRIPT.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: script.config_map.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_claim_template(pg: &Postgres) -> Option<PersistentVolumeClaim> {
    if pg.spec.storage_type == Some(StorageType::Ephemeral) {
        return None;
    }
    let storage = pg.spec.storage.as_ref()?;

    let requests = storage
        .size
        .as_ref()
        .map(|size| BTreeMap::from([("storage".to_string(), Quantity(size.clone()))]));
    let access_modes = if storage.access_modes.is_empty() {
        vec!["ReadWriteOnce".to_string()]
    } else {
        storage.access_modes.clone()
    };

    Some(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(VOLUME_DATA.to_string()),
            labels: Some(build_labels(pg)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests,
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_exporter_container(pg: &Postgres, image: &str) -> Container {
    let secret = auth_secret_name(pg);
    let port = exporter_port(pg);
    Container {
        name: CONTAINER_NAME_EXPORTER.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec![format!("--web.listen-address=:{port}")]),
        env: Some(vec![
            plain_env(
                "DATA_SOURCE_URI",
                format!("localhost:{POSTGRES_PORT}/postgres?sslmode=disable"),
            ),
            secret_env("DATA_SOURCE_USER", &secret, SECRET_KEY_USERNAME),
            secret_env("DATA_SOURCE_PASS", &secret, SECRET_KEY_PASSWORD),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(EXPORTER_PORT_NAME.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Builds the `StatefulSet` running the database.
///
/// # Arguments
///
/// * `pg` - The `Postgres` being provisioned
/// * `version` - Catalog entry resolving `spec.version` to images
/// * `governing_service` - Headless service name used as `serviceName`
/// * `fallback_exporter_image` - Used when the catalog names no exporter image
///
/// The exporter sidecar is only added when `spec.monitor` is set.
#[must_use]
pub fn build_statefulset(
    pg: &Postgres,
    version: &PostgresVersion,
    governing_service: &str,
    fallback_exporter_image: &str,
) -> StatefulSet {
    let labels = build_labels(pg);
    let (volumes, volume_mounts) = build_volumes(pg);
    let template = pg.spec.pod_template.as_ref();

    let mut containers = vec![Container {
        name: CONTAINER_NAME_POSTGRES.to_string(),
        image: Some(version.spec.db_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(build_postgres_env(pg)),
        ports: Some(vec![ContainerPort {
            name: Some(POSTGRES_CONTAINER_PORT_NAME.to_string()),
            container_port: i32::from(POSTGRES_PORT),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(volume_mounts),
        resources: template.and_then(|t| t.resources.clone()),
        ..Default::default()
    }];

    if pg.spec.monitor.is_some() {
        let image = version
            .spec
            .exporter_image
            .as_deref()
            .unwrap_or(fallback_exporter_image);
        containers.push(build_exporter_container(pg, image));
    }

    StatefulSet {
        metadata: offshoot_meta(pg, pg.name_any()),
        spec: Some(StatefulSetSpec {
            replicas: Some(pg.spec.replicas()),
            service_name: Some(governing_service.to_string()),
            selector: LabelSelector {
                match_labels: Some(pg.offshoot_selectors()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(pg.name_any()),
                    containers,
                    volumes: if volumes.is_empty() { None } else { Some(volumes) },
                    node_selector: template.and_then(|t| t.node_selector.clone()),
                    ..Default::default()
                }),
            },
            volume_claim_templates: build_claim_template(pg).map(|claim| vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds a `PodDisruptionBudget` allowing one member down at a time.
///
/// Standalone instances get none.
#[must_use]
pub fn build_pdb(pg: &Postgres) -> Option<PodDisruptionBudget> {
    if pg.spec.replicas() <= 1 {
        return None;
    }
    Some(PodDisruptionBudget {
        metadata: offshoot_meta(pg, pg.name_any()),
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(1)),
            selector: Some(LabelSelector {
                match_labels: Some(pg.offshoot_selectors()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Secrets
// ============================================================================

/// Random alphanumeric password for generated auth secrets.
#[must_use]
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Builds the generated `<name>-auth` secret.
///
/// The secret is labeled as KubeDB-managed so a wipe-out may delete it, but it
/// carries no owner reference: halting the database must not collect it.
#[must_use]
pub fn build_auth_secret(pg: &Postgres, password: &str) -> k8s_openapi::api::core::v1::Secret {
    let mut data = BTreeMap::new();
    data.insert(
        SECRET_KEY_USERNAME.to_string(),
        ByteString(POSTGRES_DEFAULT_USER.as_bytes().to_vec()),
    );
    data.insert(
        SECRET_KEY_PASSWORD.to_string(),
        ByteString(password.as_bytes().to_vec()),
    );

    k8s_openapi::api::core::v1::Secret {
        metadata: ObjectMeta {
            name: Some(default_auth_secret_name(pg)),
            namespace: pg.namespace(),
            labels: Some(build_labels(pg)),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

// ============================================================================
// Backup and restore jobs
// ============================================================================

fn job_labels(pg: &Postgres, job_type: &str) -> BTreeMap<String, String> {
    let mut labels = build_labels(pg);
    labels.insert(LABEL_JOB_TYPE.to_string(), job_type.to_string());
    labels
}

fn osm_volume(storage_secret: &str) -> Volume {
    secret_volume(VOLUME_OSM_CONFIG, storage_secret.to_string())
}

fn tools_container(
    pg: &Postgres,
    name: &str,
    image: &str,
    args: Vec<String>,
) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(args),
        env: Some(vec![
            secret_env("PGUSER", &auth_secret_name(pg), SECRET_KEY_USERNAME),
            secret_env("PGPASSWORD", &auth_secret_name(pg), SECRET_KEY_PASSWORD),
        ]),
        volume_mounts: Some(vec![read_only_mount(VOLUME_OSM_CONFIG, OSM_CONFIG_MOUNT_PATH)]),
        ..Default::default()
    }
}

/// Object storage folder holding the snapshots of a database.
#[must_use]
pub fn snapshot_folder(prefix: Option<&str>, namespace: &str, database: &str) -> String {
    let base = format!("kubedb/{namespace}/{database}/snapshots");
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{base}"),
        None => base,
    }
}

/// Builds the one-shot `Job` restoring `snapshot` into `pg`.
#[must_use]
pub fn build_restore_job(pg: &Postgres, snapshot: &Snapshot, tools_image: &str) -> Job {
    let snapshot_name = snapshot.name_any();
    let namespace = snapshot
        .namespace()
        .unwrap_or_else(|| pg.namespace().unwrap_or_default());
    let folder = snapshot_folder(
        snapshot.spec.prefix.as_deref(),
        &namespace,
        &snapshot.spec.database_name,
    );

    let mut args = vec![
        JOB_TYPE_RESTORE.to_string(),
        format!("--host={}", pg.name_any()),
        format!("--folder={folder}"),
        format!("--snapshot={snapshot_name}"),
    ];
    if let Some(bucket) = &snapshot.spec.bucket {
        args.push(format!("--bucket={bucket}"));
    }

    let labels = job_labels(pg, JOB_TYPE_RESTORE);
    let mut metadata = offshoot_meta(pg, restore_job_name(pg, &snapshot_name));
    metadata.labels = Some(labels.clone());

    Job {
        metadata,
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![tools_container(pg, JOB_TYPE_RESTORE, tools_image, args)],
                    volumes: Some(vec![osm_volume(&snapshot.spec.storage_secret_name)]),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the `CronJob` taking periodic snapshots of `pg`.
#[must_use]
pub fn build_backup_cronjob(
    pg: &Postgres,
    schedule: &BackupScheduleSpec,
    tools_image: &str,
) -> CronJob {
    let folder = snapshot_folder(
        schedule.prefix.as_deref(),
        &pg.namespace().unwrap_or_default(),
        &pg.name_any(),
    );
    let mut args = vec![
        JOB_TYPE_BACKUP.to_string(),
        format!("--host={}", pg.name_any()),
        format!("--folder={folder}"),
    ];
    if let Some(bucket) = &schedule.bucket {
        args.push(format!("--bucket={bucket}"));
    }

    let labels = job_labels(pg, JOB_TYPE_BACKUP);
    let mut metadata = offshoot_meta(pg, backup_cronjob_name(pg));
    metadata.labels = Some(labels.clone());

    CronJob {
        metadata,
        spec: Some(CronJobSpec {
            schedule: schedule.cron_expression.clone(),
            concurrency_policy: Some("Forbid".to_string()),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(JobSpec {
                    backoff_limit: Some(0),
                    template: PodTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(labels),
                            ..Default::default()
                        }),
                        spec: Some(PodSpec {
                            containers: vec![tools_container(
                                pg,
                                JOB_TYPE_BACKUP,
                                tools_image,
                                args,
                            )],
                            volumes: Some(vec![osm_volume(&schedule.storage_secret_name)]),
                            restart_policy: Some("Never".to_string()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "postgres_resources_tests.rs"]
mod postgres_resources_tests;
