// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes Event publishing for `Postgres` and `DormantDatabase` objects.
//!
//! Events are the operator-to-human channel. Publishing never fails a
//! reconciliation: API errors are logged at `warn` and swallowed.

use crate::constants::OPERATOR_NAME;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

/// Event type for routine transitions.
pub const EVENT_TYPE_NORMAL: &str = "Normal";

/// Event type for failures and rejected operations.
pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Build the core/v1 `Event` describing `reason` on `object`.
#[must_use]
pub fn build_event<T>(object: &T, event_type: &str, reason: &str, message: &str) -> Event
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    let namespace = object.namespace().unwrap_or_default();
    let name = object.name_any();
    let now = Time(k8s_openapi::jiff::Timestamp::now());

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(T::api_version(&()).to_string()),
            kind: Some(T::kind(&()).to_string()),
            name: Some(name),
            namespace: Some(namespace),
            uid: object.meta().uid.clone(),
            resource_version: object.meta().resource_version.clone(),
            ..Default::default()
        },
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        type_: Some(event_type.to_string()),
        source: Some(EventSource {
            component: Some(OPERATOR_NAME.to_string()),
            host: None,
        }),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        count: Some(1),
        ..Default::default()
    }
}

/// Publish an event on `object`. Failures are logged, never returned.
pub async fn publish_event<T>(client: &Client, object: &T, event_type: &str, reason: &str, message: &str)
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    let event = build_event(object, event_type, reason, message);
    let namespace = object.namespace().unwrap_or_default();
    let api: Api<Event> = Api::namespaced(client.clone(), &namespace);

    if let Err(e) = api.create(&PostParams::default(), &event).await {
        warn!(
            namespace = %namespace,
            name = %object.name_any(),
            reason = reason,
            "Failed to create event: {}",
            e
        );
    }
}

/// Publish a `Normal` event.
pub async fn normal<T>(client: &Client, object: &T, reason: &str, message: &str)
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    publish_event(client, object, EVENT_TYPE_NORMAL, reason, message).await;
}

/// Publish a `Warning` event.
pub async fn warning<T>(client: &Client, object: &T, reason: &str, message: &str)
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    publish_event(client, object, EVENT_TYPE_WARNING, reason, message).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Postgres, PostgresSpec};
    use crate::status_reasons::EVENT_DELETION_LOCKED;

    #[test]
    fn test_build_event_points_at_object() {
        let mut pg = Postgres::new("quick-postgres", PostgresSpec::default());
        pg.metadata.namespace = Some("demo".to_string());
        pg.metadata.uid = Some("uid-1".to_string());

        let event = build_event(&pg, EVENT_TYPE_WARNING, EVENT_DELETION_LOCKED, "locked");

        assert_eq!(event.metadata.generate_name.as_deref(), Some("quick-postgres-"));
        assert_eq!(event.metadata.namespace.as_deref(), Some("demo"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("Postgres"));
        assert_eq!(event.involved_object.api_version.as_deref(), Some("kubedb.com/v1alpha2"));
        assert_eq!(event.involved_object.uid.as_deref(), Some("uid-1"));
        assert_eq!(event.type_.as_deref(), Some("Warning"));
        assert_eq!(event.reason.as_deref(), Some("DeletionLocked"));
        assert_eq!(
            event.source.and_then(|s| s.component).as_deref(),
            Some(OPERATOR_NAME)
        );
        assert_eq!(event.count, Some(1));
    }
}
