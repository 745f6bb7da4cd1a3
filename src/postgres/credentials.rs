// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Credential resolution from a database's auth secret.

use crate::constants::{SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME};
use crate::crd::Postgres;
use crate::errors::CredentialError;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use std::fmt;

/// Username and password of a database superuser.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read one key from a secret, checking `data` before `stringData`.
fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return String::from_utf8(bytes.0.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
}

/// Extract credentials from an already fetched secret.
///
/// # Errors
///
/// Returns [`CredentialError::CredentialNotFound`] if `username` or `password` is
/// absent or not valid UTF-8.
pub fn credentials_from_secret(secret: &Secret) -> Result<Credentials, CredentialError> {
    let missing = |key: &str| CredentialError::CredentialNotFound {
        namespace: secret.namespace().unwrap_or_default(),
        name: secret.name_any(),
        reason: format!("no usable '{key}' entry"),
    };

    let username = secret_value(secret, SECRET_KEY_USERNAME).ok_or_else(|| missing(SECRET_KEY_USERNAME))?;
    let password = secret_value(secret, SECRET_KEY_PASSWORD).ok_or_else(|| missing(SECRET_KEY_PASSWORD))?;

    Ok(Credentials { username, password })
}

/// Fetch the auth secret of `pg` and extract its credentials.
///
/// # Errors
///
/// Returns [`CredentialError::CredentialNotFound`] when `spec.authSecret` is not
/// set, the secret cannot be fetched, or it lacks a key.
pub async fn resolve_credentials(
    client: &Client,
    pg: &Postgres,
) -> Result<Credentials, CredentialError> {
    let namespace = pg.namespace().unwrap_or_default();
    let secret_name = pg
        .auth_secret_name()
        .ok_or_else(|| CredentialError::CredentialNotFound {
            namespace: namespace.clone(),
            name: pg.name_any(),
            reason: "spec.authSecret is not set".to_string(),
        })?;

    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let secret = api
        .get(secret_name)
        .await
        .map_err(|e| CredentialError::CredentialNotFound {
            namespace: namespace.clone(),
            name: secret_name.to_string(),
            reason: e.to_string(),
        })?;

    credentials_from_secret(&secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn secret(data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("pg-auth".to_string()),
                namespace: Some("demo".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentials_from_secret() {
        let creds = credentials_from_secret(&secret(&[("username", "postgres"), ("password", "s3cret")]))
            .unwrap();
        assert_eq!(creds.username, "postgres");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn test_missing_password_is_reported() {
        let err = credentials_from_secret(&secret(&[("username", "postgres")])).unwrap_err();
        assert!(
            matches!(err, CredentialError::CredentialNotFound { ref name, .. } if name == "pg-auth"),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("'password'"));
    }

    #[test]
    fn test_string_data_is_accepted() {
        let mut s = secret(&[]);
        s.string_data = Some(BTreeMap::from([
            ("username".to_string(), "admin".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]));
        let creds = credentials_from_secret(&s).unwrap();
        assert_eq!(creds.username, "admin");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            username: "postgres".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("postgres"));
    }
}
