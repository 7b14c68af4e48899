//! SSH password resolution from Kubernetes Secrets

use remotecluster_common::crd::SecretKeyRef;
use remotecluster_common::Error;

use crate::controller::KubeClient;

/// Read the password referenced by `secret_ref` from `namespace`
///
/// The value is returned as-is (no trimming). A missing Secret, a missing key
/// or a value that is not UTF-8 is a [`Error::CredentialResolution`].
pub async fn resolve_password(
    kube: &dyn KubeClient,
    namespace: &str,
    secret_ref: &SecretKeyRef,
) -> Result<String, Error> {
    let secret = kube
        .get_secret(&secret_ref.name, namespace)
        .await
        .map_err(|e| Error::credential(&secret_ref.name, format!("failed to fetch secret: {e}")))?
        .ok_or_else(|| {
            Error::credential(
                &secret_ref.name,
                format!("secret not found in namespace {namespace}"),
            )
        })?;

    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&secret_ref.key))
        .map(|value| value.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(&secret_ref.key))
                .map(|value| value.clone().into_bytes())
        })
        .ok_or_else(|| {
            Error::credential(
                &secret_ref.name,
                format!("key {} not found", secret_ref.key),
            )
        })?;

    String::from_utf8(bytes).map_err(|_| {
        Error::credential(
            &secret_ref.name,
            format!("value of key {} is not valid UTF-8", secret_ref.key),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::controller::MockKubeClient;

    fn secret_ref() -> SecretKeyRef {
        SecretKeyRef {
            name: "edge-1-ssh".to_string(),
            key: "password".to_string(),
        }
    }

    fn secret_with(key: &str, value: &[u8]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("edge-1-ssh".to_string()),
                namespace: Some("infra".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn password_is_read_from_the_clusters_namespace() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_secret()
            .withf(|name, namespace| name == "edge-1-ssh" && namespace == "infra")
            .returning(|_, _| Ok(Some(secret_with("password", b"s3cret "))));

        let password = resolve_password(&kube, "infra", &secret_ref()).await.unwrap();
        assert_eq!(password, "s3cret ");
    }

    #[tokio::test]
    async fn missing_secret_names_the_secret() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_secret().returning(|_, _| Ok(None));

        let err = resolve_password(&kube, "infra", &secret_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialResolution { ref secret, .. } if secret == "edge-1-ssh"));
        assert!(err.to_string().contains("not found in namespace infra"));
    }

    #[tokio::test]
    async fn missing_key_is_a_credential_error() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_secret()
            .returning(|_, _| Ok(Some(secret_with("username", b"ubuntu"))));

        let err = resolve_password(&kube, "infra", &secret_ref())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("key password not found"));
    }

    #[tokio::test]
    async fn non_utf8_value_is_rejected() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_secret()
            .returning(|_, _| Ok(Some(secret_with("password", &[0xff, 0xfe]))));

        let err = resolve_password(&kube, "infra", &secret_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialResolution { .. }));
    }

    #[tokio::test]
    async fn api_failure_is_a_credential_error() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_secret()
            .returning(|_, _| {
                Err(Error::connection(
                    "kubernetes.default.svc:443",
                    "apiserver unavailable",
                ))
            });

        let err = resolve_password(&kube, "infra", &secret_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialResolution { .. }));
        assert!(err.to_string().contains("apiserver unavailable"));
    }
}
