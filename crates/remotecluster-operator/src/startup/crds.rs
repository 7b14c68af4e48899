//! CRD installation utilities
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the installed schema always matches the running binary.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use remotecluster_common::crd::RemoteCluster;
use remotecluster_common::FIELD_MANAGER;

/// CRD definition with name and resource
struct CrdDef {
    name: &'static str,
    crd: CustomResourceDefinition,
}

fn operator_crds() -> Vec<CrdDef> {
    vec![CrdDef {
        name: "remoteclusters.remotecluster.dev",
        crd: RemoteCluster::crd(),
    }]
}

/// Install a set of CRDs using server-side apply
async fn install_crds(client: &Client, crds_to_install: Vec<CrdDef>) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for def in crds_to_install {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    Ok(())
}

/// Ensure the RemoteCluster CRD is installed
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    install_crds(client, operator_crds()).await?;
    tracing::info!("RemoteCluster CRDs installed/updated");
    Ok(())
}

/// CRD manifests as a multi-document YAML stream, for `--crd`
pub fn crd_yaml() -> anyhow::Result<String> {
    let mut out = String::new();
    for def in operator_crds() {
        let doc = serde_yaml::to_string(&def.crd)
            .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", def.name, e))?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_names_match_crd_metadata() {
        for def in operator_crds() {
            assert_eq!(def.crd.metadata.name.as_deref(), Some(def.name));
        }
    }

    #[test]
    fn crd_yaml_describes_namespaced_remote_cluster() {
        let yaml = crd_yaml().unwrap();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("kind: RemoteCluster"));
        assert!(yaml.contains("scope: Namespaced"));
        assert!(yaml.contains("group: remotecluster.dev"));
    }
}
