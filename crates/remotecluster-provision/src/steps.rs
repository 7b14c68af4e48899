//! Bootstrap step builder
//!
//! [`build_steps`] is a pure function of the parsed version: the same version
//! always yields the same commands in the same order. The order encodes every
//! cross-step dependency, since each command runs on a fresh channel with no
//! shared shell state.

use crate::version::KubernetesVersion;

/// Pod network CIDR passed to `kubeadm init`, matching Flannel's default
pub const POD_NETWORK_CIDR: &str = "10.244.0.0/16";

/// Flannel manifest applied as the pod network add-on
pub const POD_NETWORK_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/flannel-io/flannel/master/Documentation/kube-flannel.yml";

/// Written by `kubeadm init`; its presence marks an initialized control plane
pub const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";

const KUBERNETES_KEYRING: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";
const DOCKER_KEYRING: &str = "/etc/apt/keyrings/docker.gpg";

/// The stage of the bootstrap sequence a step belongs to
///
/// Declaration order is execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvisioningStage {
    /// Report whether a control plane already exists
    Probe,
    /// Turn swap off now and on future boots
    DisableSwap,
    /// overlay and br_netfilter modules
    KernelModules,
    /// Bridge netfilter and IP forwarding sysctls
    Sysctl,
    /// Package index and base utilities
    BasePackages,
    /// containerd with the systemd cgroup driver
    ContainerRuntime,
    /// pkgs.k8s.io signing key and source list
    KubernetesRepository,
    /// kubelet, kubeadm and kubectl at the pinned version
    KubernetesPackages,
    /// kubeadm init, skipped when already initialized
    ControlPlaneInit,
    /// Copy the admin kubeconfig for the login user
    Kubeconfig,
    /// Apply the pod network add-on
    PodNetwork,
}

/// One remote command in the bootstrap sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningStep {
    /// Stage this command belongs to
    pub stage: ProvisioningStage,
    /// Shell command, run through the login user's shell
    pub command: String,
    /// Whether the command alone is safe to run again.
    ///
    /// `false` marks commands that only converge because an earlier cleanup
    /// step in the same stage ran first.
    pub idempotent: bool,
}

impl ProvisioningStep {
    fn new(stage: ProvisioningStage, command: impl Into<String>) -> Self {
        Self {
            stage,
            command: command.into(),
            idempotent: true,
        }
    }

    fn after_cleanup(stage: ProvisioningStage, command: impl Into<String>) -> Self {
        Self {
            stage,
            command: command.into(),
            idempotent: false,
        }
    }
}

/// Build the ordered single-node bootstrap sequence for `version`
pub fn build_steps(version: &KubernetesVersion) -> Vec<ProvisioningStep> {
    use ProvisioningStage::*;

    let repo = version.repo_version();
    let pin = version.package_pin();

    vec![
        ProvisioningStep::new(
            Probe,
            format!(
                "test -f {ADMIN_KUBECONFIG} && echo 'already-initialized' || echo 'not-initialized'"
            ),
        ),
        ProvisioningStep::new(DisableSwap, "sudo swapoff -a"),
        ProvisioningStep::new(
            DisableSwap,
            r"sudo sed -i '/^[^#].*\sswap\s/ s/^/#/' /etc/fstab",
        ),
        ProvisioningStep::new(
            KernelModules,
            r"printf 'overlay\nbr_netfilter\n' | sudo tee /etc/modules-load.d/k8s.conf",
        ),
        ProvisioningStep::new(KernelModules, "sudo modprobe overlay"),
        ProvisioningStep::new(KernelModules, "sudo modprobe br_netfilter"),
        ProvisioningStep::new(
            Sysctl,
            r"printf 'net.bridge.bridge-nf-call-iptables=1\nnet.bridge.bridge-nf-call-ip6tables=1\nnet.ipv4.ip_forward=1\n' | sudo tee /etc/sysctl.d/k8s.conf",
        ),
        ProvisioningStep::new(Sysctl, "sudo sysctl --system"),
        ProvisioningStep::new(BasePackages, "sudo apt-get update"),
        ProvisioningStep::new(
            BasePackages,
            "sudo apt-get install -y ca-certificates curl gnupg apt-transport-https",
        ),
        ProvisioningStep::new(ContainerRuntime, "sudo install -m 0755 -d /etc/apt/keyrings"),
        ProvisioningStep::new(ContainerRuntime, format!("sudo rm -f {DOCKER_KEYRING}")),
        ProvisioningStep::after_cleanup(
            ContainerRuntime,
            format!(
                "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo gpg --dearmor -o {DOCKER_KEYRING}"
            ),
        ),
        ProvisioningStep::new(ContainerRuntime, format!("sudo chmod a+r {DOCKER_KEYRING}")),
        ProvisioningStep::new(
            ContainerRuntime,
            format!(
                r#"echo "deb [arch=$(dpkg --print-architecture) signed-by={DOCKER_KEYRING}] https://download.docker.com/linux/ubuntu $(. /etc/os-release && echo $VERSION_CODENAME) stable" | sudo tee /etc/apt/sources.list.d/docker.list"#
            ),
        ),
        ProvisioningStep::new(ContainerRuntime, "sudo apt-get update"),
        ProvisioningStep::new(ContainerRuntime, "sudo apt-get install -y containerd.io"),
        ProvisioningStep::new(ContainerRuntime, "sudo mkdir -p /etc/containerd"),
        ProvisioningStep::new(
            ContainerRuntime,
            "sudo containerd config default | sudo tee /etc/containerd/config.toml > /dev/null",
        ),
        ProvisioningStep::new(
            ContainerRuntime,
            "sudo sed -i 's/SystemdCgroup = false/SystemdCgroup = true/g' /etc/containerd/config.toml",
        ),
        ProvisioningStep::new(ContainerRuntime, "sudo systemctl restart containerd"),
        ProvisioningStep::new(ContainerRuntime, "sudo systemctl enable containerd"),
        ProvisioningStep::new(KubernetesRepository, format!("sudo rm -f {KUBERNETES_KEYRING}")),
        ProvisioningStep::new(KubernetesRepository, "sudo mkdir -p /etc/apt/keyrings"),
        ProvisioningStep::new(
            KubernetesRepository,
            format!(
                "curl -fsSL https://pkgs.k8s.io/core:/stable:/v{repo}/deb/Release.key | gpg --dearmor | sudo tee {KUBERNETES_KEYRING} > /dev/null"
            ),
        ),
        ProvisioningStep::new(
            KubernetesRepository,
            format!(
                r#"echo "deb [signed-by={KUBERNETES_KEYRING}] https://pkgs.k8s.io/core:/stable:/v{repo}/deb/ /" | sudo tee /etc/apt/sources.list.d/kubernetes.list > /dev/null"#
            ),
        ),
        ProvisioningStep::new(KubernetesPackages, "sudo apt-get update"),
        ProvisioningStep::new(
            KubernetesPackages,
            format!(
                "sudo apt-get install -y --allow-change-held-packages kubelet='{pin}' kubeadm='{pin}' kubectl='{pin}'"
            ),
        ),
        ProvisioningStep::new(KubernetesPackages, "sudo apt-mark hold kubelet kubeadm kubectl"),
        ProvisioningStep::new(KubernetesPackages, "sudo systemctl enable kubelet"),
        ProvisioningStep::new(
            ControlPlaneInit,
            format!(
                "test -f {ADMIN_KUBECONFIG} || sudo kubeadm init --pod-network-cidr={POD_NETWORK_CIDR}"
            ),
        ),
        ProvisioningStep::new(Kubeconfig, "mkdir -p $HOME/.kube"),
        ProvisioningStep::new(
            Kubeconfig,
            format!("sudo cp -f {ADMIN_KUBECONFIG} $HOME/.kube/config"),
        ),
        ProvisioningStep::new(Kubeconfig, "sudo chown $(id -u):$(id -g) $HOME/.kube/config"),
        ProvisioningStep::new(
            PodNetwork,
            format!("kubectl apply -f {POD_NETWORK_MANIFEST_URL}"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_for(version: &str) -> Vec<ProvisioningStep> {
        build_steps(&KubernetesVersion::parse(version).unwrap())
    }

    fn commands(steps: &[ProvisioningStep]) -> Vec<&str> {
        steps.iter().map(|s| s.command.as_str()).collect()
    }

    #[test]
    fn builder_is_deterministic() {
        assert_eq!(steps_for("v1.30.2"), steps_for("v1.30.2"));
        assert_eq!(steps_for("1.30.2"), steps_for("v1.30.2"));
    }

    #[test]
    fn stages_run_in_canonical_order() {
        let steps = steps_for("1.30.2");
        assert!(steps.windows(2).all(|w| w[0].stage <= w[1].stage));

        let mut stages: Vec<ProvisioningStage> = steps.iter().map(|s| s.stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            vec![
                ProvisioningStage::Probe,
                ProvisioningStage::DisableSwap,
                ProvisioningStage::KernelModules,
                ProvisioningStage::Sysctl,
                ProvisioningStage::BasePackages,
                ProvisioningStage::ContainerRuntime,
                ProvisioningStage::KubernetesRepository,
                ProvisioningStage::KubernetesPackages,
                ProvisioningStage::ControlPlaneInit,
                ProvisioningStage::Kubeconfig,
                ProvisioningStage::PodNetwork,
            ]
        );
    }

    #[test]
    fn repository_uses_minor_line() {
        let steps = steps_for("v1.30.2");
        let repo_steps: Vec<&str> = steps
            .iter()
            .filter(|s| s.stage == ProvisioningStage::KubernetesRepository)
            .map(|s| s.command.as_str())
            .collect();
        assert!(repo_steps
            .iter()
            .any(|c| c.contains("pkgs.k8s.io/core:/stable:/v1.30/deb/Release.key")));
        assert!(repo_steps
            .iter()
            .any(|c| c.contains("pkgs.k8s.io/core:/stable:/v1.30/deb/ /")));
    }

    #[test]
    fn packages_are_pinned_and_held() {
        let steps = steps_for("v1.30.2");
        let cmds = commands(&steps);
        assert!(cmds.contains(
            &"sudo apt-get install -y --allow-change-held-packages kubelet='1.30.2-*' kubeadm='1.30.2-*' kubectl='1.30.2-*'"
        ));
        assert!(cmds.contains(&"sudo apt-mark hold kubelet kubeadm kubectl"));

        let unpatched = steps_for("1.31");
        assert!(commands(&unpatched)
            .iter()
            .any(|c| c.contains("kubelet='1.31.*'")));
    }

    #[test]
    fn kubeadm_init_is_guarded() {
        let steps = steps_for("1.30.2");
        let init: Vec<&ProvisioningStep> = steps
            .iter()
            .filter(|s| s.stage == ProvisioningStage::ControlPlaneInit)
            .collect();
        assert_eq!(init.len(), 1);
        assert_eq!(
            init[0].command,
            "test -f /etc/kubernetes/admin.conf || sudo kubeadm init --pod-network-cidr=10.244.0.0/16"
        );
        assert!(init[0].idempotent);
    }

    #[test]
    fn probe_never_fails_the_sequence() {
        let steps = steps_for("1.30.2");
        assert_eq!(steps[0].stage, ProvisioningStage::Probe);
        assert!(steps[0].command.ends_with("|| echo 'not-initialized'"));
    }

    #[test]
    fn non_idempotent_steps_follow_a_cleanup_in_their_stage() {
        let steps = steps_for("1.30.2");
        for (i, step) in steps.iter().enumerate().filter(|(_, s)| !s.idempotent) {
            let cleaned = steps[..i]
                .iter()
                .any(|prev| prev.stage == step.stage && prev.command.starts_with("sudo rm -f"));
            assert!(cleaned, "step {:?} has no preceding cleanup", step.command);
        }
        assert_eq!(steps.iter().filter(|s| !s.idempotent).count(), 1);
    }

    #[test]
    fn runtime_uses_systemd_cgroup_driver_before_restart() {
        let steps = steps_for("1.30.2");
        let cmds = commands(&steps);
        let cgroup = cmds
            .iter()
            .position(|c| c.contains("SystemdCgroup = true"))
            .unwrap();
        let restart = cmds
            .iter()
            .position(|c| *c == "sudo systemctl restart containerd")
            .unwrap();
        assert!(cgroup < restart);
    }

    #[test]
    fn pod_network_is_applied_last() {
        let steps = steps_for("1.30.2");
        let last = steps.last().unwrap();
        assert_eq!(last.stage, ProvisioningStage::PodNetwork);
        assert_eq!(last.command, format!("kubectl apply -f {POD_NETWORK_MANIFEST_URL}"));
    }
}
