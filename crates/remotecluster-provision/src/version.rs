//! Kubernetes version parsing
//!
//! The pkgs.k8s.io apt repositories are split per minor line
//! (`/core:/stable:/v1.30/deb/`), so the version is needed both as a
//! `major.minor` repository selector and as a package pin.

use std::fmt;
use std::str::FromStr;

use remotecluster_common::Error;

/// A parsed `major.minor[.patch]` Kubernetes version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KubernetesVersion {
    major: u32,
    minor: u32,
    patch: Option<String>,
}

impl KubernetesVersion {
    /// Parse a version string such as `v1.30.2`, `1.30.2` or `1.30`
    ///
    /// A leading `v` is stripped. Major and minor must be decimal numbers.
    /// Everything after the second dot is the patch. It must start with a
    /// digit and may only contain characters valid in a Debian package
    /// version (`[0-9A-Za-z.+~-]`), since it ends up in an apt pin.
    pub fn parse(version: &str) -> Result<Self, Error> {
        let clean = version.strip_prefix('v').unwrap_or(version);

        let mut parts = clean.splitn(3, '.');
        let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
            return Err(Error::invalid_version(version));
        };
        let patch = parts.next();

        let major = parse_component(major).ok_or_else(|| Error::invalid_version(version))?;
        let minor = parse_component(minor).ok_or_else(|| Error::invalid_version(version))?;
        if patch.is_some_and(|p| !is_package_version(p)) {
            return Err(Error::invalid_version(version));
        }

        Ok(Self {
            major,
            minor,
            patch: patch.map(str::to_string),
        })
    }

    /// Package repository line, always `major.minor`
    pub fn repo_version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// The version without the leading `v`
    pub fn normalized(&self) -> String {
        match &self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => self.repo_version(),
        }
    }

    /// Patch component, if one was given
    pub fn patch(&self) -> Option<&str> {
        self.patch.as_deref()
    }

    /// apt version glob for kubelet/kubeadm/kubectl
    ///
    /// Debian revisions (`-1.1`) are matched by the trailing wildcard. Without
    /// a patch the newest release of the minor line is selected.
    pub fn package_pin(&self) -> String {
        match &self.patch {
            Some(_) => format!("{}-*", self.normalized()),
            None => format!("{}.*", self.repo_version()),
        }
    }
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn is_package_version(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'~' | b'-'))
}

impl FromStr for KubernetesVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}
