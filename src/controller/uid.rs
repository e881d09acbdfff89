//! Controller identifiers.

use std::fmt;

/// Identifier of one component controller
///
/// The string form prefixes every per-component configuration key
/// (`<uid>-controller-disabled`, `<uid>-docker-image`, ...) and labels every
/// per-controller metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerUid {
    ChartMuseum,
    Core,
    JobService,
    NotaryServer,
    NotarySigner,
    Portal,
    Registry,
    RegistryController,
    Trivy,
}

impl ControllerUid {
    /// Every component controller, in registration order
    pub const ALL: [ControllerUid; 9] = [
        ControllerUid::ChartMuseum,
        ControllerUid::Core,
        ControllerUid::JobService,
        ControllerUid::NotaryServer,
        ControllerUid::NotarySigner,
        ControllerUid::Portal,
        ControllerUid::Registry,
        ControllerUid::RegistryController,
        ControllerUid::Trivy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControllerUid::ChartMuseum => "chartmuseum",
            ControllerUid::Core => "core",
            ControllerUid::JobService => "jobservice",
            ControllerUid::NotaryServer => "notaryserver",
            ControllerUid::NotarySigner => "notarysigner",
            ControllerUid::Portal => "portal",
            ControllerUid::Registry => "registry",
            ControllerUid::RegistryController => "registryctl",
            ControllerUid::Trivy => "trivy",
        }
    }

    /// Parse the string form
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|uid| uid.as_str() == name)
    }
}

impl fmt::Display for ControllerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_parse_back() {
        for uid in ControllerUid::ALL {
            assert_eq!(ControllerUid::from_name(uid.as_str()), Some(uid));
        }
        assert_eq!(ControllerUid::from_name("harbor"), None);
    }
}
