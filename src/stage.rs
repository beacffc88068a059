//! Provisioning stages
//!
//! A tenant moves forward through [`Stage::SEQUENCE`] one step at a time and
//! ends in either [`Stage::Completed`] or [`Stage::Failed`]. There are no
//! backward transitions and nothing leaves a terminal stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One discrete step of the provisioning sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Created,
    #[serde(rename = "DBDeployed")]
    DbDeployed,
    #[serde(rename = "DBReady")]
    DbReady,
    #[serde(rename = "DBServiceCreated")]
    DbServiceCreated,
    BackendDeployed,
    BackendReady,
    BackendServiceCreated,
    BackendIngressCreated,
    FrontendDeployed,
    FrontendReady,
    FrontendServiceCreated,
    FrontendIngressCreated,
    AdminUserRegistered,
    CredentialsStored,
    Completed,
    Failed,
}

impl Stage {
    /// The successful path, in order
    pub const SEQUENCE: [Stage; 15] = [
        Stage::Created,
        Stage::DbDeployed,
        Stage::DbReady,
        Stage::DbServiceCreated,
        Stage::BackendDeployed,
        Stage::BackendReady,
        Stage::BackendServiceCreated,
        Stage::BackendIngressCreated,
        Stage::FrontendDeployed,
        Stage::FrontendReady,
        Stage::FrontendServiceCreated,
        Stage::FrontendIngressCreated,
        Stage::AdminUserRegistered,
        Stage::CredentialsStored,
        Stage::Completed,
    ];

    /// Annotation value for this stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "Created",
            Stage::DbDeployed => "DBDeployed",
            Stage::DbReady => "DBReady",
            Stage::DbServiceCreated => "DBServiceCreated",
            Stage::BackendDeployed => "BackendDeployed",
            Stage::BackendReady => "BackendReady",
            Stage::BackendServiceCreated => "BackendServiceCreated",
            Stage::BackendIngressCreated => "BackendIngressCreated",
            Stage::FrontendDeployed => "FrontendDeployed",
            Stage::FrontendReady => "FrontendReady",
            Stage::FrontendServiceCreated => "FrontendServiceCreated",
            Stage::FrontendIngressCreated => "FrontendIngressCreated",
            Stage::AdminUserRegistered => "AdminUserRegistered",
            Stage::CredentialsStored => "CredentialsStored",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Position in the successful path; `None` for `Failed`
    pub fn ordinal(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| s == self)
    }

    /// Next stage on the successful path
    pub fn next(&self) -> Option<Stage> {
        self.ordinal()
            .and_then(|i| Self::SEQUENCE.get(i + 1))
            .copied()
    }

    /// Whether moving from `self` to `to` is a legal transition
    pub fn can_transition_to(&self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::SEQUENCE
            .iter()
            .chain(std::iter::once(&Stage::Failed))
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}
