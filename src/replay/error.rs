// src/replay/error.rs

//! Replay error types
//!
//! Schema problems with a replay document are fatal as soon as they are
//! found. Problems found while replaying a valid document are collected per
//! kind and either demoted to warnings or raised together, depending on the
//! tolerance flags in effect.

use super::engine::ReplayOptions;
use std::fmt;
use thiserror::Error;

/// A replay document that cannot be used at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Invalid transaction file: {0}")]
    Parse(String),

    #[error("Incompatible major version \"{found}\", supported major version is \"{supported}\".")]
    IncompatibleVersion { found: u32, supported: u32 },

    #[error("Unexpected type of {what}, {expected} expected.")]
    Type { what: String, expected: &'static str },

    #[error("Missing key \"{key}\" for {container}.")]
    MissingKey {
        key: &'static str,
        container: &'static str,
    },

    #[error("Unexpected value of {field} \"{value}\" in {container}.")]
    UnknownValue {
        field: &'static str,
        value: String,
        container: &'static str,
    },
}

/// What went wrong with one entry of a valid document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    UnparsableNevra,
    UnavailablePackage,
    AlreadyInstalled,
    NotInstalled,
    UnexpectedAction,
    UnavailableGroup,
    GroupNotInstalled,
    UnavailableEnvironment,
    EnvironmentNotInstalled,
    /// The resolver pulled in a package the document does not name
    UnexpectedExtra,
}

impl ProblemKind {
    /// Whether `options` demote this kind of problem to a warning
    pub fn tolerated_by(&self, options: &ReplayOptions) -> bool {
        match self {
            ProblemKind::UnparsableNevra | ProblemKind::UnexpectedAction => false,
            ProblemKind::UnavailablePackage
            | ProblemKind::UnavailableGroup
            | ProblemKind::UnavailableEnvironment => options.skip_unavailable,
            ProblemKind::AlreadyInstalled
            | ProblemKind::NotInstalled
            | ProblemKind::GroupNotInstalled
            | ProblemKind::EnvironmentNotInstalled => options.ignore_installed,
            ProblemKind::UnexpectedExtra => options.ignore_extras,
        }
    }
}

/// One problem with the entry it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayProblem {
    pub kind: ProblemKind,
    /// NEVRA, group id or environment id
    pub subject: String,
    pub action: String,
}

impl ReplayProblem {
    pub fn new(kind: ProblemKind, subject: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for ReplayProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (subject, action) = (&self.subject, &self.action);
        match self.kind {
            ProblemKind::UnparsableNevra => {
                write!(f, "Cannot parse NEVRA for package \"{subject}\".")
            }
            ProblemKind::UnavailablePackage => write!(f, "Cannot find rpm nevra \"{subject}\"."),
            ProblemKind::AlreadyInstalled => write!(
                f,
                "Package \"{subject}\" is already installed for action \"{action}\"."
            ),
            ProblemKind::NotInstalled => write!(
                f,
                "Package nevra \"{subject}\" not installed for action \"{action}\"."
            ),
            ProblemKind::UnexpectedAction => {
                write!(f, "Unexpected action \"{action}\" for \"{subject}\".")
            }
            ProblemKind::UnavailableGroup => write!(f, "Group id '{subject}' is not available."),
            ProblemKind::GroupNotInstalled => write!(f, "Group id '{subject}' is not installed."),
            ProblemKind::UnavailableEnvironment => {
                write!(f, "Environment id '{subject}' is not available.")
            }
            ProblemKind::EnvironmentNotInstalled => {
                write!(f, "Environment id '{subject}' is not installed.")
            }
            ProblemKind::UnexpectedExtra => write!(
                f,
                "Package nevra \"{subject}\", which is not present in the transaction file, was pulled into the transaction."
            ),
        }
    }
}

/// Every problem of one replay attempt that was not tolerated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.source_name, .problems))]
pub struct TransactionReplayError {
    pub source_name: String,
    pub problems: Vec<ReplayProblem>,
}

fn render(source_name: &str, problems: &[ReplayProblem]) -> String {
    let mut message = format!(
        "The following problems occurred while replaying the transaction from \"{source_name}\":"
    );
    for problem in problems {
        message.push_str("\n  ");
        message.push_str(&problem.to_string());
    }
    message
}
