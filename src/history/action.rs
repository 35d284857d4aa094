// src/history/action.rs

//! Per-package transaction actions and install reasons

use crate::version::Nevra;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// What a transaction did to one package, group or environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Install,
    /// Install explicitly requested by the user
    TrueInstall,
    /// Install pulled in as a dependency
    DepInstall,
    Upgrade,
    Upgraded,
    Downgrade,
    Downgraded,
    Reinstall,
    Reinstalled,
    Erase,
    /// Incoming package that obsoletes another
    Obsoleting,
    Obsoleted,
    /// Only the install reason changed
    ReasonChange,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        ActionKind::Install,
        ActionKind::TrueInstall,
        ActionKind::DepInstall,
        ActionKind::Upgrade,
        ActionKind::Upgraded,
        ActionKind::Downgrade,
        ActionKind::Downgraded,
        ActionKind::Reinstall,
        ActionKind::Reinstalled,
        ActionKind::Erase,
        ActionKind::Obsoleting,
        ActionKind::Obsoleted,
        ActionKind::ReasonChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Install => "Install",
            ActionKind::TrueInstall => "True-Install",
            ActionKind::DepInstall => "Dep-Install",
            ActionKind::Upgrade => "Upgrade",
            ActionKind::Upgraded => "Upgraded",
            ActionKind::Downgrade => "Downgrade",
            ActionKind::Downgraded => "Downgraded",
            ActionKind::Reinstall => "Reinstall",
            ActionKind::Reinstalled => "Reinstalled",
            ActionKind::Erase => "Removed",
            ActionKind::Obsoleting => "Obsolete",
            ActionKind::Obsoleted => "Obsoleted",
            ActionKind::ReasonChange => "Reason Change",
        }
    }

    /// Install, True-Install or Dep-Install
    pub fn is_install_flavor(&self) -> bool {
        matches!(
            self,
            ActionKind::Install | ActionKind::TrueInstall | ActionKind::DepInstall
        )
    }

    /// Actions that bring a package build onto the system
    pub fn is_incoming(&self) -> bool {
        self.is_install_flavor()
            || matches!(
                self,
                ActionKind::Upgrade
                    | ActionKind::Downgrade
                    | ActionKind::Reinstall
                    | ActionKind::Obsoleting
            )
    }

    /// Actions that take a package build off the system
    pub fn is_outgoing(&self) -> bool {
        matches!(
            self,
            ActionKind::Upgraded
                | ActionKind::Downgraded
                | ActionKind::Reinstalled
                | ActionKind::Erase
                | ActionKind::Obsoleted
        )
    }

    /// Semantic inverse used for undo and rollback
    pub fn inverse(&self) -> ActionKind {
        match self {
            ActionKind::Install | ActionKind::TrueInstall | ActionKind::DepInstall => {
                ActionKind::Erase
            }
            ActionKind::Erase => ActionKind::Install,
            ActionKind::Upgrade => ActionKind::Downgraded,
            ActionKind::Upgraded => ActionKind::Downgrade,
            ActionKind::Downgrade => ActionKind::Upgraded,
            ActionKind::Downgraded => ActionKind::Upgrade,
            ActionKind::Reinstall => ActionKind::Reinstalled,
            ActionKind::Reinstalled => ActionKind::Reinstall,
            ActionKind::Obsoleted => ActionKind::Install,
            ActionKind::Obsoleting => ActionKind::Obsoleted,
            ActionKind::ReasonChange => ActionKind::ReasonChange,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid action: {s}"))
    }
}

/// Why a package is present on the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reason {
    User,
    Dependency,
    Weak,
    Group,
    Clean,
    #[default]
    Unknown,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::User => "user",
            Reason::Dependency => "dependency",
            Reason::Weak => "weak-dependency",
            Reason::Group => "group",
            Reason::Clean => "clean",
            Reason::Unknown => "unknown",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Reason::Unknown => 0,
            Reason::Clean => 1,
            Reason::Weak => 2,
            Reason::Dependency => 3,
            Reason::Group => 4,
            Reason::User => 5,
        }
    }

    /// Order reasons by how specific they are; `User` is the most specific
    pub fn compare_specificity(&self, other: &Reason) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Reason::User),
            "dependency" => Ok(Reason::Dependency),
            "weak-dependency" => Ok(Reason::Weak),
            "group" => Ok(Reason::Group),
            "clean" => Ok(Reason::Clean),
            "unknown" => Ok(Reason::Unknown),
            _ => Err(format!("Invalid reason: {s}")),
        }
    }
}

/// Repository id of packages that are already installed
pub const SYSTEM_REPO: &str = "@System";

/// One atomic effect of a transaction on one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAction {
    pub action: ActionKind,
    pub nevra: Nevra,
    pub reason: Reason,
    /// Originating repository, `None` for the system repo
    pub repo_id: Option<String>,
    /// Whether this step completed
    pub done: bool,
}

impl PackageAction {
    pub fn new(action: ActionKind, nevra: Nevra, reason: Reason) -> Self {
        Self {
            action,
            nevra,
            reason,
            repo_id: None,
            done: true,
        }
    }

    pub fn with_repo(mut self, repo_id: impl Into<String>) -> Self {
        let repo_id = repo_id.into();
        self.repo_id = if repo_id.is_empty() { None } else { Some(repo_id) };
        self
    }

    /// The same package identity with a different action
    pub fn with_action(&self, action: ActionKind) -> Self {
        Self {
            action,
            ..self.clone()
        }
    }

    /// Repository id, treating the system repo and an absent id alike
    pub fn origin(&self) -> Option<&str> {
        self.repo_id.as_deref().filter(|r| !r.is_empty() && *r != SYSTEM_REPO)
    }
}
