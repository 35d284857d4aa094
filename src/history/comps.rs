// src/history/comps.rs

//! Group and environment history entries
//!
//! Comps metadata itself is parsed elsewhere; history only keeps the id, the
//! package-type mask the group was installed with and the member list as it
//! was at the time of the transaction.

use super::action::ActionKind;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Bitmask of comps package (or group) types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackageTypes(u8);

impl PackageTypes {
    pub const CONDITIONAL: PackageTypes = PackageTypes(1 << 0);
    pub const DEFAULT: PackageTypes = PackageTypes(1 << 1);
    pub const MANDATORY: PackageTypes = PackageTypes(1 << 2);
    pub const OPTIONAL: PackageTypes = PackageTypes(1 << 3);

    const NAMES: [(PackageTypes, &'static str); 4] = [
        (PackageTypes::CONDITIONAL, "conditional"),
        (PackageTypes::DEFAULT, "default"),
        (PackageTypes::MANDATORY, "mandatory"),
        (PackageTypes::OPTIONAL, "optional"),
    ];

    pub fn empty() -> Self {
        PackageTypes(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Build from stored bits, dropping unknown ones
    pub fn from_bits_truncate(bits: u8) -> Self {
        PackageTypes(bits & 0b1111)
    }

    pub fn contains(&self, other: PackageTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PackageTypes {
    type Output = PackageTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        PackageTypes(self.0 | rhs.0)
    }
}

impl BitOrAssign for PackageTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PackageTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" "))
    }
}

impl FromStr for PackageTypes {
    type Err = String;

    /// Accepts names separated by spaces and/or commas
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut types = PackageTypes::empty();
        for word in s.split(|c: char| c == ',' || c.is_whitespace()) {
            if word.is_empty() {
                continue;
            }
            let (bit, _) = Self::NAMES
                .iter()
                .find(|(_, name)| *name == word)
                .ok_or_else(|| format!("Invalid comps package type: {word}"))?;
            types |= *bit;
        }
        Ok(types)
    }
}

/// A package listed in a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPackage {
    pub name: String,
    pub installed: bool,
    pub package_type: PackageTypes,
}

/// A group as recorded in history or in the installed-group state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompsGroup {
    pub id: String,
    pub package_types: PackageTypes,
    pub packages: Vec<GroupPackage>,
}

impl CompsGroup {
    pub fn new(id: impl Into<String>, package_types: PackageTypes) -> Self {
        Self {
            id: id.into(),
            package_types,
            packages: Vec::new(),
        }
    }

    pub fn add_package(&mut self, name: impl Into<String>, installed: bool, package_type: PackageTypes) {
        self.packages.push(GroupPackage {
            name: name.into(),
            installed,
            package_type,
        });
    }
}

/// A group listed in an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentGroup {
    pub id: String,
    pub installed: bool,
    pub group_type: PackageTypes,
}

/// An environment as recorded in history or in the installed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompsEnvironment {
    pub id: String,
    pub package_types: PackageTypes,
    pub groups: Vec<EnvironmentGroup>,
}

impl CompsEnvironment {
    pub fn new(id: impl Into<String>, package_types: PackageTypes) -> Self {
        Self {
            id: id.into(),
            package_types,
            groups: Vec::new(),
        }
    }

    pub fn add_group(&mut self, id: impl Into<String>, installed: bool, group_type: PackageTypes) {
        self.groups.push(EnvironmentGroup {
            id: id.into(),
            installed,
            group_type,
        });
    }
}

/// One transaction step applied to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAction {
    pub action: ActionKind,
    pub group: CompsGroup,
}

/// One transaction step applied to an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentAction {
    pub action: ActionKind,
    pub environment: CompsEnvironment,
}
