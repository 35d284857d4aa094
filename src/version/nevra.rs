// src/version/nevra.rs

//! Name-Epoch-Version-Release-Architecture package identities

use super::{RpmVersion, rpmvercmp};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Fully qualified identity of a package build
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nevra {
    pub name: String,
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    pub fn new(
        name: impl Into<String>,
        epoch: u64,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    /// Parse `name-[epoch:]version-release.arch`
    ///
    /// Exactly one interpretation is accepted; anything that does not split
    /// into all five parts is rejected rather than guessed at.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::ParseError(format!("Invalid NEVRA '{}': {}", s, why));

        let (rest, arch) = s.rsplit_once('.').ok_or_else(|| invalid("missing architecture"))?;
        if arch.is_empty() || !arch.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_') {
            return Err(invalid("bad architecture"));
        }

        let (rest, release) = rest.rsplit_once('-').ok_or_else(|| invalid("missing release"))?;
        let (name, epoch_version) = rest.rsplit_once('-').ok_or_else(|| invalid("missing version"))?;
        if name.is_empty() || release.is_empty() {
            return Err(invalid("empty name or release"));
        }
        if name.contains(':') || release.contains(':') {
            return Err(invalid("unexpected ':'"));
        }

        let (epoch, version) = match epoch_version.split_once(':') {
            Some((epoch, version)) => {
                let epoch = epoch.parse::<u64>().map_err(|_| invalid("epoch is not a number"))?;
                (epoch, version)
            }
            None => (0, epoch_version),
        };
        if version.is_empty() || version.contains(':') {
            return Err(invalid("bad version"));
        }

        Ok(Self::new(name, epoch, version, release, arch))
    }

    /// Epoch, version and release as a comparable version
    pub fn evr(&self) -> RpmVersion {
        RpmVersion::new(self.epoch, self.version.clone(), Some(self.release.clone()))
    }

    /// Order two builds by epoch, version and release only
    pub fn compare_evr(&self, other: &Nevra) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }

    /// `name.arch` as shown in messages
    pub fn na(&self) -> String {
        format!("{}.{}", self.name, self.arch)
    }

    /// Architecture family used to pair packages across multilib arches
    pub fn basearch(&self) -> &str {
        basearch(&self.arch)
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}.{}", self.version, self.release, self.arch)
    }
}

impl Ord for Nevra {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.compare_evr(other))
            .then_with(|| self.arch.cmp(&other.arch))
    }
}

impl PartialOrd for Nevra {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fold an architecture onto its base architecture
///
/// `.i586` and `.i686` builds of the same package are the same package as
/// far as history is concerned.
pub fn basearch(arch: &str) -> &str {
    match arch {
        "i386" | "i486" | "i586" | "i686" | "athlon" | "geode" | "pentium3" | "pentium4" => {
            "i386"
        }
        "x86_64" | "amd64" | "ia32e" => "x86_64",
        "armv7hl" | "armv7hnl" | "armv6hl" => "armhfp",
        "armv5tel" | "armv5tejl" | "armv6l" | "armv7l" => "arm",
        "ppc64" | "ppc64p7" => "ppc64",
        "sparc64" | "sparc64v" => "sparc64",
        other => other,
    }
}
