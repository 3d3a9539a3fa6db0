//! Host architecture and the emulated "other" architecture used by the
//! cross-architecture check

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// Architecture of the running harness process.
    pub fn native() -> HarnessResult<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Map a `std::env::consts::ARCH` value (or an OCI name) to an [`Arch`].
    pub fn from_rust_arch(arch: &str) -> HarnessResult<Self> {
        match arch {
            "x86_64" | "amd64" => Ok(Arch::Amd64),
            "aarch64" | "arm64" => Ok(Arch::Arm64),
            other => Err(HarnessError::UnsupportedArch(other.to_string())),
        }
    }

    /// OCI platform name
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    /// What `arch` prints inside a Linux guest of this architecture
    pub fn uname_label(&self) -> &'static str {
        match self {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "aarch64",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Arch::Amd64 => Arch::Arm64,
            Arch::Arm64 => Arch::Amd64,
        }
    }

    /// The emulation target for a host of this architecture.
    pub fn cross_target(&self) -> CrossTarget {
        let target = self.other();
        CrossTarget {
            arch: target,
            platform: format!("linux/{}", target.as_str()),
            expected_label: target.uname_label(),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform flag and expected in-guest label for running a foreign-arch image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossTarget {
    pub arch: Arch,
    /// Value for `--platform`
    pub platform: String,
    pub expected_label: &'static str,
}
