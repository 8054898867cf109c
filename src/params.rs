//! Flag sets controlling a file or folder churn

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::backend::BackendKind;
use crate::engine::ChurnDirection;

/// Per-file churn flags. Combine with `|`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChurnParams(u8);

impl ChurnParams {
    pub const DEFAULTS: Self = Self(0);
    /// Decrypt instead of encrypt.
    pub const IS_DECRYPT: Self = Self(1 << 0);
    /// Retain the source file after a successful (or skipped) churn.
    pub const KEEP_SOURCE: Self = Self(1 << 1);
    /// Churn even if the target already exists.
    pub const REDO_TARGET: Self = Self(1 << 2);
    /// Keep tags in a sibling `.gmac` file instead of the container trailer.
    pub const SUBJECT_AUTHENTICATION: Self = Self(1 << 3);
    /// Use the CCM backend instead of the default GCM backend.
    pub const IS_CCM: Self = Self(1 << 4);
    /// Decrypt without verifying tags.
    pub const SKIP_AUTHENTICATION: Self = Self(1 << 5);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::IS_DECRYPT, "IS_DECRYPT"),
        (Self::KEEP_SOURCE, "KEEP_SOURCE"),
        (Self::REDO_TARGET, "REDO_TARGET"),
        (Self::SUBJECT_AUTHENTICATION, "SUBJECT_AUTHENTICATION"),
        (Self::IS_CCM, "IS_CCM"),
        (Self::SKIP_AUTHENTICATION, "SKIP_AUTHENTICATION"),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn direction(self) -> ChurnDirection {
        if self.contains(Self::IS_DECRYPT) {
            ChurnDirection::Decrypt
        } else {
            ChurnDirection::Encrypt
        }
    }

    pub fn backend(self) -> BackendKind {
        if self.contains(Self::IS_CCM) {
            BackendKind::Ccm
        } else {
            BackendKind::Gcm
        }
    }
}

impl BitOr for ChurnParams {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChurnParams {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ChurnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("DEFAULTS")
        } else {
            f.write_str(&set.join(" | "))
        }
    }
}

/// Flags for walking a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FolderChurnParams(u8);

impl FolderChurnParams {
    pub const DEFAULTS: Self = Self(0);
    /// Only churn files directly inside the directory.
    pub const IS_SHALLOW: Self = Self(1 << 0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FolderChurnParams {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
