//! Identifiers and the normalized path type.
//!
//! `SyncPath` is the one place path separators and Unicode normalization are
//! pinned down; every other module speaks in `SyncPath`, never `PathBuf`,
//! once an entry has crossed an observer boundary (spec §9, "Path
//! separators").

use std::fmt;

/// A canonicalized drive identifier: lowercased, left-padded to 16 hex chars.
///
/// Equality and hashing compare canonical forms only, so two textual
/// variants of the same drive (`"AB12"` vs `"000000000000ab12"`) collapse to
/// one key everywhere a `DriveId` is used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriveId(String);

impl DriveId {
    pub fn canonicalize(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        let padded = if lower.len() >= 16 {
            lower
        } else {
            format!("{:0>16}", lower)
        };
        Self(padded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    pub fn zero() -> Self {
        Self::canonicalize("")
    }
}

impl fmt::Display for DriveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque server-assigned item identifier. Scanner-created items that have
/// not yet been assigned a real ID by the executor use the sentinel form
/// produced by [`ItemId::local_sentinel`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn local_sentinel(path: &SyncPath) -> Self {
        Self(format!("local:{}", path.as_str()))
    }

    pub fn is_local_sentinel(&self) -> bool {
        self.0.starts_with("local:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniquely identifies an item across drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub drive_id: DriveId,
    pub item_id: ItemId,
}

impl ItemKey {
    pub fn new(drive_id: DriveId, item_id: ItemId) -> Self {
        Self { drive_id, item_id }
    }
}

/// A forward-slash-separated, NFC-normalized path, relative to the sync
/// root. Construction is the only place normalization happens; every other
/// piece of code treats a `SyncPath` as already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncPath(String);

impl SyncPath {
    /// Build a `SyncPath` from a platform path component sequence, joining
    /// with `/` and NFC-normalizing. Used at the local-observer boundary.
    pub fn from_components<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("/");
        Self::from_raw(&joined)
    }

    /// Build a `SyncPath` from an already-`/`-joined string, NFC-normalizing
    /// and collapsing accidental `\`. Used at the remote-observer boundary
    /// (after ancestor-name joining) and for baseline round-trips.
    pub fn from_raw(raw: &str) -> Self {
        let slash_form = raw.replace('\\', "/");
        Self(nfc_normalize(&slash_form))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> Option<SyncPath> {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => Some(SyncPath(parent.to_string())),
            None if self.0.is_empty() => None,
            None => Some(SyncPath::root()),
        }
    }

    pub fn join(&self, child: &str) -> SyncPath {
        if self.0.is_empty() {
            SyncPath::from_raw(child)
        } else {
            SyncPath::from_raw(&format!("{}/{}", self.0, child))
        }
    }

    /// `true` if `self` is a strict ancestor directory of `other`.
    pub fn is_ancestor_of(&self, other: &SyncPath) -> bool {
        if self.0.is_empty() {
            return !other.0.is_empty();
        }
        other
            .0
            .strip_prefix(&self.0)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// Number of `/`-separated components; used to order deletes bottom-up
    /// and folder creates top-down (spec §4.4.8).
    pub fn depth(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.matches('/').count() + 1
        }
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// NFC normalization (spec §3, invariant 2; spec §9, "Path separators").
/// Delegates to `unicode-normalization` rather than hand-rolling a
/// composition table, since the set of precomposable base+combining-mark
/// pairs is exactly what Unicode Annex #15 already specifies.
pub fn nfc_normalize(input: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    input.nfc().collect()
}
