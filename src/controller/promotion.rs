//! Atomic promotion of candidates into the live configuration path.
//!
//! # Responsibilities
//! - Snapshot the candidate into a staging file beside the live config
//! - Apply mode and ownership to the staged file
//! - Rename the staged file over the live config (atomic on one filesystem)
//! - Consume or keep the candidate afterwards
//!
//! # Design Decisions
//! - The staged snapshot is what gets validated, so promoted bytes are
//!   exactly the validated bytes
//! - Staging lives in the live config's directory, never across filesystems
//! - A staged file is removed on drop unless it was committed

use std::fmt;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use nix::errno::Errno;
use nix::unistd::{chown, Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::watcher::Fingerprint;

/// Errors raised while staging or promoting a candidate.
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("cannot read candidate {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot stage candidate at {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot set mode on {path}: {source}")]
    Mode {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot change owner of {path}: {source}")]
    Owner {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("cannot rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("cannot look up {name}: {source}")]
    Lookup {
        name: String,
        #[source]
        source: Errno,
    },
}

/// What happens to a candidate that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscardPolicy {
    /// Delete it from the watch directory.
    #[default]
    Remove,
    /// Leave it for the operator to inspect.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid file mode `{0}`: expected octal such as 0640")]
pub struct InvalidMode(String);

/// Octal permission bits, written `0640`, `640` or `0o640`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileMode(u32);

impl FileMode {
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn apply(self, path: &Path) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(self.0))
    }
}

impl FromStr for FileMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0o");
        match u32::from_str_radix(digits, 8) {
            Ok(bits) if !digits.is_empty() && bits <= 0o7777 => Ok(Self(bits)),
            _ => Err(InvalidMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for FileMode {
    type Error = InvalidMode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid owner `{0}`: expected user, user:group or :group")]
pub struct InvalidOwner(String);

/// `user[:group]` as written in configuration; names or numeric ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerSpec {
    pub user: Option<String>,
    pub group: Option<String>,
}

impl FromStr for OwnerSpec {
    type Err = InvalidOwner;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let non_empty = |part: &str| (!part.is_empty()).then(|| part.to_string());
        let (user, group) = match s.trim().split_once(':') {
            Some((user, group)) => (non_empty(user), non_empty(group)),
            None => (non_empty(s.trim()), None),
        };
        if user.is_none() && group.is_none() {
            return Err(InvalidOwner(s.to_string()));
        }
        Ok(Self { user, group })
    }
}

impl TryFrom<String> for OwnerSpec {
    type Error = InvalidOwner;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerSpec> for String {
    fn from(spec: OwnerSpec) -> Self {
        match (spec.user, spec.group) {
            (Some(user), Some(group)) => format!("{user}:{group}"),
            (Some(user), None) => user,
            (None, Some(group)) => format!(":{group}"),
            (None, None) => String::new(),
        }
    }
}

/// Owner ids resolved from an `OwnerSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    uid: Option<Uid>,
    gid: Option<Gid>,
}

impl Ownership {
    pub fn resolve(spec: &OwnerSpec) -> Result<Self, PromotionError> {
        Ok(Self {
            uid: spec.user.as_deref().map(resolve_user).transpose()?,
            gid: spec.group.as_deref().map(resolve_group).transpose()?,
        })
    }

    pub fn apply(self, path: &Path) -> Result<(), Errno> {
        chown(path, self.uid, self.gid)
    }
}

fn resolve_user(name: &str) -> Result<Uid, PromotionError> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Uid::from_raw(id));
    }
    User::from_name(name)
        .map_err(|source| PromotionError::Lookup {
            name: name.to_string(),
            source,
        })?
        .map(|user| user.uid)
        .ok_or_else(|| PromotionError::UnknownUser(name.to_string()))
}

fn resolve_group(name: &str) -> Result<Gid, PromotionError> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Gid::from_raw(id));
    }
    Group::from_name(name)
        .map_err(|source| PromotionError::Lookup {
            name: name.to_string(),
            source,
        })?
        .map(|group| group.gid)
        .ok_or_else(|| PromotionError::UnknownGroup(name.to_string()))
}

/// Hidden sibling of the live config used for staging.
pub fn staging_path(live: &Path) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    live.with_file_name(format!(".{name}.reloadconf-staging"))
}

/// A candidate snapshot sitting in the staging path.
#[derive(Debug)]
pub struct StagedCandidate {
    staging: PathBuf,
    source: PathBuf,
    fingerprint: Fingerprint,
    committed: bool,
}

impl StagedCandidate {
    /// Path of the snapshot, to be handed to the validator.
    pub fn path(&self) -> &Path {
        &self.staging
    }
}

impl Drop for StagedCandidate {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.staging) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.staging.display(), error = %e, "Failed to remove staging file");
            }
            _ => {}
        }
    }
}

/// Moves validated snapshots into the live configuration path.
#[derive(Debug, Clone)]
pub struct Promoter {
    live: PathBuf,
    staging: PathBuf,
    mode: Option<FileMode>,
    owner: Option<Ownership>,
    discard: DiscardPolicy,
}

impl Promoter {
    pub fn new(live: PathBuf) -> Self {
        let staging = staging_path(&live);
        Self {
            live,
            staging,
            mode: None,
            owner: None,
            discard: DiscardPolicy::default(),
        }
    }

    pub fn with_mode(mut self, mode: Option<FileMode>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_owner(mut self, owner: Option<Ownership>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_discard(mut self, discard: DiscardPolicy) -> Self {
        self.discard = discard;
        self
    }

    pub fn live_path(&self) -> &Path {
        &self.live
    }

    /// Copy the candidate into the staging path and flush it to disk.
    pub fn stage(&self, candidate: &Path) -> Result<StagedCandidate, PromotionError> {
        let fingerprint = Fingerprint::of(candidate).map_err(|source| PromotionError::Read {
            path: candidate.to_path_buf(),
            source,
        })?;

        if let Some(parent) = self.staging.parent() {
            fs::create_dir_all(parent).map_err(|source| PromotionError::Stage {
                path: self.staging.clone(),
                source,
            })?;
        }

        // Owned before the copy so a partial file is cleaned up on failure.
        let staged = StagedCandidate {
            staging: self.staging.clone(),
            source: candidate.to_path_buf(),
            fingerprint,
            committed: false,
        };
        copy_synced(candidate, &self.staging).map_err(|source| PromotionError::Stage {
            path: self.staging.clone(),
            source,
        })?;

        tracing::debug!(
            candidate = %candidate.display(),
            staging = %self.staging.display(),
            "Candidate staged"
        );
        Ok(staged)
    }

    /// Atomically replace the live config with the staged snapshot.
    pub fn commit(&self, mut staged: StagedCandidate) -> Result<(), PromotionError> {
        if let Some(mode) = self.mode {
            mode.apply(&staged.staging).map_err(|source| PromotionError::Mode {
                path: staged.staging.clone(),
                source,
            })?;
        }
        if let Some(owner) = self.owner {
            owner.apply(&staged.staging).map_err(|source| PromotionError::Owner {
                path: staged.staging.clone(),
                source,
            })?;
        }

        fs::rename(&staged.staging, &self.live).map_err(|source| PromotionError::Rename {
            from: staged.staging.clone(),
            to: self.live.clone(),
            source,
        })?;
        staged.committed = true;
        sync_parent(&self.live);

        tracing::info!(
            candidate = %staged.source.display(),
            live = %self.live.display(),
            "Candidate promoted"
        );
        self.consume(&staged);
        Ok(())
    }

    /// Drop a snapshot that failed validation, applying the discard policy.
    pub fn reject(&self, staged: StagedCandidate) {
        match self.discard {
            DiscardPolicy::Remove => self.consume(&staged),
            DiscardPolicy::Keep => {
                tracing::info!(candidate = %staged.source.display(), "Keeping rejected candidate");
            }
        }
    }

    /// Remove the candidate, unless it changed since it was staged.
    fn consume(&self, staged: &StagedCandidate) {
        match Fingerprint::of(&staged.source) {
            Ok(current) if current == staged.fingerprint => {
                if let Err(e) = fs::remove_file(&staged.source) {
                    tracing::warn!(path = %staged.source.display(), error = %e, "Failed to remove candidate");
                }
            }
            Ok(_) => {
                tracing::debug!(path = %staged.source.display(), "Candidate rewritten since staging, leaving it");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %staged.source.display(), error = %e, "Cannot inspect candidate");
            }
        }
    }
}

/// The target is always a fresh file; whatever a crashed run left behind
/// (read-only file, symlink) is unlinked first.
fn copy_synced(from: &Path, to: &Path) -> io::Result<()> {
    let mut src = File::open(from)?;
    match fs::remove_file(to) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut dst = OpenOptions::new().write(true).create_new(true).open(to)?;
    io::copy(&mut src, &mut dst)?;
    dst.set_permissions(src.metadata()?.permissions())?;
    dst.sync_all()
}

/// Persist the rename itself; failure only weakens crash durability.
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else { return };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::debug!(path = %parent.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        watch: PathBuf,
        live: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("incoming");
        let live = dir.path().join("etc").join("app.conf");
        fs::create_dir_all(&watch).unwrap();
        Fixture { watch, live, _dir: dir }
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/etc/app/app.conf")),
            PathBuf::from("/etc/app/.app.conf.reloadconf-staging")
        );
    }

    #[test]
    fn test_commit_replaces_live_and_consumes_candidate() {
        let fx = fixture();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "listen 80\n").unwrap();

        let promoter = Promoter::new(fx.live.clone());
        let staged = promoter.stage(&candidate).unwrap();
        assert_eq!(fs::read_to_string(staged.path()).unwrap(), "listen 80\n");
        assert!(!fx.live.exists());

        promoter.commit(staged).unwrap();
        assert_eq!(fs::read_to_string(&fx.live).unwrap(), "listen 80\n");
        assert!(!candidate.exists());
        assert!(!staging_path(&fx.live).exists());
    }

    #[test]
    fn test_reject_keeps_live_untouched() {
        let fx = fixture();
        fs::create_dir_all(fx.live.parent().unwrap()).unwrap();
        fs::write(&fx.live, "good\n").unwrap();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "bad\n").unwrap();

        let promoter = Promoter::new(fx.live.clone());
        let staged = promoter.stage(&candidate).unwrap();
        promoter.reject(staged);

        assert_eq!(fs::read_to_string(&fx.live).unwrap(), "good\n");
        assert!(!candidate.exists());
        assert!(!staging_path(&fx.live).exists());
    }

    #[test]
    fn test_keep_policy_leaves_candidate() {
        let fx = fixture();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "bad\n").unwrap();

        let promoter = Promoter::new(fx.live.clone()).with_discard(DiscardPolicy::Keep);
        let staged = promoter.stage(&candidate).unwrap();
        promoter.reject(staged);

        assert!(candidate.exists());
        assert!(!staging_path(&fx.live).exists());
    }

    #[test]
    fn test_rewritten_candidate_survives_commit() {
        let fx = fixture();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "v1\n").unwrap();

        let promoter = Promoter::new(fx.live.clone());
        let staged = promoter.stage(&candidate).unwrap();
        fs::write(&candidate, "version two\n").unwrap();
        promoter.commit(staged).unwrap();

        assert_eq!(fs::read_to_string(&fx.live).unwrap(), "v1\n");
        assert_eq!(fs::read_to_string(&candidate).unwrap(), "version two\n");
    }

    #[test]
    fn test_leftover_staging_file_is_replaced() {
        let fx = fixture();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "fresh\n").unwrap();

        let staging = staging_path(&fx.live);
        fs::create_dir_all(staging.parent().unwrap()).unwrap();
        fs::write(&staging, "stale content from an earlier run\n").unwrap();
        fs::set_permissions(&staging, Permissions::from_mode(0o444)).unwrap();

        let promoter = Promoter::new(fx.live.clone());
        let staged = promoter.stage(&candidate).unwrap();
        assert_eq!(fs::read_to_string(staged.path()).unwrap(), "fresh\n");

        promoter.commit(staged).unwrap();
        assert_eq!(fs::read_to_string(&fx.live).unwrap(), "fresh\n");
    }

    #[test]
    fn test_mode_applied_before_rename() {
        let fx = fixture();
        let candidate = fx.watch.join("app.conf");
        fs::write(&candidate, "x\n").unwrap();
        fs::set_permissions(&candidate, Permissions::from_mode(0o644)).unwrap();

        let promoter = Promoter::new(fx.live.clone()).with_mode(Some("0600".parse().unwrap()));
        let staged = promoter.stage(&candidate).unwrap();
        promoter.commit(staged).unwrap();

        let mode = fs::metadata(&fx.live).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_parse_mode_and_owner() {
        assert_eq!("0640".parse::<FileMode>().unwrap().bits(), 0o640);
        assert_eq!("0o755".parse::<FileMode>().unwrap().bits(), 0o755);
        assert!("0999".parse::<FileMode>().is_err());
        assert!("".parse::<FileMode>().is_err());

        let spec: OwnerSpec = "www-data:adm".parse().unwrap();
        assert_eq!(spec.user.as_deref(), Some("www-data"));
        assert_eq!(spec.group.as_deref(), Some("adm"));
        let spec: OwnerSpec = ":adm".parse().unwrap();
        assert!(spec.user.is_none());
        assert!(":".parse::<OwnerSpec>().is_err());
    }

    #[test]
    fn test_numeric_owner_resolves_without_lookup() {
        let spec: OwnerSpec = "2000:2000".parse().unwrap();
        let owner = Ownership::resolve(&spec).unwrap();
        assert_eq!(owner.uid, Some(Uid::from_raw(2000)));
        assert_eq!(owner.gid, Some(Gid::from_raw(2000)));
    }
}
