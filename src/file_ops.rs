//! File and directory churning
//!
//! All filesystem side effects live here: choosing target names, skipping
//! work that is already done, writing through temporary files so a failed
//! churn never leaves a partial target behind, and removing sources.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::derive::{SALT_LEN, Salt, derive_salt};
use crate::engine::{self, ChurnDirection, ChurnOptions, ChurnSummary, Verification};
use crate::error::{ChurnError, ErrorCategory, ErrorKind, Result};
use crate::params::{ChurnParams, FolderChurnParams};

/// Suffix of encrypted containers
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Suffix of side files holding per-block tags
pub const TAG_FILE_SUFFIX: &str = ".gmac";

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChurnOutcome {
    /// The target already existed and no redo was requested.
    Skipped { target: PathBuf },
    /// The target was written and is in place.
    Committed {
        target: PathBuf,
        summary: ChurnSummary,
    },
}

impl ChurnOutcome {
    pub fn target(&self) -> &Path {
        match self {
            ChurnOutcome::Skipped { target } | ChurnOutcome::Committed { target, .. } => target,
        }
    }
}

/// Encrypts or decrypts one file according to `params`.
///
/// Encrypted targets are named `<salt-hex><extension>.enc` next to the
/// source; decrypted targets drop the `.enc` suffix. `target_name` replaces
/// either with a name in the source's directory. Unless `KEEP_SOURCE` is set
/// the source is removed afterwards, including when the churn was skipped.
pub fn churn_file(
    source: &Path,
    secret: &[u8],
    params: ChurnParams,
    target_name: Option<&str>,
) -> Result<ChurnOutcome> {
    let direction = params.direction();
    debug!(source = %source.display(), ?params, "resolving churn");

    let metadata = fs::metadata(source).map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidArgument,
            format!("{} does not exist", source.display()),
            e,
        )
    })?;
    if !metadata.is_file() {
        return Err(ChurnError::invalid_argument(format!(
            "{} is not a file",
            source.display()
        )));
    }

    let outcome = {
        let mut input = File::open(source).map_err(|e| ChurnError::path("open", source, e))?;
        let salt = match direction {
            ChurnDirection::Encrypt => derive_salt(&mut input)?,
            ChurnDirection::Decrypt => salt_from_name(source)?,
        };
        let target = target_path(source, direction, &salt, target_name)?;
        let tag_path = tag_file_path(match direction {
            ChurnDirection::Encrypt => &target,
            ChurnDirection::Decrypt => source,
        });

        if !needs_churn(&target, &tag_path, params) {
            info!(target = %target.display(), "target exists, skipping");
            ChurnOutcome::Skipped { target }
        } else {
            debug!(target = %target.display(), backend = %params.backend(), "churning");
            let tags = params
                .contains(ChurnParams::SUBJECT_AUTHENTICATION)
                .then_some(tag_path.as_path());
            let summary = churn_into(&mut input, &target, tags, &salt, secret, params)
                .map_err(|e| {
                    warn!(source = %source.display(), error = %e, "churn rolled back");
                    e.with_context(format!("failed to {} {}", verb(direction), source.display()))
                })?;
            info!(
                target = %target.display(),
                blocks = summary.blocks,
                bytes = summary.payload_bytes,
                "committed"
            );
            ChurnOutcome::Committed { target, summary }
        }
    };

    if !params.contains(ChurnParams::KEEP_SOURCE) {
        fs::remove_file(source).map_err(|e| ChurnError::path("delete", source, e))?;
        debug!(source = %source.display(), "deleted source");
    }

    Ok(outcome)
}

/// Churns every eligible file under `dir`.
///
/// Decryption picks up `.enc` files; encryption picks up every other regular
/// file except `.gmac` side files. Subdirectories are walked unless
/// `IS_SHALLOW` is set. Files are collected before any is churned so new
/// targets are never revisited. The first failure stops the walk.
pub fn churn_dir(
    dir: &Path,
    secret: &[u8],
    folder_params: FolderChurnParams,
    params: ChurnParams,
) -> Result<Vec<ChurnOutcome>> {
    let metadata = fs::metadata(dir).map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidArgument,
            format!("{} does not exist", dir.display()),
            e,
        )
    })?;
    if !metadata.is_dir() {
        return Err(ChurnError::invalid_argument(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let recurse = !folder_params.contains(FolderChurnParams::IS_SHALLOW);
    let mut files = Vec::new();
    collect_files(dir, params.direction(), recurse, &mut files)?;
    info!(dir = %dir.display(), files = files.len(), recurse, "churning directory");

    files
        .iter()
        .map(|file| churn_file(file, secret, params, None))
        .collect()
}

fn churn_into(
    input: &mut File,
    target: &Path,
    tag_path: Option<&Path>,
    salt: &Salt,
    secret: &[u8],
    params: ChurnParams,
) -> Result<ChurnSummary> {
    let direction = params.direction();
    let verification = if params.contains(ChurnParams::SKIP_AUTHENTICATION) {
        Verification::Skip
    } else {
        Verification::Verify
    };

    let mut tag_input = match (direction, tag_path, verification) {
        (ChurnDirection::Decrypt, Some(path), Verification::Verify) => {
            Some(File::open(path).map_err(|e| {
                ChurnError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::InvalidArgument,
                    format!("tag file {} cannot be opened", path.display()),
                    e,
                )
            })?)
        }
        _ => None,
    };

    remove_stale(target)?;
    if let (ChurnDirection::Encrypt, Some(path)) = (direction, tag_path) {
        remove_stale(path)?;
    }

    let dir = parent_dir(target);
    let mut staged = stage_in(dir)?;
    let mut staged_tags = match (direction, tag_path) {
        (ChurnDirection::Encrypt, Some(_)) => Some(stage_in(dir)?),
        _ => None,
    };

    let mut options = ChurnOptions::default().with_verification(verification);
    if let Some(tags) = staged_tags.as_mut() {
        options = options.with_tag_stream(tags.as_file_mut());
    }
    if let Some(tags) = tag_input.as_mut() {
        options = options.with_tag_stream(tags);
    } else if direction == ChurnDirection::Decrypt && tag_path.is_some() {
        options = options.with_detached_tags();
    }

    let summary = engine::churn(
        input,
        staged.as_file_mut(),
        direction,
        params.backend(),
        secret,
        salt,
        options,
    )?;

    if let (Some(tags), Some(path)) = (staged_tags, tag_path) {
        commit(tags, path)?;
    }
    if let Err(e) = commit(staged, target) {
        if let (ChurnDirection::Encrypt, Some(path)) = (direction, tag_path) {
            if let Err(cleanup) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove tag file");
            }
        }
        return Err(e);
    }

    Ok(summary)
}

/// Target of a churn, checked not to coincide with the source.
fn target_path(
    source: &Path,
    direction: ChurnDirection,
    salt: &Salt,
    target_name: Option<&str>,
) -> Result<PathBuf> {
    let dir = parent_dir(source);
    let target = match (target_name, direction) {
        (Some(name), _) => dir.join(name),
        (None, ChurnDirection::Encrypt) => {
            let extension = source
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            dir.join(format!("{}{}{}", salt.to_hex(), extension, ENCRYPTED_SUFFIX).to_lowercase())
        }
        (None, ChurnDirection::Decrypt) => {
            let stripped = file_name(source)?
                .strip_suffix(ENCRYPTED_SUFFIX)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    ChurnError::invalid_argument(format!(
                        "{} does not end in {}",
                        source.display(),
                        ENCRYPTED_SUFFIX
                    ))
                })?;
            dir.join(stripped)
        }
    };

    if target == source {
        return Err(ChurnError::invalid_argument(format!(
            "target {} would overwrite the source",
            target.display()
        )));
    }
    Ok(target)
}

/// Parses the salt carried in the first 64 characters of an encrypted file's name.
fn salt_from_name(source: &Path) -> Result<Salt> {
    let name = file_name(source)?;
    let missing = || format!("{} does not start with a salt", source.display());
    let prefix = name
        .get(..SALT_LEN * 2)
        .ok_or_else(|| ChurnError::invalid_argument(missing()))?;
    Salt::from_hex(prefix).map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidArgument,
            missing(),
            e,
        )
    })
}

fn needs_churn(target: &Path, tag_path: &Path, params: ChurnParams) -> bool {
    !target.exists()
        || params.contains(ChurnParams::REDO_TARGET)
        || (params.contains(ChurnParams::SUBJECT_AUTHENTICATION)
            && params.direction() == ChurnDirection::Encrypt
            && !tag_path.exists())
}

fn collect_files(
    dir: &Path,
    direction: ChurnDirection,
    recurse: bool,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .map_err(|e| ChurnError::path("read directory", dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ChurnError::path("inspect", &path, e))?;
        if file_type.is_dir() {
            if recurse {
                collect_files(&path, direction, recurse, files)?;
            }
        } else if file_type.is_file() && is_eligible(&path, direction) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_eligible(path: &Path, direction: ChurnDirection) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    match direction {
        ChurnDirection::Decrypt => name.ends_with(ENCRYPTED_SUFFIX),
        ChurnDirection::Encrypt => {
            !name.ends_with(ENCRYPTED_SUFFIX) && !name.ends_with(TAG_FILE_SUFFIX)
        }
    }
}

fn tag_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TAG_FILE_SUFFIX);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ChurnError::invalid_argument(format!("{} has no UTF-8 file name", path.display()))
        })
}

fn verb(direction: ChurnDirection) -> &'static str {
    match direction {
        ChurnDirection::Encrypt => "encrypt",
        ChurnDirection::Decrypt => "decrypt",
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChurnError::path("remove", path, e)),
    }
}

fn stage_in(dir: &Path) -> Result<NamedTempFile> {
    NamedTempFile::new_in(dir).map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })
}

/// Syncs a staged file and renames it onto `path`.
fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    // Flush and fsync() such that the rename, if it succeeds, always points
    // to a complete file.
    staged.as_file().sync_all().map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;
    staged.persist(path).map_err(|e| {
        ChurnError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}
