// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExpectationBaseline, ExpectationKey, ExpectationStore};
use crate::{
    errors::{BaselineLoadError, BaselineResetError, BaselineSaveError},
    outcome::{Outcome, TestCaseId},
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, io, io::Write};
use tracing::{debug, warn};

static JSON_SUFFIX: &str = "json";

/// A baseline store on the local filesystem.
///
/// The baseline for `(gpu, filter)` is stored as:
///
/// * `<root>/<gpu>/<filter>.json`: the full baseline, the source of truth.
/// * `<root>/<gpu>/<filter>.<Kind>`: one sorted test case per line, for each
///   non-empty outcome kind.
#[derive(Clone, Debug)]
pub struct FsExpectationStore {
    root: Utf8PathBuf,
}

impl FsExpectationStore {
    /// Creates a store rooted at `root`. The directory is created on the
    /// first save.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the directory holding every baseline of `key`'s GPU family.
    pub fn family_dir(&self, key: &ExpectationKey) -> Utf8PathBuf {
        self.root.join(key.gpu_family())
    }

    /// Returns the path of the JSON baseline for `key`.
    pub fn json_path(&self, key: &ExpectationKey) -> Utf8PathBuf {
        self.family_dir(key)
            .join(format!("{}.{JSON_SUFFIX}", key.filter()))
    }

    /// Returns the path of the plain-text list for `kind`.
    pub fn subset_path(&self, key: &ExpectationKey, kind: &Outcome) -> Utf8PathBuf {
        self.family_dir(key)
            .join(format!("{}.{}", key.filter(), kind))
    }

    /// Lists the plain-text files currently stored for `key`.
    ///
    /// A file belongs to `key` if it is named `<filter>.<suffix>` where the
    /// suffix has no further dots, so `dEQP-GLES2.info.Pass` is not mistaken
    /// for a derivative of `dEQP-GLES2`.
    fn subset_files(&self, key: &ExpectationKey) -> io::Result<Vec<Utf8PathBuf>> {
        let dir = self.family_dir(key);
        let entries = match dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let prefix = format!("{}.", key.filter());
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(suffix) = entry.file_name().strip_prefix(&prefix) else {
                continue;
            };
            if suffix.is_empty() || suffix == JSON_SUFFIX || suffix.contains('.') {
                continue;
            }
            if entry.file_type()?.is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Writes `contents` to `path` through a temporary file and a rename.
fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<(), BaselineSaveError> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| file.write_all(contents))
        .map_err(|err| BaselineSaveError::Write {
            path: path.to_owned(),
            error: match err {
                atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => error,
            },
        })
}

fn remove_if_exists(path: &Utf8Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

impl ExpectationStore for FsExpectationStore {
    fn load(&self, key: &ExpectationKey) -> Result<ExpectationBaseline, BaselineLoadError> {
        let path = self.json_path(key);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no baseline at `{path}`, starting from an empty one");
                return Ok(ExpectationBaseline::new());
            }
            Err(error) => return Err(BaselineLoadError::Read { path, error }),
        };

        let baseline = ExpectationBaseline::from_json(&json, &path)?;
        debug!(
            "loaded baseline `{path}` ({} cases in {} kinds)",
            baseline.case_count(),
            baseline.iter().count(),
        );
        Ok(baseline)
    }

    fn save(
        &self,
        key: &ExpectationKey,
        baseline: &ExpectationBaseline,
    ) -> Result<(), BaselineSaveError> {
        let dir = self.family_dir(key);
        fs::create_dir_all(&dir).map_err(|error| BaselineSaveError::CreateDir {
            path: dir.clone(),
            error,
        })?;

        // Serialize before touching anything on disk.
        let json_path = self.json_path(key);
        let json = baseline
            .to_json()
            .map_err(|error| BaselineSaveError::Serialize {
                path: json_path.clone(),
                error,
            })?;

        // Kinds that lost all their members must not linger as files.
        let stale = self
            .subset_files(key)
            .map_err(|error| BaselineSaveError::ListDir {
                path: dir.clone(),
                error,
            })?;
        for path in stale {
            remove_if_exists(&path)
                .map_err(|error| BaselineSaveError::RemoveStale { path, error })?;
        }

        for (kind, cases) in baseline {
            if !kind.is_file_suffix() {
                warn!(
                    "outcome `{kind}` in baseline {key} cannot be used as a file name; \
                     its {} cases are only recorded in the JSON baseline",
                    cases.len(),
                );
                continue;
            }
            let mut contents = String::new();
            for case_id in cases {
                contents.push_str(case_id.as_str());
                contents.push('\n');
            }
            write_atomic(&self.subset_path(key, kind), contents.as_bytes())?;
        }

        // The JSON baseline goes last: until it is replaced, the previous
        // baseline remains the one that loads.
        write_atomic(&json_path, json.as_bytes())?;
        debug!("saved baseline `{json_path}`");
        Ok(())
    }

    fn reset(&self, key: &ExpectationKey) -> Result<bool, BaselineResetError> {
        let dir = self.family_dir(key);
        let mut removed = false;

        let json_path = self.json_path(key);
        removed |= remove_if_exists(&json_path).map_err(|error| BaselineResetError::Remove {
            path: json_path,
            error,
        })?;

        let subsets = self
            .subset_files(key)
            .map_err(|error| BaselineResetError::ListDir { path: dir, error })?;
        for path in subsets {
            removed |= remove_if_exists(&path)
                .map_err(|error| BaselineResetError::Remove { path, error })?;
        }
        Ok(removed)
    }

    fn load_subset(
        &self,
        key: &ExpectationKey,
        kind: &Outcome,
    ) -> Result<Option<Vec<TestCaseId>>, BaselineLoadError> {
        if !kind.is_file_suffix() {
            return Ok(None);
        }
        let path = self.subset_path(key, kind);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(BaselineLoadError::SubsetRead { path, error }),
        };
        Ok(Some(
            contents
                .lines()
                .filter_map(|line| TestCaseId::new(line).ok())
                .collect(),
        ))
    }
}
