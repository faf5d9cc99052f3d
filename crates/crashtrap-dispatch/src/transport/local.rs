// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Saving reports to a directory.

use crate::error::{DispatchError, DispatchResult};
use crate::payload::ReportPayload;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes `payload` into `dir`, creating it if needed.
///
/// An existing file of the same name gets a numeric suffix instead of
/// being replaced.
pub fn save(payload: &ReportPayload, dir: &Path) -> DispatchResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

    let path = free_path(dir, &payload.file_name, &payload.extension);
    fs::write(&path, &payload.bytes).map_err(|source| io_error(&path, source))?;
    log::debug!("Saved {} byte report to '{}'", payload.len(), path.display());
    Ok(path)
}

fn io_error(path: &Path, source: std::io::Error) -> DispatchError {
    DispatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn free_path(dir: &Path, file_name: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name
        .strip_suffix(&format!(".{extension}"))
        .unwrap_or(file_name);
    (1..)
        .map(|n| dir.join(format!("{stem}-{n}.{extension}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_creates_directory_and_avoids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("reports");
        let payload = ReportPayload::new(b"first".to_vec(), "demo", "log");

        let first = save(&payload, &target).unwrap();
        let second = save(&ReportPayload::new(b"second".to_vec(), "demo", "log"), &target).unwrap();

        assert_eq!(first, target.join("demo.log"));
        assert_eq!(second, target.join("demo-1.log"));
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert_eq!(fs::read(&second).unwrap(), b"second");
    }
}
