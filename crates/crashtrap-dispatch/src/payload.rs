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

//! The bytes handed to a transport.

use crate::error::{DispatchError, DispatchResult};
use crate::render;
use crashtrap_core::{Report, ReportConfig, ReportFlags};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A rendered report, possibly bundled with log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPayload {
    /// Encoded content.
    pub bytes: Vec<u8>,
    /// Extension without the dot: `log`, `xml` or `zip`.
    pub extension: String,
    /// File name used when saving or uploading.
    pub file_name: String,
}

impl ReportPayload {
    /// Wraps already encoded bytes.
    pub fn new(bytes: Vec<u8>, stem: &str, extension: &str) -> Self {
        Self {
            bytes,
            extension: extension.to_owned(),
            file_name: format!("{stem}.{extension}"),
        }
    }

    /// Renders `report` as configured.
    ///
    /// With [`ReportFlags::ATTACH_REPORT`] the rendered report and every
    /// readable file of `attachments` are packed into a zip archive. An
    /// attachment that cannot be read is skipped and noted in the archive.
    /// If the archive cannot be built, the plain rendered report is used.
    pub fn build(
        report: &Report,
        config: &ReportConfig,
        attachments: &[PathBuf],
    ) -> DispatchResult<Self> {
        let rendered = render::render(report, config.format)?;
        let stem = report.file_stem();
        let extension = config.format.extension();
        if !config.flags.contains(ReportFlags::ATTACH_REPORT) {
            return Ok(Self::new(rendered, &stem, extension));
        }
        match bundle(&format!("{stem}.{extension}"), &rendered, attachments) {
            Ok(bundle) => Ok(Self::new(bundle, &stem, "zip")),
            Err(err) => {
                log::warn!("Cannot bundle attachments, sending the report alone: {err}");
                Ok(Self::new(rendered, &stem, extension))
            }
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn bundle(report_name: &str, report: &[u8], attachments: &[PathBuf]) -> DispatchResult<Vec<u8>> {
    let zip_err = |e: zip::result::ZipError| DispatchError::Encode(e.to_string());
    let io_err = |e: std::io::Error| DispatchError::Encode(e.to_string());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file(report_name, options).map_err(zip_err)?;
    zip.write_all(report).map_err(io_err)?;

    let mut skipped = Vec::new();
    let mut names = HashSet::new();
    for path in attachments {
        match std::fs::read(path) {
            Ok(content) => {
                zip.start_file(entry_name(path, &mut names), options)
                    .map_err(zip_err)?;
                zip.write_all(&content).map_err(io_err)?;
            }
            Err(e) => {
                log::warn!("Not attaching '{}': {}", path.display(), e);
                skipped.push(format!("{}: {}\n", path.display(), e));
            }
        }
    }
    if !skipped.is_empty() {
        zip.start_file("missing-attachments.txt", options).map_err(zip_err)?;
        zip.write_all(skipped.concat().as_bytes()).map_err(io_err)?;
    }

    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

/// `logs/<file name>`, with a numeric suffix on the stem when an earlier
/// attachment already took that name.
fn entry_name(path: &Path, taken: &mut HashSet<String>) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_owned());
    let mut candidate = format!("logs/{file_name}");
    let mut counter = 1;
    while taken.contains(&candidate) {
        candidate = match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) => format!(
                "logs/{}-{counter}.{}",
                stem.to_string_lossy(),
                ext.to_string_lossy()
            ),
            _ => format!("logs/{file_name}-{counter}"),
        };
        counter += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashtrap_core::{ContextSummary, FaultKind, ReportFormat};

    fn report(config: &ReportConfig) -> Report {
        let context = ContextSummary::for_current_thread(FaultKind::Snapshot, "manual");
        Report::builder(config, context).build()
    }

    #[test]
    fn test_plain_payload_uses_format_extension() {
        let config = ReportConfig::new("demo").with_format(ReportFormat::Xml);
        let report = report(&config);
        let payload = ReportPayload::build(&report, &config, &[]).unwrap();
        assert_eq!(payload.extension, "xml");
        assert_eq!(payload.file_name, format!("{}.xml", report.file_stem()));
        assert!(payload.bytes.starts_with(b"<?xml"));
    }

    #[test]
    fn test_attached_payload_is_zip() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "[2025/01/01 00:00:00] INFO: hi\n").unwrap();
        let config = ReportConfig::new("demo").with_flags(ReportFlags::ATTACH_REPORT);
        let report = report(&config);

        let payload =
            ReportPayload::build(&report, &config, &[log, dir.path().join("gone.log")]).unwrap();

        assert_eq!(payload.extension, "zip");
        assert!(payload.bytes.starts_with(b"PK\x03\x04"));
        let archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        let names: Vec<_> = archive.file_names().map(str::to_owned).collect();
        assert!(names.contains(&"logs/app.log".to_owned()));
        assert!(names.contains(&"missing-attachments.txt".to_owned()));
        assert!(names.iter().any(|n| n.ends_with(".log") && n.starts_with("demo_")));
    }

    #[test]
    fn test_attachments_with_same_file_name_are_all_bundled() {
        let dir = tempfile::tempdir().unwrap();
        let mut attachments = Vec::new();
        for sub in ["a", "b", "c"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            let log = dir.path().join(sub).join("app.log");
            std::fs::write(&log, format!("from {sub}\n")).unwrap();
            attachments.push(log);
        }
        let config = ReportConfig::new("demo").with_flags(ReportFlags::ATTACH_REPORT);
        let report = report(&config);

        let payload = ReportPayload::build(&report, &config, &attachments).unwrap();

        assert_eq!(payload.extension, "zip");
        let mut archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        for (name, expected) in [
            ("logs/app.log", "from a\n"),
            ("logs/app-1.log", "from b\n"),
            ("logs/app-2.log", "from c\n"),
        ] {
            let mut content = String::new();
            std::io::Read::read_to_string(&mut archive.by_name(name).unwrap(), &mut content)
                .unwrap();
            assert_eq!(content, expected);
        }
    }

    #[test]
    fn test_entry_name_skips_every_taken_suffix() {
        let mut taken = HashSet::new();
        taken.insert("logs/app-1.log".to_owned());
        let path = Path::new("/var/log/app.log");
        assert_eq!(entry_name(path, &mut taken), "logs/app.log");
        assert_eq!(entry_name(path, &mut taken), "logs/app-2.log");
        assert_eq!(entry_name(Path::new("/tmp/trace"), &mut taken), "logs/trace");
        assert_eq!(entry_name(Path::new("/opt/trace"), &mut taken), "logs/trace-1");
    }
}
