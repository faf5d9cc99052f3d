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

//! Report configuration.
//!
//! One [`ReportConfig`] describes who the application is, where reports go
//! and how much they contain. It is usually built in code at startup or
//! loaded from a JSON file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default collector port.
pub const DEFAULT_COLLECTOR_PORT: u16 = 9999;

/// Default bound on a single dispatch attempt.
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 5_000;

crate::crashtrap_bitflags! {
    /// Options controlling report content and post-report behavior.
    pub struct ReportFlags: u32 {
        /// Include extended diagnostics (environment, command line, system details).
        const DETAILED_MODE = 1 << 0;
        /// Bundle the open log files with the report in a zip archive.
        const ATTACH_REPORT = 1 << 1;
        /// Include a screen capture. Needs a GUI collaborator; ignored here.
        const SCREEN_CAPTURE = 1 << 2;
        /// Let the user edit the mail before sending. UI concern; recorded only.
        const EDIT_MAIL = 1 << 3;
        /// Relaunch the executable after the report is handled.
        const RESTART_APP = 1 << 4;
    }
}

/// Encoding of the rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Plain text.
    #[default]
    Text,
    /// XML document.
    Xml,
}

impl ReportFormat {
    /// File extension of a rendered report.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "log",
            ReportFormat::Xml => "xml",
        }
    }
}

/// Whether the operating system may write a core file for the crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpPolicy {
    /// Suppress core files.
    None,
    /// Leave the process core limit untouched.
    #[default]
    Mini,
    /// Raise the core limit to its hard maximum.
    Full,
}

/// What happens to a report once it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportActivity {
    /// Only log the summary.
    None,
    /// Persist the report in the report directory.
    Save,
    /// Send the report to the support endpoint.
    Send,
    /// Persist locally, then send.
    #[default]
    SaveAndSend,
}

impl ReportActivity {
    /// Returns `true` if the report is written to disk.
    pub fn saves(&self) -> bool {
        matches!(self, ReportActivity::Save | ReportActivity::SaveAndSend)
    }

    /// Returns `true` if the report is sent to the endpoint.
    pub fn sends(&self) -> bool {
        matches!(self, ReportActivity::Send | ReportActivity::SaveAndSend)
    }
}

/// What the fault handler does after reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    /// Terminate the process with the original signal or an abort.
    #[default]
    Terminate,
    /// Hand the fault to whatever handler was installed before.
    ContinueSearch,
    /// Return to the faulting code. Unsafe for most native faults.
    Resume,
}

/// Remote collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SupportEndpoint {
    /// Reports are not sent anywhere.
    #[default]
    None,
    /// A collector service reachable over TCP.
    Collector {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// A web collector accepting multipart POSTs.
    Http {
        /// Upload URL.
        url: Url,
    },
}

impl SupportEndpoint {
    /// Collector endpoint on the default port.
    pub fn collector(host: impl Into<String>) -> Self {
        SupportEndpoint::Collector {
            host: host.into(),
            port: DEFAULT_COLLECTOR_PORT,
        }
    }

    /// Parses and wraps an HTTP upload URL.
    pub fn http(url: &str) -> ConfigResult<Self> {
        let url = Url::parse(url).map_err(|e| ConfigError::Invalid {
            field: "endpoint.url",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(SupportEndpoint::Http { url }),
            other => Err(ConfigError::Invalid {
                field: "endpoint.url",
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    /// Returns `true` if reports can be sent.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SupportEndpoint::None)
    }
}

impl fmt::Display for SupportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportEndpoint::None => f.write_str("none"),
            SupportEndpoint::Collector { host, port } => write!(f, "{host}:{port}"),
            SupportEndpoint::Http { url } => write!(f, "{url}"),
        }
    }
}

/// Global report settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Application name. Used for report file names and sent to the collector.
    pub app_name: String,
    /// Application version.
    pub app_version: Option<String>,
    /// Support contact shown in reports.
    pub contact_email: Option<String>,
    /// Address the collector notifies when a report arrives.
    pub notification_email: Option<String>,
    /// Where reports are sent.
    pub endpoint: SupportEndpoint,
    /// Content and behavior options.
    pub flags: ReportFlags,
    /// Rendered report encoding.
    pub format: ReportFormat,
    /// Core file policy.
    pub dump: DumpPolicy,
    /// Save and/or send.
    pub activity: ReportActivity,
    /// What the handler does after reporting.
    pub exit_mode: ExitMode,
    /// Directory for saved reports. Defaults to `<tmp>/<app_name>`.
    pub report_dir: Option<PathBuf>,
    /// Free text added to every report.
    pub user_message: Option<String>,
    /// Upper bound of one remote dispatch, in milliseconds.
    pub dispatch_timeout_ms: u64,
    /// Only report faults whose stack passes through this module.
    pub module_filter: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            app_name: "application".to_string(),
            app_version: None,
            contact_email: None,
            notification_email: None,
            endpoint: SupportEndpoint::None,
            flags: ReportFlags::EMPTY,
            format: ReportFormat::Text,
            dump: DumpPolicy::Mini,
            activity: ReportActivity::SaveAndSend,
            exit_mode: ExitMode::Terminate,
            report_dir: None,
            user_message: None,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            module_filter: None,
        }
    }
}

impl ReportConfig {
    /// Creates a configuration for `app_name` with default settings.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Sets the application version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Sets the support contact.
    pub fn with_contact(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    /// Sets the remote endpoint.
    pub fn with_endpoint(mut self, endpoint: SupportEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Replaces the flag set.
    pub fn with_flags(mut self, flags: ReportFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the report encoding.
    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the save/send activity.
    pub fn with_activity(mut self, activity: ReportActivity) -> Self {
        self.activity = activity;
        self
    }

    /// Sets the post-report behavior.
    pub fn with_exit_mode(mut self, exit_mode: ExitMode) -> Self {
        self.exit_mode = exit_mode;
        self
    }

    /// Sets the report directory.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Sets the dispatch timeout.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Dispatch timeout as a [`Duration`].
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Directory reports are saved to.
    pub fn resolved_report_dir(&self) -> PathBuf {
        self.report_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(&self.app_name))
    }

    /// Checks the values that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "app_name",
                reason: "must not be empty".into(),
            });
        }
        if let SupportEndpoint::Collector { host, port } = &self.endpoint {
            if host.trim().is_empty() || *port == 0 {
                return Err(ConfigError::Invalid {
                    field: "endpoint",
                    reason: format!("'{host}:{port}' is not a usable collector address"),
                });
            }
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
