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

//! Best-effort delivery of reports.

use crate::error::{DispatchError, DispatchResult};
use crate::payload::ReportPayload;
use crate::transport::{self, Envelope};
use crashtrap_core::{LogLevel, Report, ReportConfig, SupportEndpoint};
use crashtrap_log::LogRegistry;
use crossbeam_channel::RecvTimeoutError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where a payload goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A directory on the local file system.
    LocalDir(PathBuf),
    /// A collector service reached over raw TCP.
    Collector {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// A web collector reached with an HTTP POST.
    Http(Url),
}

impl Destination {
    /// The remote destination of a configured endpoint, if any.
    pub fn from_endpoint(endpoint: &SupportEndpoint) -> Option<Self> {
        match endpoint {
            SupportEndpoint::None => None,
            SupportEndpoint::Collector { host, port } => Some(Destination::Collector {
                host: host.clone(),
                port: *port,
            }),
            SupportEndpoint::Http { url } => Some(Destination::Http(url.clone())),
        }
    }

    /// Returns `true` for destinations that leave the machine.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Destination::LocalDir(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::LocalDir(dir) => write!(f, "{}", dir.display()),
            Destination::Collector { host, port } => write!(f, "{host}:{port}"),
            Destination::Http(url) => write!(f, "{url}"),
        }
    }
}

/// Proof of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Destination, rendered for display.
    pub destination: String,
    /// Bytes handed to the destination.
    pub bytes: usize,
    /// File written, for local destinations.
    pub saved_to: Option<PathBuf>,
    /// Response status, for HTTP destinations.
    pub status: Option<u16>,
}

/// Outcome of [`ReportDispatcher::dispatch_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Local copy of the report.
    pub saved: Option<PathBuf>,
    /// Remote delivery.
    pub sent: Option<DispatchReceipt>,
    /// One line per failed step.
    pub failures: Vec<String>,
}

impl DispatchSummary {
    /// Returns `true` if no step failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Saves and sends payloads.
///
/// Remote attempts run on a helper thread and are abandoned once the
/// timeout elapses; the dispatcher never retries. The helper thread keeps
/// running until its own socket timeouts fire, but the caller is released.
#[derive(Debug, Clone)]
pub struct ReportDispatcher {
    envelope: Envelope,
    timeout: Duration,
    journal: Option<LogRegistry>,
}

impl ReportDispatcher {
    /// A dispatcher identifying itself with the fields of `config`.
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            envelope: Envelope::from_config(config),
            timeout: config.dispatch_timeout(),
            journal: None,
        }
    }

    /// Records failures as `WARNING` entries in every store of `journal`.
    pub fn with_journal(mut self, journal: LogRegistry) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Overrides the bound on remote attempts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound on remote attempts.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delivers `payload` to `destination` once.
    pub fn dispatch(
        &self,
        payload: &ReportPayload,
        destination: &Destination,
    ) -> DispatchResult<DispatchReceipt> {
        let name = destination.to_string();
        match destination {
            Destination::LocalDir(dir) => {
                let path = transport::local::save(payload, dir)?;
                Ok(DispatchReceipt {
                    destination: name,
                    bytes: payload.len(),
                    saved_to: Some(path),
                    status: None,
                })
            }
            remote => {
                let (bytes, status) = self.send_bounded(payload, remote.clone())?;
                log::info!("Report '{}' delivered to {}", payload.file_name, name);
                Ok(DispatchReceipt {
                    destination: name,
                    bytes,
                    saved_to: None,
                    status,
                })
            }
        }
    }

    /// Renders `report` and runs the configured activity.
    ///
    /// The local copy is written before any remote attempt. Every failure is
    /// journaled and listed in the summary; nothing is propagated.
    pub fn dispatch_report(
        &self,
        report: &Report,
        config: &ReportConfig,
        attachments: &[PathBuf],
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let payload = match ReportPayload::build(report, config, attachments) {
            Ok(payload) => payload,
            Err(e) => {
                self.record_failure(&mut summary, "render report", &e);
                return summary;
            }
        };

        if config.activity.saves() {
            let local = Destination::LocalDir(config.resolved_report_dir());
            match self.dispatch(&payload, &local) {
                Ok(receipt) => summary.saved = receipt.saved_to,
                Err(e) => self.record_failure(&mut summary, "save report", &e),
            }
        }

        if config.activity.sends() {
            if let Some(remote) = Destination::from_endpoint(&config.endpoint) {
                match self.dispatch(&payload, &remote) {
                    Ok(receipt) => summary.sent = Some(receipt),
                    Err(e) => self.record_failure(&mut summary, "send report", &e),
                }
            }
        }
        summary
    }

    fn send_bounded(
        &self,
        payload: &ReportPayload,
        destination: Destination,
    ) -> DispatchResult<(usize, Option<u16>)> {
        let endpoint = destination.to_string();
        let timeout = self.timeout;
        let envelope = self.envelope.clone();
        let payload = Arc::new(payload.clone());
        let (sender, receiver) = crossbeam_channel::bounded(1);

        let task = {
            let payload = Arc::clone(&payload);
            let envelope = envelope.clone();
            let destination = destination.clone();
            move || {
                // The receiver is gone if the caller already timed out.
                let _ = sender.send(send_remote(&envelope, &payload, &destination, timeout));
            }
        };
        let spawned = std::thread::Builder::new()
            .name("crashtrap-dispatch".into())
            .spawn(task);
        if let Err(e) = spawned {
            log::warn!("Cannot start delivery thread ({e}); sending inline");
            return send_remote(&envelope, &payload, &destination, timeout);
        }

        match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DispatchError::Timeout { endpoint, timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Aborted { endpoint }),
        }
    }

    fn record_failure(&self, summary: &mut DispatchSummary, step: &str, error: &DispatchError) {
        let line = format!("cannot {step}: {error}");
        log::warn!("{line}");
        if let Some(journal) = &self.journal {
            journal.append_all_from_fault(LogLevel::Warning, &line);
        }
        summary.failures.push(line);
    }
}

fn send_remote(
    envelope: &Envelope,
    payload: &ReportPayload,
    destination: &Destination,
    timeout: Duration,
) -> DispatchResult<(usize, Option<u16>)> {
    match destination {
        Destination::Collector { host, port } => {
            transport::tcp::send(envelope, payload, host, *port, timeout).map(|n| (n, None))
        }
        Destination::Http(url) => {
            transport::http::send(envelope, payload, url, timeout).map(|s| (payload.len(), Some(s)))
        }
        Destination::LocalDir(_) => Err(DispatchError::NoDestination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_endpoint() {
        assert_eq!(Destination::from_endpoint(&SupportEndpoint::None), None);
        let collector = Destination::from_endpoint(&SupportEndpoint::collector("reports.local")).unwrap();
        assert_eq!(collector.to_string(), "reports.local:9999");
        assert!(collector.is_remote());
        let http = SupportEndpoint::http("https://example.com/upload").unwrap();
        assert!(matches!(Destination::from_endpoint(&http), Some(Destination::Http(_))));
    }

    #[test]
    fn test_silent_collector_times_out() {
        // Never accepted: the write stalls once the socket buffers are full.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let dispatcher = ReportDispatcher::new(&ReportConfig::new("demo"))
            .with_timeout(Duration::from_millis(200));
        let payload = ReportPayload::new(vec![0; 32 * 1024 * 1024], "big", "log");

        let started = std::time::Instant::now();
        let result = dispatcher.dispatch(
            &payload,
            &Destination::Collector {
                host: "127.0.0.1".into(),
                port,
            },
        );

        assert!(matches!(result, Err(DispatchError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }
}
