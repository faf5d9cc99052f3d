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

//! Multipart HTTP upload to a web collector.

use super::Envelope;
use crate::error::{DispatchError, DispatchResult};
use crate::payload::ReportPayload;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::time::Duration;
use url::Url;

/// Form field names expected by web collectors.
pub mod fields {
    /// Always `BT01`.
    pub const SIGNATURE: &str = "protocolSignature";
    /// Always `1`.
    pub const MESSAGE_TYPE: &str = "messageType";
    /// Always `0`.
    pub const MESSAGE_FLAGS: &str = "messageFlags";
    /// Application name.
    pub const APP_NAME: &str = "appName";
    /// Application version.
    pub const APP_VERSION: &str = "appVersion";
    /// Extension of the report file.
    pub const EXTENSION: &str = "reportFileExtension";
    /// Notification address.
    pub const EMAIL: &str = "notificationEMail";
    /// The report file itself.
    pub const REPORT: &str = "reportData";
}

/// Posts `payload` to `url` and returns the response status code.
pub fn send(
    envelope: &Envelope,
    payload: &ReportPayload,
    url: &Url,
    timeout: Duration,
) -> DispatchResult<u16> {
    let endpoint = url.to_string();
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("crashtrap/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DispatchError::Http {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

    let form = Form::new()
        .text(fields::SIGNATURE, "BT01")
        .text(fields::MESSAGE_TYPE, "1")
        .text(fields::MESSAGE_FLAGS, "0")
        .text(fields::APP_NAME, envelope.app_name.clone())
        .text(fields::APP_VERSION, envelope.app_version.clone())
        .text(fields::EXTENSION, payload.extension.clone())
        .text(fields::EMAIL, envelope.notification_email.clone())
        .part(
            fields::REPORT,
            Part::bytes(payload.bytes.clone()).file_name(payload.file_name.clone()),
        );

    let response = client
        .post(url.clone())
        .multipart(form)
        .send()
        .map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout {
                    endpoint: endpoint.clone(),
                    timeout,
                }
            } else {
                DispatchError::Http {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::Http {
            endpoint,
            reason: format!("server answered {status}"),
        });
    }
    log::debug!("Uploaded {} byte report to {}", payload.len(), endpoint);
    Ok(status.as_u16())
}
