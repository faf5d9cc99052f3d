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

//! Delivery channels for rendered reports.

pub mod http;
pub mod local;
pub mod tcp;

/// Sender identity transmitted along with a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Application name.
    pub app_name: String,
    /// Application version, empty when unknown.
    pub app_version: String,
    /// Address the collector notifies, empty when unset.
    pub notification_email: String,
}

impl Envelope {
    /// Extracts the sender fields of a configuration.
    pub fn from_config(config: &crashtrap_core::ReportConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone().unwrap_or_default(),
            notification_email: config
                .notification_email
                .clone()
                .or_else(|| config.contact_email.clone())
                .unwrap_or_default(),
        }
    }
}
