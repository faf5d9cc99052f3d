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

//! Raw TCP delivery to a report collector.

use super::Envelope;
use crate::error::{DispatchError, DispatchResult};
use crate::payload::ReportPayload;
use crate::protocol::CollectorMessage;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Frames `payload` and writes it to `host:port`.
///
/// Returns the number of bytes written.
pub fn send(
    envelope: &Envelope,
    payload: &ReportPayload,
    host: &str,
    port: u16,
    timeout: Duration,
) -> DispatchResult<usize> {
    let endpoint = format!("{host}:{port}");
    let message = CollectorMessage {
        app_name: &envelope.app_name,
        app_version: &envelope.app_version,
        extension: &payload.extension,
        notification_email: &envelope.notification_email,
        payload: &payload.bytes,
    }
    .encode()?;

    let connect_err = |source: io::Error| {
        if source.kind() == io::ErrorKind::TimedOut || source.kind() == io::ErrorKind::WouldBlock {
            DispatchError::Timeout {
                endpoint: endpoint.clone(),
                timeout,
            }
        } else {
            DispatchError::Connect {
                endpoint: endpoint.clone(),
                source,
            }
        }
    };

    let addresses: Vec<_> = (host, port).to_socket_addrs().map_err(connect_err)?.collect();
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host resolved to no address");
    for address in addresses {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(mut stream) => {
                stream.set_write_timeout(Some(timeout)).map_err(connect_err)?;
                stream.write_all(&message).map_err(connect_err)?;
                stream.flush().map_err(connect_err)?;
                // The peer may already have closed its side.
                let _ = stream.shutdown(Shutdown::Write);
                log::debug!("Sent {} byte collector message to {}", message.len(), endpoint);
                return Ok(message.len());
            }
            Err(e) => last_error = e,
        }
    }
    Err(connect_err(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_sends_framed_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received
        });

        let envelope = Envelope {
            app_name: "demo".into(),
            app_version: "1.2".into(),
            notification_email: "ops@example.com".into(),
        };
        let payload = ReportPayload::new(b"report body".to_vec(), "demo", "log");
        let written = send(&envelope, &payload, "127.0.0.1", port, Duration::from_secs(2)).unwrap();

        let received = server.join().unwrap();
        assert_eq!(received.len(), written);
        let message = CollectorMessage::decode(&received).unwrap();
        assert_eq!(message.app_name, "demo");
        assert_eq!(message.app_version, "1.2");
        assert_eq!(message.extension, "log");
        assert_eq!(message.notification_email, "ops@example.com");
        assert_eq!(message.payload, b"report body");
    }

    #[test]
    fn test_refused_connection_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let payload = ReportPayload::new(Vec::new(), "demo", "log");
        let result = send(&Envelope::default(), &payload, "127.0.0.1", port, Duration::from_millis(500));
        assert!(matches!(
            result,
            Err(DispatchError::Connect { .. }) | Err(DispatchError::Timeout { .. })
        ));
    }
}
