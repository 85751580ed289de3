//! Drives a session against a transport until the sync completes.

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::session::{ServerAlertedStart, SessionHandler, SessionStep};
use crate::transport::{Transport, TransportData, TransportEvent};
use crate::types::{Role, SyncState};
use syncml_wire::{san, wbxml};

pub struct SyncAgent {
    session: SessionHandler,
    transport: Box<dyn Transport>,
}

/// Terminal outcome of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub state: SyncState,
    pub description: String,
}

impl SyncAgent {
    pub fn new(mut session: SessionHandler, transport: Box<dyn Transport>) -> SyncAgent {
        session.set_transport_caps(transport.max_tx_size(), transport.max_rx_size());
        SyncAgent { session, transport }
    }

    pub fn session(&self) -> &SessionHandler {
        &self.session
    }

    /// Run a client-initiated sync to completion.
    pub async fn run_client(&mut self) -> SyncOutcome {
        if let Err(error) = self.session.start_client() {
            warn!(%error, "could not initiate sync");
            return self.outcome();
        }
        self.drive(true).await
    }

    /// Run a client session started by a received SAN message.
    pub async fn run_client_from_san(&mut self, san_bytes: &[u8]) -> SyncOutcome {
        if self.session.handle_san(san_bytes).is_err() || self.session.is_finished() {
            return self.outcome();
        }
        self.drive(true).await
    }

    /// Serve one inbound sync session in the server role: wait for the
    /// client's first message, then alternate responses.
    pub async fn run_server(&mut self) -> SyncOutcome {
        self.session.serve();
        self.receive_loop().await
    }

    /// Start a server-alerted session. For DS 1.2 the SAN goes through
    /// the transport's push channel; for DS 1.1 the alert package is sent
    /// as a regular message.
    pub async fn run_server_alerted(&mut self) -> SyncOutcome {
        match self.session.start_server_alerted() {
            Ok(ServerAlertedStart::San(message)) => {
                if let Err(error) = self.transport.send_san(message).await {
                    self.session
                        .abort_sync(SyncState::ConnectionError, &error.to_string());
                    return self.outcome();
                }
                self.receive_loop().await
            }
            Ok(ServerAlertedStart::Respond) => self.drive(false).await,
            Err(_) => self.outcome(),
        }
    }

    /// Send-first loop: emit the pending message, then wait for the
    /// answer. The first request honors `http-number-of-resend-attempts`.
    async fn drive(&mut self, first_message_resend: bool) -> SyncOutcome {
        let mut first = first_message_resend;

        loop {
            if self.session.is_finished() {
                break;
            }

            let payload = match self.session.generate_message() {
                Ok(payload) => payload,
                Err(error) => {
                    self.session.abort_sync(SyncState::InternalError, &error.to_string());
                    break;
                }
            };
            let encoding = self.session.encoding();

            if let Err(error) = self.transport.send_syncml(payload.clone(), encoding).await {
                self.session.abort_sync(SyncState::ConnectionError, &error.to_string());
                break;
            }

            if self.session.is_finished() {
                // The server's final flush completes the session.
                break;
            }

            let mut attempts_left =
                if first { self.resend_attempts() } else { 0 };
            first = false;

            let data = loop {
                match self.transport.receive().await {
                    Ok(TransportData::Event(TransportEvent::Timeout, reason))
                        if attempts_left > 0 =>
                    {
                        debug!(attempts_left, reason, "first request timed out, resending");
                        attempts_left -= 1;
                        if let Err(error) =
                            self.transport.send_syncml(payload.clone(), encoding).await
                        {
                            self.session
                                .abort_sync(SyncState::ConnectionError, &error.to_string());
                            break None;
                        }
                    }
                    Ok(data) => break Some(data),
                    Err(error) => {
                        self.session.abort_sync(SyncState::ConnectionError, &error.to_string());
                        break None;
                    }
                }
            };

            let Some(data) = data else { break };
            match self.handle_payload(data) {
                Some(SessionStep::Respond) => continue,
                _ => break,
            }
        }

        self.outcome()
    }

    /// Receive-first loop used by the serving side.
    async fn receive_loop(&mut self) -> SyncOutcome {
        loop {
            if self.session.is_finished() {
                break;
            }

            let data = match self.transport.receive().await {
                Ok(data) => data,
                Err(error) => {
                    self.session.abort_sync(SyncState::ConnectionError, &error.to_string());
                    break;
                }
            };

            match self.handle_payload(data) {
                Some(SessionStep::Respond) => {
                    let payload = match self.session.generate_message() {
                        Ok(payload) => payload,
                        Err(error) => {
                            self.session
                                .abort_sync(SyncState::InternalError, &error.to_string());
                            break;
                        }
                    };
                    let encoding = self.session.encoding();
                    if let Err(error) = self.transport.send_syncml(payload, encoding).await {
                        self.session.abort_sync(SyncState::ConnectionError, &error.to_string());
                        break;
                    }
                }
                _ => break,
            }
        }

        self.outcome()
    }

    /// Dispatch one received payload into the session. Returns the next
    /// step, or `None` when the session ended.
    fn handle_payload(&mut self, data: TransportData) -> Option<SessionStep> {
        let step = match data {
            TransportData::SyncMl(bytes) => {
                // A SAN sometimes arrives under the WbXML content type;
                // when WbXML decoding fails, fall back to SAN parsing.
                let looks_binary = bytes.first().is_some_and(|b| *b == 0x02 || *b == 0x03);
                if looks_binary
                    && self.session.role() == Role::Client
                    && wbxml::decode_to_xml(&bytes).is_err()
                    && san::parse(&bytes).is_ok()
                {
                    warn!("presuming SAN package sent with wrong content type");
                    return self.dispatch_san(&bytes);
                }

                match self.session.handle_message(&bytes) {
                    Ok(step) => step,
                    Err(error) => {
                        self.session
                            .abort_sync(SyncState::InvalidSyncMlMessage, &error.to_string());
                        return None;
                    }
                }
            }
            TransportData::San(bytes) => return self.dispatch_san(&bytes),
            TransportData::Event(event, reason) => {
                self.handle_transport_event(event, &reason);
                return None;
            }
        };

        if let Some(uri) = self.session.take_redirect_uri() {
            self.transport.set_remote_loc_uri(&uri);
        }

        if self.session.is_finished() {
            None
        } else {
            Some(step)
        }
    }

    fn dispatch_san(&mut self, bytes: &[u8]) -> Option<SessionStep> {
        if self.session.state() != SyncState::NotPrepared {
            // SAN packages are only allowed while listening for a
            // request, never inside an established session.
            self.session.abort_sync(
                SyncState::InvalidSyncMlMessage,
                "Received unexpected 1.2 SAN message",
            );
            return None;
        }

        if self.session.handle_san(bytes).is_err() || self.session.is_finished() {
            return None;
        }
        Some(SessionStep::Respond)
    }

    fn handle_transport_event(&mut self, event: TransportEvent, reason: &str) {
        match event {
            TransportEvent::ConnectionOpened | TransportEvent::ConnectionClosed => {}
            TransportEvent::InvalidContentType | TransportEvent::InvalidContent => {
                self.session.abort_sync(SyncState::InvalidSyncMlMessage, reason);
            }
            TransportEvent::Failed
            | TransportEvent::Timeout
            | TransportEvent::Aborted
            | TransportEvent::AuthenticationNeeded => {
                self.session.abort_sync(SyncState::ConnectionError, reason);
            }
        }
    }

    fn resend_attempts(&self) -> u32 {
        self.session.http_resend_attempts()
    }

    fn outcome(&self) -> SyncOutcome {
        SyncOutcome {
            state: self.session.state(),
            description: self.session.error_description().to_string(),
        }
    }
}
