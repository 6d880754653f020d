//! Bound SMPP transceiver session
//!
//! Requests are sent one at a time over the shared connection (window size
//! of one). While waiting for a response the session answers the requests an
//! SMSC may interleave: `enquire_link`, `deliver_sm` and `unbind`.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use otp_shared::config::SmppConfig;

use super::codec::SmppCodec;
use super::pdu::{status, BindTransceiver, Pdu, PduBody, ShortMessage, INTERFACE_VERSION};
use super::SmppError;

type Connection = Framed<TcpStream, SmppCodec>;

/// Sequence numbers run from 1 to 0x7FFFFFFF, then wrap
const MAX_SEQUENCE: u32 = 0x7FFF_FFFF;

pub struct SmppSession {
    config: SmppConfig,
    connection: Mutex<Option<Connection>>,
    sequence: AtomicU32,
}

impl SmppSession {
    pub fn new(config: SmppConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            sequence: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &SmppConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }

    fn next_sequence(&self) -> u32 {
        let previous = self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |seq| {
                Some(if seq >= MAX_SEQUENCE { 1 } else { seq + 1 })
            })
            .unwrap_or(0);
        if previous >= MAX_SEQUENCE {
            1
        } else {
            previous + 1
        }
    }

    /// Whether a bound connection is currently held
    pub async fn is_bound(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Connect and bind as a transceiver, replacing any held connection
    pub async fn bind(&self) -> Result<(), SmppError> {
        let mut guard = self.connection.lock().await;
        let connection = self.open().await?;
        *guard = Some(connection);
        Ok(())
    }

    async fn open(&self) -> Result<Connection, SmppError> {
        let address = self.config.address();
        let timeout = self.timeout();

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| SmppError::Timeout(timeout.as_secs()))??;
        let mut connection = Framed::new(stream, SmppCodec);

        let sequence = self.next_sequence();
        let bind = PduBody::BindTransceiver(BindTransceiver {
            system_id: self.config.system_id.clone(),
            password: self.config.password.clone(),
            system_type: self.config.system_type.clone(),
            interface_version: INTERFACE_VERSION,
            addr_ton: 0,
            addr_npi: 0,
            address_range: String::new(),
        });
        connection.send(Pdu::request(sequence, bind)).await?;

        let response = await_response(&mut connection, sequence, timeout).await?;
        if response.command_status != status::ESME_ROK {
            return Err(SmppError::BindRejected(response.command_status));
        }

        info!(
            smsc = %address,
            system_id = %self.config.system_id,
            "SMPP transceiver bound"
        );
        Ok(connection)
    }

    /// Submit one short message and return the SMSC message id.
    ///
    /// Binds first if needed. A transport failure drops the connection so the
    /// next submit starts from a fresh bind.
    pub async fn submit(&self, message: ShortMessage) -> Result<String, SmppError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(SmppError::Closed);
        };

        let sequence = self.next_sequence();
        let result = exchange(
            connection,
            Pdu::request(sequence, PduBody::SubmitSm(message)),
            self.timeout(),
        )
        .await;

        match result {
            Ok(response) if response.command_status == status::ESME_ROK => match response.body {
                PduBody::SubmitSmResp { message_id } => Ok(message_id),
                _ => Ok(String::new()),
            },
            Ok(response) => Err(SmppError::Status(response.command_status)),
            Err(e) => {
                if e.breaks_session() {
                    warn!(error = %e, "Dropping SMPP connection");
                    *guard = None;
                }
                Err(e)
            }
        }
    }

    /// Probe the link. Does nothing while unbound.
    pub async fn enquire_link(&self) -> Result<(), SmppError> {
        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            return Ok(());
        };

        let sequence = self.next_sequence();
        match exchange(connection, Pdu::request(sequence, PduBody::EnquireLink), self.timeout()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.breaks_session() {
                    *guard = None;
                }
                Err(e)
            }
        }
    }

    /// Unbind and close the connection, if one is held
    pub async fn unbind(&self) -> Result<(), SmppError> {
        let Some(mut connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        let sequence = self.next_sequence();
        exchange(&mut connection, Pdu::request(sequence, PduBody::Unbind), self.timeout()).await?;
        info!("SMPP transceiver unbound");
        Ok(())
    }

    /// Send `enquire_link` on an interval until `shutdown` turns true, then unbind
    pub fn spawn_keepalive(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs(self.config.enquire_link_interval_secs.max(1));
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.enquire_link().await {
                            warn!(error = %e, "SMPP enquire_link failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Err(e) = self.unbind().await {
                debug!(error = %e, "SMPP unbind on shutdown failed");
            }
        })
    }
}

async fn exchange(connection: &mut Connection, request: Pdu, timeout: Duration) -> Result<Pdu, SmppError> {
    let sequence = request.sequence_number;
    connection.send(request).await?;
    await_response(connection, sequence, timeout).await
}

/// Read until the response for `sequence` arrives, serving SMSC requests
async fn await_response(connection: &mut Connection, sequence: u32, timeout: Duration) -> Result<Pdu, SmppError> {
    let wait = async {
        loop {
            let pdu = connection.next().await.ok_or(SmppError::Closed)??;

            if pdu.is_response() {
                if pdu.sequence_number == sequence {
                    return Ok(pdu);
                }
                debug!(sequence = pdu.sequence_number, "Ignoring unexpected SMPP response");
                continue;
            }

            let reply = match pdu.body {
                PduBody::EnquireLink => PduBody::EnquireLinkResp,
                PduBody::DeliverSm(_) => {
                    debug!("Acknowledging SMPP deliver_sm");
                    PduBody::DeliverSmResp
                }
                PduBody::Unbind => {
                    connection
                        .send(Pdu::response(pdu.sequence_number, status::ESME_ROK, PduBody::UnbindResp))
                        .await?;
                    return Err(SmppError::Closed);
                }
                _ => PduBody::GenericNack,
            };
            let reply_status = if matches!(reply, PduBody::GenericNack) {
                status::ESME_RSYSERR
            } else {
                status::ESME_ROK
            };
            connection
                .send(Pdu::response(pdu.sequence_number, reply_status, reply))
                .await?;
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| SmppError::Timeout(timeout.as_secs()))?
}
