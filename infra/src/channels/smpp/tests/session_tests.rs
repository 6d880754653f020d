//! Session and adapter behaviour against an in-process SMSC

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use otp_core::services::{ChannelAdapter, DeliveryResult, RenderedMessage};
use otp_shared::config::SmppConfig;

use crate::channels::smpp::pdu::{status, Pdu, PduBody, ShortMessage, DATA_CODING_IA5};
use crate::channels::smpp::{SmppChannelAdapter, SmppCodec, SmppSession};

struct SmscScript {
    password: &'static str,
    connections: usize,
    submit_statuses: Vec<u32>,
    interleave_enquire_link: bool,
    drop_first_connection: bool,
}

impl Default for SmscScript {
    fn default() -> Self {
        Self {
            password: "secret",
            connections: 1,
            submit_statuses: Vec::new(),
            interleave_enquire_link: false,
            drop_first_connection: false,
        }
    }
}

fn config(port: u16) -> SmppConfig {
    SmppConfig {
        host: "127.0.0.1".to_string(),
        port,
        system_id: "otp".to_string(),
        password: "secret".to_string(),
        source_addr: "OTPSVC".to_string(),
        timeout_secs: 2,
        ..SmppConfig::default()
    }
}

/// Serve `script.connections` connections in turn, recording every submit_sm
async fn spawn_smsc(script: SmscScript) -> (SmppConfig, Arc<Mutex<Vec<ShortMessage>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    tokio::spawn(async move {
        let mut statuses = script.submit_statuses.into_iter();
        for connection_index in 0..script.connections {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut framed = Framed::new(stream, SmppCodec);

            while let Some(Ok(pdu)) = framed.next().await {
                let sequence = pdu.sequence_number;
                match pdu.body {
                    PduBody::BindTransceiver(bind) => {
                        let bind_status = if bind.password == script.password {
                            status::ESME_ROK
                        } else {
                            status::ESME_RINVPASWD
                        };
                        let resp = PduBody::BindTransceiverResp {
                            system_id: "FAKESMSC".to_string(),
                        };
                        framed.send(Pdu::response(sequence, bind_status, resp)).await.unwrap();
                        if bind_status != status::ESME_ROK {
                            break;
                        }
                    }
                    PduBody::SubmitSm(sm) => {
                        let count = {
                            let mut received = sink.lock().unwrap();
                            received.push(sm);
                            received.len()
                        };
                        if connection_index == 0 && script.drop_first_connection {
                            break;
                        }
                        if script.interleave_enquire_link {
                            framed.send(Pdu::request(9000, PduBody::EnquireLink)).await.unwrap();
                            let reply = framed.next().await.unwrap().unwrap();
                            assert_eq!(reply.body, PduBody::EnquireLinkResp);
                            assert_eq!(reply.sequence_number, 9000);
                        }
                        let submit_status = statuses.next().unwrap_or(status::ESME_ROK);
                        let resp = PduBody::SubmitSmResp {
                            message_id: format!("msg-{}", count),
                        };
                        framed.send(Pdu::response(sequence, submit_status, resp)).await.unwrap();
                    }
                    PduBody::EnquireLink => {
                        framed
                            .send(Pdu::response(sequence, status::ESME_ROK, PduBody::EnquireLinkResp))
                            .await
                            .unwrap();
                    }
                    PduBody::Unbind => {
                        framed
                            .send(Pdu::response(sequence, status::ESME_ROK, PduBody::UnbindResp))
                            .await
                            .unwrap();
                        break;
                    }
                    _ => {}
                }
            }
        }
    });

    (config(port), received)
}

fn message() -> RenderedMessage {
    RenderedMessage {
        subject: None,
        body: "Your code is 482913".to_string(),
    }
}

#[tokio::test]
async fn test_submit_binds_lazily_and_returns_message_id() {
    let (config, received) = spawn_smsc(SmscScript::default()).await;
    let adapter = SmppChannelAdapter::new(config);
    assert!(!adapter.session().is_bound().await);

    let result = adapter.send("+15551234567", &message()).await;
    assert_eq!(
        result,
        DeliveryResult::Delivered {
            provider_message_id: "msg-1".to_string()
        }
    );
    assert!(adapter.session().is_bound().await);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].destination_addr, "15551234567");
    assert_eq!(received[0].source_addr, "OTPSVC");
    assert_eq!(received[0].data_coding, DATA_CODING_IA5);
    assert_eq!(&received[0].short_message[..], b"Your code is 482913");
}

#[tokio::test]
async fn test_interleaved_enquire_link_is_answered() {
    let (config, _) = spawn_smsc(SmscScript {
        interleave_enquire_link: true,
        ..Default::default()
    })
    .await;
    let adapter = SmppChannelAdapter::new(config);

    let result = adapter.send("+15551234567", &message()).await;
    assert!(matches!(result, DeliveryResult::Delivered { .. }));
}

#[tokio::test]
async fn test_bind_rejection_is_permanent() {
    let (config, received) = spawn_smsc(SmscScript {
        password: "other",
        ..Default::default()
    })
    .await;
    let adapter = SmppChannelAdapter::new(config);

    let result = adapter.send("+15551234567", &message()).await;
    assert!(matches!(
        result,
        DeliveryResult::PermanentFailure {
            address_rejected: false,
            ..
        }
    ));
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_status_is_classified() {
    let (config, _) = spawn_smsc(SmscScript {
        submit_statuses: vec![status::ESME_RTHROTTLED, status::ESME_RINVDSTADR],
        ..Default::default()
    })
    .await;
    let adapter = SmppChannelAdapter::new(config);

    let throttled = adapter.send("+15551234567", &message()).await;
    assert!(matches!(throttled, DeliveryResult::TransientFailure { .. }));

    // A status error keeps the session bound
    assert!(adapter.session().is_bound().await);

    let rejected = adapter.send("+15551234567", &message()).await;
    assert!(matches!(
        rejected,
        DeliveryResult::PermanentFailure {
            address_rejected: true,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dropped_connection_rebinds_on_next_submit() {
    let (config, received) = spawn_smsc(SmscScript {
        connections: 2,
        drop_first_connection: true,
        ..Default::default()
    })
    .await;
    let adapter = SmppChannelAdapter::new(config);

    let first = adapter.send("+15551234567", &message()).await;
    assert!(matches!(first, DeliveryResult::TransientFailure { .. }));
    assert!(!adapter.session().is_bound().await);

    let second = adapter.send("+15551234567", &message()).await;
    assert!(matches!(second, DeliveryResult::Delivered { .. }));
    assert_eq!(received.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_enquire_link_and_unbind() {
    let (config, _) = spawn_smsc(SmscScript::default()).await;
    let session = Arc::new(SmppSession::new(config));

    // Nothing to probe before the first bind
    session.enquire_link().await.unwrap();

    session.bind().await.unwrap();
    session.enquire_link().await.unwrap();
    session.unbind().await.unwrap();
    assert!(!session.is_bound().await);
}

#[tokio::test]
async fn test_unparseable_destination_is_rejected_without_network() {
    // Nothing listens on this port; the number fails before any connect
    let adapter = SmppChannelAdapter::new(config(1));

    let result = adapter.send("not a number", &message()).await;
    assert!(matches!(
        result,
        DeliveryResult::PermanentFailure {
            address_rejected: true,
            ..
        }
    ));
}
