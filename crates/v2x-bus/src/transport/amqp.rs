// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AMQP 1.0 transport (feature `amqp`).
//!
//! Bridges the synchronous [`Transport`]/[`Link`] seam onto an async AMQP
//! client running on a private tokio runtime:
//!
//! ```text
//!   network loop (sync)                 runtime (async)
//!   -------------------                 ---------------
//!   connect()      -- block_on -->      Connection::open + Session::begin
//!   open_sender()  -- block_on -->      Sender::attach, spawn sender task
//!   send(env)      -- try_send -->      sender task: Message -> sender.send
//!   open_receiver()-- block_on -->      Receiver::attach, spawn receiver task
//!                  <-- events --        Message(env) / SenderError / ConnectionError
//! ```
//!
//! Mapping of [`ConnectOptions`]:
//!
//! | option         | AMQP                                             |
//! |----------------|--------------------------------------------------|
//! | `endpoint`     | `amqp://host:port` (scheme added when missing)   |
//! | `credentials`  | SASL ANONYMOUS / PLAIN, none when disabled       |
//! | `idle_timeout` | connection `idle-time-out`                       |
//! | `filter`       | `jms-selector` filter on the receiver source      |
//!
//! Envelope fields travel as the message `subject`, `creation-time`, header
//! `ttl`, application properties and a single `data` section.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender as EventSender;
use fe2o3_amqp::connection::{ConnectionHandle, OpenError};
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{
    ApplicationProperties, Body as AmqpBody, Header, Message, Properties, Source,
};
use fe2o3_amqp::types::primitives::{Binary, SimpleValue, Timestamp, Value};
use fe2o3_amqp::{Connection, Receiver, Sender, Session};
use log::{debug, info, warn};
use serde_amqp::described::Described;
use serde_amqp::descriptor::Descriptor;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Link, Transport, TransportError, TransportEvent};
use crate::config::Credentials;
use crate::connection::ConnectOptions;
use crate::message::{Body, Envelope, PropertyValue};
use crate::selector::Selector;

/// Filter key and descriptor of the Apache `jms-selector` filter.
const SELECTOR_FILTER_KEY: &str = "jms-selector";
const SELECTOR_FILTER_CODE: u64 = 0x0000_468C_0000_0004;

/// Outbound queue between `send` and the sender task.
const OUTBOUND_CAPACITY: usize = 256;

/// Bound on connection, attach and close handshakes.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// AMQP 1.0 broker connector.
///
/// Owns the tokio runtime shared by every link it opens.
pub struct AmqpTransport {
    runtime: Arc<Runtime>,
}

impl AmqpTransport {
    /// Transport with its own single-worker runtime.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("v2x-amqp")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl Transport for AmqpTransport {
    fn connect(
        &mut self,
        options: &ConnectOptions,
        events: EventSender<TransportEvent>,
    ) -> Result<Box<dyn Link>, TransportError> {
        let url = broker_url(&options.endpoint);
        let container_id = format!("v2x-bus-{}", options.station_id);
        let idle_timeout = idle_timeout_ms(options.idle_timeout);
        let sasl = sasl_profile(&options.credentials);

        let (connection, session) = self.runtime.block_on(async {
            let builder = Connection::builder()
                .container_id(container_id)
                .idle_time_out(idle_timeout);
            let builder = match sasl {
                Some(profile) => builder.sasl_profile(profile),
                None => builder,
            };
            let mut connection = tokio::time::timeout(HANDSHAKE_TIMEOUT, builder.open(url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectionRefused(format!("{}: open timed out", url)))?
                .map_err(|e| open_error(&url, e))?;
            let session = match Session::begin(&mut connection).await {
                Ok(session) => session,
                Err(e) => {
                    let _ = connection.close().await;
                    return Err(TransportError::Protocol(format!("session begin: {}", e)));
                }
            };
            Ok::<_, TransportError>((connection, session))
        })?;

        info!(
            "[amqp] station {} connected to {} (idle timeout {} ms)",
            options.station_id, url, idle_timeout
        );
        Ok(Box::new(AmqpLink {
            runtime: Arc::clone(&self.runtime),
            connection: Some(connection),
            session: Some(session),
            outbound: None,
            sender_task: None,
            receiver_task: None,
            events,
            link_prefix: format!("v2x-{}", options.station_id),
        }))
    }
}

/// One AMQP connection with at most one sender and one receiver.
struct AmqpLink {
    runtime: Arc<Runtime>,
    connection: Option<ConnectionHandle<()>>,
    session: Option<SessionHandle<()>>,
    outbound: Option<mpsc::Sender<Envelope>>,
    sender_task: Option<JoinHandle<()>>,
    receiver_task: Option<JoinHandle<()>>,
    events: EventSender<TransportEvent>,
    link_prefix: String,
}

impl Link for AmqpLink {
    fn open_sender(&mut self, address: &str) -> Result<(), TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::Closed)?;
        let name = format!("{}-sender", self.link_prefix);
        let sender = self.runtime.block_on(async {
            tokio::time::timeout(HANDSHAKE_TIMEOUT, Sender::attach(session, name, address))
                .await
                .map_err(|_| TransportError::Protocol(format!("attach '{}' timed out", address)))?
                .map_err(|e| TransportError::UnknownAddress(format!("{}: {}", address, e)))
        })?;

        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.outbound = Some(tx);
        self.sender_task = Some(self.runtime.spawn(sender_task(sender, rx, self.events.clone())));
        debug!("[amqp] sender attached to '{}'", address);
        let _ = self.events.send(TransportEvent::SenderOpen);
        Ok(())
    }

    fn open_receiver(&mut self, address: &str, filter: Option<&str>) -> Result<(), TransportError> {
        // Reject locally what the broker would refuse at attach time
        if let Some(filter) = filter {
            Selector::parse(filter)?;
        }
        let session = self.session.as_mut().ok_or(TransportError::Closed)?;
        let source = receiver_source(address, filter);
        let name = format!("{}-receiver", self.link_prefix);
        let receiver = self.runtime.block_on(async {
            let attach = Receiver::builder().name(name).source(source).attach(session);
            tokio::time::timeout(HANDSHAKE_TIMEOUT, attach)
                .await
                .map_err(|_| TransportError::Protocol(format!("attach '{}' timed out", address)))?
                .map_err(|e| TransportError::UnknownAddress(format!("{}: {}", address, e)))
        })?;

        self.receiver_task = Some(self.runtime.spawn(receiver_task(receiver, self.events.clone())));
        debug!("[amqp] receiver attached to '{}' (filter {:?})", address, filter);
        Ok(())
    }

    fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Protocol("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&mut self) {
        if self.session.is_none() && self.connection.is_none() {
            return;
        }
        // Dropping the queue lets the sender task drain it and detach
        self.outbound = None;
        let sender_task = self.sender_task.take();
        let receiver_task = self.receiver_task.take();
        let session = self.session.take();
        let connection = self.connection.take();

        let closed = self.runtime.block_on(async move {
            tokio::time::timeout(HANDSHAKE_TIMEOUT, async move {
                if let Some(task) = receiver_task {
                    task.abort();
                    let _ = task.await;
                }
                if let Some(task) = sender_task {
                    let _ = task.await;
                }
                if let Some(mut session) = session {
                    let _ = session.end().await;
                }
                if let Some(mut connection) = connection {
                    let _ = connection.close().await;
                }
            })
            .await
        });
        if closed.is_err() {
            warn!("[amqp] close handshake timed out");
        }
    }
}

impl Drop for AmqpLink {
    fn drop(&mut self) {
        self.close();
    }
}

async fn sender_task(
    mut sender: Sender,
    mut outbound: mpsc::Receiver<Envelope>,
    events: EventSender<TransportEvent>,
) {
    while let Some(envelope) = outbound.recv().await {
        if let Err(e) = publish(&mut sender, envelope).await {
            let _ = events.send(TransportEvent::SenderError(e));
            break;
        }
    }
    let _ = sender.close().await;
}

async fn publish(sender: &mut Sender, envelope: Envelope) -> Result<(), String> {
    let (header, properties, application_properties) = message_sections(&envelope);
    let builder = Message::builder()
        .header(header)
        .properties(properties)
        .application_properties(application_properties);
    let sent = match envelope.body {
        Body::Binary(bytes) => sender.send(builder.data(Binary::from(bytes)).build()).await,
        Body::Text(text) => sender.send(builder.value(text).build()).await,
        Body::Empty => sender.send(builder.value(Value::Null).build()).await,
    };
    sent.map(|_| ()).map_err(|e| e.to_string())
}

async fn receiver_task(mut receiver: Receiver, events: EventSender<TransportEvent>) {
    loop {
        let delivery = match receiver.recv::<AmqpBody<Value>>().await {
            Ok(delivery) => delivery,
            Err(e) => {
                let _ = events.send(TransportEvent::ConnectionError(format!("receiver: {}", e)));
                break;
            }
        };
        let envelope = envelope_from_message(delivery.message());
        if let Err(e) = receiver.accept(&delivery).await {
            let _ = events.send(TransportEvent::ConnectionError(format!("accept: {}", e)));
            break;
        }
        if events.send(TransportEvent::Message(envelope)).is_err() {
            break;
        }
    }
    let _ = receiver.close().await;
}

/// `host:port` -> `amqp://host:port`; explicit schemes are kept.
fn broker_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("amqp://{}", endpoint)
    }
}

fn idle_timeout_ms(idle_timeout: Duration) -> u32 {
    u32::try_from(idle_timeout.as_millis()).unwrap_or(u32::MAX)
}

fn sasl_profile(credentials: &Credentials) -> Option<SaslProfile> {
    match credentials {
        Credentials::None => None,
        Credentials::Anonymous => Some(SaslProfile::Anonymous),
        Credentials::Plain { username, password } => Some(SaslProfile::Plain {
            username: username.clone(),
            password: password.clone(),
        }),
    }
}

fn open_error(url: &str, error: OpenError) -> TransportError {
    match error {
        OpenError::SaslError { code, .. } => {
            TransportError::AuthenticationFailed(format!("{}: {:?}", url, code))
        }
        other => TransportError::ConnectionRefused(format!("{}: {}", url, other)),
    }
}

fn receiver_source(address: &str, filter: Option<&str>) -> Source {
    let builder = Source::builder().address(address);
    match filter {
        Some(selector) => builder
            .add_to_filter(SELECTOR_FILTER_KEY, Some(selector_filter(selector)))
            .build(),
        None => builder.build(),
    }
}

fn selector_filter(selector: &str) -> Described<Value> {
    Described {
        descriptor: Descriptor::Code(SELECTOR_FILTER_CODE),
        value: Value::String(selector.to_string()),
    }
}

fn message_sections(envelope: &Envelope) -> (Header, Properties, ApplicationProperties) {
    let header = Header {
        ttl: Some(idle_timeout_ms(envelope.ttl)),
        ..Header::default()
    };
    let properties = Properties::builder()
        .subject(envelope.subject.clone())
        .creation_time(Timestamp::from_milliseconds(envelope.creation_time_ms))
        .build();
    let application_properties = envelope
        .properties
        .iter()
        .fold(ApplicationProperties::builder(), |builder, (key, value)| {
            builder.insert(key.clone(), simple_value(value))
        })
        .build();
    (header, properties, application_properties)
}

fn simple_value(value: &PropertyValue) -> SimpleValue {
    match value {
        PropertyValue::UShort(v) => SimpleValue::Ushort(*v),
        PropertyValue::UInt(v) => SimpleValue::Uint(*v),
        PropertyValue::Long(v) => SimpleValue::Long(*v),
        PropertyValue::Bool(v) => SimpleValue::Bool(*v),
        PropertyValue::String(v) => SimpleValue::String(v.clone()),
    }
}

fn property_value(value: &SimpleValue) -> Option<PropertyValue> {
    match value {
        SimpleValue::Ushort(v) => Some(PropertyValue::UShort(*v)),
        SimpleValue::Uint(v) => Some(PropertyValue::UInt(*v)),
        SimpleValue::Long(v) => Some(PropertyValue::Long(*v)),
        SimpleValue::Int(v) => Some(PropertyValue::Long(i64::from(*v))),
        SimpleValue::Short(v) => Some(PropertyValue::Long(i64::from(*v))),
        SimpleValue::Ubyte(v) => Some(PropertyValue::UShort(u16::from(*v))),
        SimpleValue::Bool(v) => Some(PropertyValue::Bool(*v)),
        SimpleValue::String(v) => Some(PropertyValue::String(v.clone())),
        _ => None,
    }
}

fn envelope_from_message(message: &Message<AmqpBody<Value>>) -> Envelope {
    let properties = message.properties.as_ref();
    let subject = properties
        .and_then(|p| p.subject.clone())
        .unwrap_or_default();
    let creation_time_ms = properties
        .and_then(|p| p.creation_time.as_ref())
        .map_or(0, Timestamp::milliseconds);
    let ttl = message
        .header
        .as_ref()
        .and_then(|h| h.ttl)
        .map_or(Duration::ZERO, |ms| Duration::from_millis(u64::from(ms)));

    let mut application_properties = BTreeMap::new();
    if let Some(props) = &message.application_properties {
        for (key, value) in props.0.iter() {
            match property_value(value) {
                Some(value) => {
                    application_properties.insert(key.clone(), value);
                }
                None => debug!("[amqp] skipping property '{}' of unsupported type", key),
            }
        }
    }

    Envelope {
        subject,
        properties: application_properties,
        creation_time_ms,
        ttl,
        body: body_from_amqp(&message.body),
    }
}

fn body_from_amqp(body: &AmqpBody<Value>) -> Body {
    match body {
        AmqpBody::Data(batch) => Body::Binary(batch.iter().flat_map(|data| data.0.to_vec()).collect()),
        AmqpBody::Value(value) => match &value.0 {
            Value::String(text) => Body::Text(text.clone()),
            Value::Binary(bytes) => Body::Binary(bytes.to_vec()),
            _ => Body::Empty,
        },
        _ => Body::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, PROP_MESSAGE_ID, PROP_STATION_ID};

    #[test]
    fn test_broker_url() {
        assert_eq!(broker_url("localhost:5672"), "amqp://localhost:5672");
        assert_eq!(broker_url("amqps://rsu.local:5671"), "amqps://rsu.local:5671");
    }

    #[test]
    fn test_sasl_mapping() {
        assert!(sasl_profile(&Credentials::None).is_none());
        assert!(matches!(
            sasl_profile(&Credentials::Anonymous),
            Some(SaslProfile::Anonymous)
        ));
        match sasl_profile(&Credentials::Plain {
            username: "obu".into(),
            password: "pw".into(),
        }) {
            Some(SaslProfile::Plain { username, password }) => {
                assert_eq!(username, "obu");
                assert_eq!(password, "pw");
            }
            _ => panic!("expected PLAIN credentials"),
        }
    }

    #[test]
    fn test_idle_timeout_saturates() {
        assert_eq!(idle_timeout_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(idle_timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn test_selector_filter_descriptor() {
        let filter = selector_filter("station_id <> 7");
        assert_eq!(filter.descriptor, Descriptor::Code(SELECTOR_FILTER_CODE));
        assert_eq!(filter.value, Value::String("station_id <> 7".into()));
    }

    #[test]
    fn test_envelope_fields_survive_the_message_sections() {
        let envelope = Envelope::for_message(MessageType::Cam, 42, Some(7), vec![1, 2, 3]);
        let (header, properties, application_properties) = message_sections(&envelope);
        assert_eq!(header.ttl, Some(idle_timeout_ms(envelope.ttl)));

        let message = Message::builder()
            .header(header)
            .properties(properties)
            .application_properties(application_properties)
            .body(AmqpBody::Value(fe2o3_amqp::types::messaging::AmqpValue(
                Value::Binary(Binary::from(vec![1u8, 2, 3])),
            )))
            .build();
        let back = envelope_from_message(&message);

        assert_eq!(back.subject, envelope.subject);
        assert_eq!(back.creation_time_ms, envelope.creation_time_ms);
        assert_eq!(back.ttl, envelope.ttl);
        assert_eq!(back.properties.get(PROP_STATION_ID), Some(&PropertyValue::UInt(42)));
        assert_eq!(
            back.properties.get(PROP_MESSAGE_ID),
            envelope.properties.get(PROP_MESSAGE_ID)
        );
        assert_eq!(back.body, Body::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_unsupported_body_is_empty() {
        let body = AmqpBody::Value(fe2o3_amqp::types::messaging::AmqpValue(Value::Null));
        assert_eq!(body_from_amqp(&body), Body::Empty);
    }
}
