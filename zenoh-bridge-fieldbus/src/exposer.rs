//! Zenoh exposure of registered attributes.
//!
//! Every endpoint is a queryable. Attribute names are resolved from the
//! query's key expression, so attributes registered at runtime are served
//! without declaring anything new.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::query::{Query, Queryable};
use zenattr_common::{AttributeKeys, Format, current_timestamp_millis, decode, encode};
use zenattr_core::{
    AttributeBridge, AttributeDescriptor, AttributeReading, AttributeRecord, BatchError,
    BridgeError, BusFacade, ScalarValue,
};

type QueryChannel = Queryable<FifoChannelHandler<Query>>;

/// Successful reply to an attribute query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum AttributeReply {
    /// Query without payload.
    Read(AttributeReading),
    /// Query carrying a value.
    Write {
        attribute: String,
        value: ScalarValue,
        timestamp: i64,
    },
}

/// Error reply, sent with `reply_err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Stable snake_case error class.
    pub kind: String,
    pub message: String,
    /// Failing entry of a batch registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Names registered before a batch stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<Vec<String>>,
}

impl ErrorReply {
    pub fn new(attribute: Option<&str>, kind: &str, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.map(str::to_string),
            kind: kind.to_string(),
            message: message.into(),
            index: None,
            registered: None,
        }
    }

    fn from_bridge(attribute: &str, error: &BridgeError) -> Self {
        Self::new(Some(attribute), error.kind(), error.to_string())
    }

    fn from_batch(error: &BatchError, names: &[String]) -> Self {
        Self {
            attribute: Some(error.name.clone()),
            kind: error.source.kind().to_string(),
            message: error.to_string(),
            index: Some(error.index),
            registered: Some(names[..error.registered.min(names.len())].to_vec()),
        }
    }
}

/// Reply to a registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReply {
    pub registered: Vec<String>,
}

/// Reply to an attribute listing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeListing {
    pub device: String,
    pub attributes: Vec<AttributeDescriptor>,
}

/// Reply to a clock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeReply {
    pub timestamp: i64,
}

/// Registration payload: one record or an array of records.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistrationPayload {
    Batch(Vec<AttributeRecord>),
    Single(AttributeRecord),
}

impl RegistrationPayload {
    fn into_records(self) -> Vec<AttributeRecord> {
        match self {
            RegistrationPayload::Batch(records) => records,
            RegistrationPayload::Single(record) => vec![record],
        }
    }
}

/// Read (no payload) or write (scalar payload) one attribute.
pub async fn handle_attribute<B: BusFacade>(
    bridge: &AttributeBridge<B>,
    name: &str,
    payload: Option<&[u8]>,
    format: Format,
) -> Result<AttributeReply, ErrorReply> {
    match payload.filter(|bytes| !bytes.is_empty()) {
        None => bridge
            .read_with_quality(name)
            .await
            .map(AttributeReply::Read)
            .map_err(|e| ErrorReply::from_bridge(name, &e)),
        Some(bytes) => {
            let value: ScalarValue = decode(bytes, format).map_err(|e| {
                ErrorReply::new(
                    Some(name),
                    "invalid_payload",
                    format!("expected a scalar value: {}", e),
                )
            })?;

            bridge
                .write_attribute(name, value.clone())
                .await
                .map_err(|e| ErrorReply::from_bridge(name, &e))?;

            Ok(AttributeReply::Write {
                attribute: name.to_string(),
                value,
                timestamp: current_timestamp_millis(),
            })
        }
    }
}

/// Register one record or a batch of records.
pub fn handle_registration<B: BusFacade>(
    bridge: &AttributeBridge<B>,
    payload: Option<&[u8]>,
    format: Format,
) -> Result<RegistrationReply, ErrorReply> {
    let bytes = payload.filter(|bytes| !bytes.is_empty()).ok_or_else(|| {
        ErrorReply::new(
            None,
            "invalid_payload",
            "expected an attribute record or an array of records",
        )
    })?;

    let records = decode::<RegistrationPayload>(bytes, format)
        .map_err(|e| ErrorReply::new(None, "invalid_payload", e.to_string()))?
        .into_records();
    let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();

    match bridge.register_records(records) {
        Ok(_) => Ok(RegistrationReply { registered: names }),
        Err(e) => Err(ErrorReply::from_batch(&e, &names)),
    }
}

/// Describe every registered attribute.
pub fn handle_listing<B: BusFacade>(bridge: &AttributeBridge<B>, device: &str) -> AttributeListing {
    AttributeListing {
        device: device.to_string(),
        attributes: bridge
            .attributes()
            .iter()
            .map(|d| d.as_ref().clone())
            .collect(),
    }
}

/// Serves one device's attributes over Zenoh.
pub struct AttributeExposer<B> {
    bridge: AttributeBridge<B>,
    keys: AttributeKeys,
    format: Format,
    attributes: QueryChannel,
    register: QueryChannel,
    listing: QueryChannel,
    time: QueryChannel,
}

impl<B: BusFacade + 'static> AttributeExposer<B> {
    /// Declare the device's queryables.
    pub async fn declare(
        session: &Session,
        bridge: AttributeBridge<B>,
        keys: AttributeKeys,
        format: Format,
    ) -> zenattr_common::Result<Self> {
        let attributes = session
            .declare_queryable(keys.attribute_wildcard())
            .await?;
        let register = session.declare_queryable(keys.register_key()).await?;
        let listing = session.declare_queryable(keys.attributes_key()).await?;
        let time = session.declare_queryable(keys.time_key()).await?;

        info!(
            attributes = %keys.attribute_wildcard(),
            register = %keys.register_key(),
            listing = %keys.attributes_key(),
            "Declared attribute queryables"
        );

        Ok(Self {
            bridge,
            keys,
            format,
            attributes,
            register,
            listing,
            time,
        })
    }

    /// Serve queries until a queryable closes.
    ///
    /// Attribute queries run in their own task, so a slow bus does not
    /// hold up listing or registration.
    pub async fn run(self) {
        loop {
            tokio::select! {
                query = self.attributes.recv_async() => match query {
                    Ok(query) => {
                        let bridge = self.bridge.clone();
                        let keys = self.keys.clone();
                        let format = self.format;
                        tokio::spawn(async move {
                            serve_attribute(&bridge, &keys, format, query).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Attribute queryable closed");
                        break;
                    }
                },
                query = self.register.recv_async() => match query {
                    Ok(query) => {
                        let payload = query_payload(&query);
                        let outcome = handle_registration(&self.bridge, payload.as_deref(), self.format);
                        match &outcome {
                            Ok(reply) => info!(registered = ?reply.registered, "Runtime registration"),
                            Err(e) => warn!(error = %e.message, "Runtime registration rejected"),
                        }
                        respond(&query, self.format, outcome).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Registration queryable closed");
                        break;
                    }
                },
                query = self.listing.recv_async() => match query {
                    Ok(query) => {
                        let listing = handle_listing(&self.bridge, self.keys.device());
                        respond(&query, self.format, Ok(listing)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Listing queryable closed");
                        break;
                    }
                },
                query = self.time.recv_async() => match query {
                    Ok(query) => {
                        let reply = TimeReply { timestamp: current_timestamp_millis() };
                        respond(&query, self.format, Ok(reply)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Time queryable closed");
                        break;
                    }
                },
            }
        }
    }
}

async fn serve_attribute<B: BusFacade>(
    bridge: &AttributeBridge<B>,
    keys: &AttributeKeys,
    format: Format,
    query: Query,
) {
    let key = query.key_expr().as_str().to_string();
    let payload = query_payload(&query);

    let outcome = match keys.parse_attribute(&key) {
        Some(name) => handle_attribute(bridge, name, payload.as_deref(), format).await,
        None => Err(ErrorReply::new(
            None,
            "invalid_key",
            format!("'{}' does not name a single attribute", key),
        )),
    };

    if let Err(e) = &outcome {
        debug!(key = %key, kind = %e.kind, error = %e.message, "Attribute query failed");
    }
    respond(&query, format, outcome).await;
}

fn query_payload(query: &Query) -> Option<Vec<u8>> {
    query.payload().map(|payload| payload.to_bytes().into_owned())
}

async fn respond<T: Serialize>(query: &Query, format: Format, outcome: Result<T, ErrorReply>) {
    let result = match outcome {
        Ok(reply) => match encode(&reply, format) {
            Ok(bytes) => query.reply(query.key_expr().clone(), bytes).await,
            Err(e) => {
                let fallback = ErrorReply::new(None, "encoding", e.to_string());
                match encode(&fallback, format) {
                    Ok(bytes) => query.reply_err(bytes).await,
                    Err(e) => query.reply_err(e.to_string()).await,
                }
            }
        },
        Err(error) => match encode(&error, format) {
            Ok(bytes) => query.reply_err(bytes).await,
            Err(e) => query.reply_err(e.to_string()).await,
        },
    };

    if let Err(e) = result {
        warn!(key = %query.key_expr(), error = %e, "Failed to send reply");
    }
}
