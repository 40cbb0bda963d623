//! JSON command front end.
//!
//! Commands arrive as objects naming themselves in `cmdName`, matched
//! without regard to case. Replies are
//! JSON text, followed for binary trace data by a NUL and the packed
//! payload.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use tracer_core::{AccessHandler, BusControl, CpuCore};

use crate::error::TracerError;
use crate::session::{SessionOptions, TracerSession};

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "cmdName")]
enum Command {
    #[serde(rename = "tracerstart")]
    Start {
        #[serde(default, deserialize_with = "flag")]
        logging: bool,
        #[serde(default, deserialize_with = "flag")]
        record: bool,
        #[serde(default, deserialize_with = "flag")]
        compare: bool,
    },
    #[serde(rename = "tracerstop")]
    Stop {
        #[serde(default, deserialize_with = "flag")]
        logging: bool,
    },
    #[serde(rename = "tracerstatus")]
    Status {
        #[serde(rename = "msgIdx", default)]
        msg_idx: Option<JsonValue>,
    },
    #[serde(rename = "tracergetlong")]
    GetLong,
    #[serde(rename = "tracergetbin")]
    GetBin,
    #[serde(other)]
    Other,
}

impl Command {
    fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let mut value: JsonValue = serde_json::from_str(json)?;
        if let Some(JsonValue::String(name)) = value.get_mut("cmdName") {
            name.make_ascii_lowercase();
        }
        serde_json::from_value(value)
    }
}

/// Boolean argument: `true`/`false`, a number (non-zero is true), or a
/// string (non-empty and not starting with `0` is true).
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Bool(b) => Ok(b),
        JsonValue::Number(n) => Ok(n.as_f64().is_some_and(|v| v.abs() > 0.0)),
        JsonValue::String(s) => Ok(!s.is_empty() && !s.starts_with('0')),
        JsonValue::Null => Ok(false),
        other => Err(D::Error::custom(format!("expected a flag, got {other}"))),
    }
}

/// Answer to a handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub json: String,
    /// Binary data sent after the JSON and a NUL.
    pub payload: Option<Vec<u8>>,
}

impl CommandReply {
    fn json(value: &JsonValue) -> Self {
        Self {
            json: value.to_string(),
            payload: None,
        }
    }

    fn ok() -> Self {
        Self::json(&serde_json::json!({"err": "ok"}))
    }

    /// Bytes as sent on the transport.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.json.as_bytes().to_vec();
        if let Some(payload) = &self.payload {
            bytes.push(0);
            bytes.extend_from_slice(payload);
        }
        bytes
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

impl<B, M, C, const TRACE: usize, const EXCEPTIONS: usize> TracerSession<B, M, C, TRACE, EXCEPTIONS>
where
    B: BusControl,
    M: AccessHandler,
    C: CpuCore,
{
    /// Handle one JSON command.
    ///
    /// `transport_available` is the space for a binary reply. Returns
    /// `Ok(None)` for commands that are not tracer commands.
    pub fn handle_command(
        &mut self,
        json: &str,
        transport_available: usize,
    ) -> Result<Option<CommandReply>, TracerError> {
        let command = Command::parse(json)?;
        debug!(?command, "tracer command");
        let reply = match command {
            Command::Start {
                logging,
                record,
                compare,
            } => {
                self.start(SessionOptions {
                    record_all: record,
                    compare_to_emulated: compare,
                    verbose_logging: logging,
                    prime_from_memory: true,
                });
                CommandReply::ok()
            }
            Command::Stop { logging } => {
                if logging {
                    let stats = self.stats();
                    info!(
                        isr_calls = stats.isr_calls,
                        errors = stats.error_count,
                        instructions = stats.instructions_executed,
                        dropped_traces = stats.dropped_traces,
                        dropped_exceptions = stats.dropped_exceptions,
                        "tracer stop requested"
                    );
                }
                self.stop();
                CommandReply::ok()
            }
            Command::Status { msg_idx } => {
                let mut value = serde_json::to_value(self.status())?;
                if let Some(fields) = value.as_object_mut() {
                    fields.insert("err".to_string(), "ok".into());
                    if let Some(idx) = msg_idx {
                        fields.insert("msgIdx".to_string(), idx);
                    }
                }
                CommandReply::json(&value)
            }
            Command::GetLong => {
                let mut value = serde_json::json!({"err": "ok"});
                if let Some(report) = self.get_trace_record() {
                    value["trace"] = serde_json::to_value(report)?;
                }
                CommandReply::json(&value)
            }
            Command::GetBin => match self.get_trace_frame(transport_available) {
                Some(frame) => CommandReply {
                    json: frame.header(),
                    payload: Some(frame.payload().to_vec()),
                },
                None => CommandReply::json(&serde_json::json!({"err": "nodata"})),
            },
            Command::Other => return Ok(None),
        };
        Ok(Some(reply))
    }
}
