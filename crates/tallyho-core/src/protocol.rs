//! Switcher-feed protocol.
//!
//! The server sends one JSON object per line. Every field is optional and
//! several may arrive together:
//!
//! ```json
//! {"MAC": "A0:85:E3:47:F5:30", "SET_CAM": 3}
//! {"CAM_LIVE": 2, "CAM_PREV": 3}
//! {"PING": true}
//! ```
//!
//! A message with a non-null `MAC` that is not this device's address is
//! ignored entirely. Unknown fields are ignored. A field of the wrong type, or
//! a camera number that does not fit, drops the whole message before any
//! state is touched.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use log::{debug, info};
use serde::de::{Deserializer, IgnoredAny};
use serde::Deserialize;
use thiserror_no_std::Error;

use crate::config::{ConfigStore, KeyValueStorage, keys};
use crate::error::{ErrorText, Fault};
use crate::identity::DeviceIdentity;
use crate::tally::{CameraNumber, TallyError, TallyState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(ErrorText),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("line of {len} bytes exceeds the limit")]
    LineTooLong { len: usize },
    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(value: serde_json::Error) -> Self {
        let mut text = ErrorText::new();
        let _ = write!(text, "{}", value);
        Self::Json(text)
    }
}

/// One decoded protocol line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    #[serde(rename = "MAC", default)]
    pub mac: Option<String>,
    #[serde(rename = "CAM_LIVE", default)]
    pub cam_live: Option<i64>,
    #[serde(rename = "CAM_PREV", default)]
    pub cam_prev: Option<i64>,
    #[serde(rename = "SET_CAM", default)]
    pub set_cam: Option<i64>,
    #[serde(rename = "BACKLIGHT_PCT", default)]
    pub backlight_pct: Option<i64>,
    #[serde(rename = "IDENTIFY", default, deserialize_with = "present")]
    pub identify: bool,
    #[serde(rename = "PING", default, deserialize_with = "present")]
    pub ping: bool,
}

/// Presence-only field: any value counts, `null` included.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

/// Decode one line into a [`Message`].
pub fn decode(line: &str) -> Result<Message, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    Ok(Message::deserialize(value)?)
}

fn switcher_camera(field: &'static str, value: Option<i64>) -> Result<Option<CameraNumber>, ProtocolError> {
    value
        .map(|v| CameraNumber::try_from(v).map_err(|_| ProtocolError::OutOfRange { field, value: v }))
        .transpose()
}

/// What the runtime has to do after a message was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Indication or camera label may have changed; redraw.
    pub tally_changed: bool,
    /// Live/preview arrived while no camera is assigned.
    pub needs_assignment: bool,
    /// Run the identify sequence.
    pub identify: bool,
    /// Re-arm the ping deadline.
    pub ping: bool,
    /// New backlight level, already clamped and persisted.
    pub backlight: Option<u8>,
    /// Non-fatal problems met while applying the message.
    pub faults: Vec<Fault>,
}

/// Applies protocol messages addressed to this device.
pub struct ProtocolInterpreter {
    identity: DeviceIdentity,
}

impl ProtocolInterpreter {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Decode `line` and apply it to the tally state.
    ///
    /// An `Err` means the line was dropped and nothing changed.
    pub fn interpret<S: KeyValueStorage>(
        &self,
        line: &str,
        tally: &mut TallyState,
        config: &mut ConfigStore<S>,
    ) -> Result<Dispatch, ProtocolError> {
        let message = decode(line)?;
        debug!("Message: {:?}", message);

        if let Some(mac) = message.mac.as_deref() {
            if !self.identity.mac.matches(mac) {
                debug!("Message for {} ignored", mac);
                return Ok(Dispatch::default());
            }
        }

        let live = switcher_camera("CAM_LIVE", message.cam_live)?;
        let preview = switcher_camera("CAM_PREV", message.cam_prev)?;

        let mut dispatch = Dispatch::default();

        if let Some(camera) = message.set_cam {
            match tally.set_assignment(camera, config) {
                Ok(changed) => dispatch.tally_changed |= changed,
                Err(e @ TallyError::Persist(_)) => {
                    dispatch.tally_changed = true;
                    dispatch.faults.push(e.into());
                }
                Err(e) => dispatch.faults.push(e.into()),
            }
        }

        if live.is_some() || preview.is_some() {
            if tally.assignment().is_none() {
                dispatch.needs_assignment = true;
            } else if tally.update_switcher(live, preview) {
                let switcher = tally.switcher();
                info!(
                    "Switcher live={} preview={} -> {}",
                    switcher.live,
                    switcher.preview,
                    tally.indication().label()
                );
                dispatch.tally_changed = true;
            }
        }

        if let Some(pct) = message.backlight_pct {
            let pct = pct.clamp(0, 100) as u8;
            if let Err(e) = config.set(keys::BACKLIGHT, &pct) {
                dispatch.faults.push(e.into());
            }
            dispatch.backlight = Some(pct);
        }

        dispatch.ping = message.ping;
        dispatch.identify = message.identify;
        Ok(dispatch)
    }
}
