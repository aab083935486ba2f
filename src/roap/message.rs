//! Wire model of [ROAP] signaling messages.
//!
//! Field names and enum values are wire-significant: they serialize to the
//! exact tokens of [draft-jennings-rtcweb-signaling-01][ROAP].
//!
//! [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::utils::JsonParseError;

/// Tie-breaker carried by every locally generated
/// [`RoapMessageType::Offer`].
///
/// One below [`u32::MAX`], so that the remote side, which picks random
/// tie-breakers, can never equal it by coincidence, while `0xFFFF_FFFF`
/// stays reserved as a sentinel.
pub const LOCAL_TIE_BREAKER: u32 = 0xFFFF_FFFE;

/// Type of a [`RoapMessage`].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoapMessageType {
    /// SDP offer initiating a new exchange.
    #[display(fmt = "OFFER")]
    Offer,

    /// Request for the receiving side to generate an offer.
    #[display(fmt = "OFFER_REQUEST")]
    OfferRequest,

    /// SDP offer generated in response to an
    /// [`OfferRequest`](RoapMessageType::OfferRequest).
    #[display(fmt = "OFFER_RESPONSE")]
    OfferResponse,

    /// SDP answer to a received offer.
    #[display(fmt = "ANSWER")]
    Answer,

    /// Acknowledgement completing an exchange.
    #[display(fmt = "OK")]
    Ok,

    /// Error report. The kind is carried in [`RoapMessage::error_type`].
    #[display(fmt = "ERROR")]
    Error,
}

/// Kind of a [`RoapMessageType::Error`] message.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoapErrorType {
    /// Both sides sent an offer simultaneously and the receiving side won
    /// the tie-breaker comparison.
    #[display(fmt = "CONFLICT")]
    Conflict,

    /// Both sides sent an offer simultaneously with equal tie-breakers.
    #[display(fmt = "DOUBLECONFLICT")]
    #[serde(rename = "DOUBLECONFLICT")]
    DoubleConflict,

    /// Message type is not acceptable in the current state of the receiving
    /// side.
    #[display(fmt = "INVALID_STATE")]
    InvalidState,

    /// Message sequence number does not match the exchange in flight.
    #[display(fmt = "OUT_OF_ORDER")]
    OutOfOrder,

    /// Receiving side asks to repeat the last offer under a fresh sequence
    /// number.
    #[display(fmt = "RETRY")]
    Retry,

    /// Receiving side failed to process the message.
    #[display(fmt = "FAILED")]
    Failed,

    /// No matching session was found on the receiving side.
    #[display(fmt = "NOMATCH")]
    #[serde(rename = "NOMATCH")]
    NoMatch,

    /// Receiving side gave up waiting for the next message of the exchange.
    #[display(fmt = "TIMEOUT")]
    Timeout,
}

impl RoapErrorType {
    /// Indicates whether an error of this kind may be absorbed by repeating
    /// the last offer under a fresh sequence number.
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::DoubleConflict
                | Self::InvalidState
                | Self::OutOfOrder
                | Self::Retry
        )
    }
}

/// Single [ROAP] signaling message.
///
/// [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoapMessage {
    /// Type of this message.
    pub message_type: RoapMessageType,

    /// Sequence number of the exchange this message belongs to. Paired
    /// messages of one exchange share a `seq`.
    pub seq: u64,

    /// SDP blob carried by offers and answers. Opaque to the signaling
    /// layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,

    /// Tie-breaker resolving simultaneous offers. Present on
    /// [`RoapMessageType::Offer`] only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_breaker: Option<u32>,

    /// Kind of the reported error. Present on [`RoapMessageType::Error`]
    /// only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<RoapErrorType>,

    /// Session identifier of the offering side, carried through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offerer_session_id: Option<String>,

    /// Session identifier of the answering side, carried through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answerer_session_id: Option<String>,
}

/// Error of validating an inbound [`RoapMessage`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{} message without required `{}` field", message_type, field)]
pub struct InvalidRoapMessage {
    /// Type of the rejected message.
    message_type: RoapMessageType,

    /// Wire name of the missing field.
    field: &'static str,
}

impl RoapMessage {
    /// Creates a new outbound [`RoapMessageType::Offer`] carrying the
    /// [`LOCAL_TIE_BREAKER`].
    #[must_use]
    pub fn offer(seq: u64, sdp: String) -> Self {
        Self {
            message_type: RoapMessageType::Offer,
            seq,
            sdp: Some(sdp),
            tie_breaker: Some(LOCAL_TIE_BREAKER),
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        }
    }

    /// Creates a new outbound [`RoapMessageType::OfferResponse`].
    #[must_use]
    pub fn offer_response(seq: u64, sdp: String) -> Self {
        Self {
            message_type: RoapMessageType::OfferResponse,
            seq,
            sdp: Some(sdp),
            tie_breaker: None,
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        }
    }

    /// Creates a new outbound [`RoapMessageType::Answer`].
    #[must_use]
    pub fn answer(seq: u64, sdp: String) -> Self {
        Self {
            message_type: RoapMessageType::Answer,
            seq,
            sdp: Some(sdp),
            tie_breaker: None,
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        }
    }

    /// Creates a new outbound [`RoapMessageType::Ok`].
    #[must_use]
    pub fn ok(seq: u64) -> Self {
        Self {
            message_type: RoapMessageType::Ok,
            seq,
            sdp: None,
            tie_breaker: None,
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        }
    }

    /// Creates a new outbound [`RoapMessageType::Error`] of the provided
    /// kind.
    #[must_use]
    pub fn error(error_type: RoapErrorType, seq: u64) -> Self {
        Self {
            message_type: RoapMessageType::Error,
            seq,
            sdp: None,
            tie_breaker: None,
            error_type: Some(error_type),
            offerer_session_id: None,
            answerer_session_id: None,
        }
    }

    /// Checks that every field required by this message's type is present.
    ///
    /// # Errors
    ///
    /// With [`InvalidRoapMessage`] naming the first missing field.
    pub fn validate(&self) -> Result<(), InvalidRoapMessage> {
        use RoapMessageType as Type;

        let missing = |field| InvalidRoapMessage {
            message_type: self.message_type,
            field,
        };

        match self.message_type {
            Type::Offer => {
                if self.sdp.is_none() {
                    return Err(missing("sdp"));
                }
                if self.tie_breaker.is_none() {
                    return Err(missing("tieBreaker"));
                }
            }
            Type::OfferResponse | Type::Answer => {
                if self.sdp.is_none() {
                    return Err(missing("sdp"));
                }
            }
            Type::Error => {
                if self.error_type.is_none() {
                    return Err(missing("errorType"));
                }
            }
            Type::OfferRequest | Type::Ok => (),
        }
        Ok(())
    }

    /// Serializes this [`RoapMessage`] to its JSON wire form.
    ///
    /// # Errors
    ///
    /// With [`JsonParseError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, JsonParseError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Parses a [`RoapMessage`] from its JSON wire form.
    ///
    /// # Errors
    ///
    /// With [`JsonParseError`] if the provided string is not a valid ROAP
    /// message (unknown message or error type included).
    pub fn from_json(json: &str) -> Result<Self, JsonParseError> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serializes_offer_with_wire_names() {
        let mut msg = RoapMessage::offer(1, String::from("v=0"));
        msg.offerer_session_id = Some(String::from("13456789"));

        let json: serde_json::Value =
            serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["messageType"], "OFFER");
        assert_eq!(json["seq"], 1);
        assert_eq!(json["sdp"], "v=0");
        assert_eq!(json["tieBreaker"], 0xFFFF_FFFEu32);
        assert_eq!(json["offererSessionId"], "13456789");
        assert!(json.get("errorType").is_none());
        assert!(json.get("answererSessionId").is_none());
    }

    #[test]
    fn serializes_error_tokens_verbatim() {
        for (kind, token) in &[
            (RoapErrorType::Conflict, "CONFLICT"),
            (RoapErrorType::DoubleConflict, "DOUBLECONFLICT"),
            (RoapErrorType::InvalidState, "INVALID_STATE"),
            (RoapErrorType::OutOfOrder, "OUT_OF_ORDER"),
            (RoapErrorType::Retry, "RETRY"),
            (RoapErrorType::Failed, "FAILED"),
            (RoapErrorType::NoMatch, "NOMATCH"),
            (RoapErrorType::Timeout, "TIMEOUT"),
        ] {
            let json: serde_json::Value = serde_json::from_str(
                &RoapMessage::error(*kind, 3).to_json().unwrap(),
            )
            .unwrap();

            assert_eq!(json["messageType"], "ERROR");
            assert_eq!(json["errorType"], *token);
            assert!(json.get("sdp").is_none());
        }
    }

    #[test]
    fn parses_remote_offer() {
        let msg = RoapMessage::from_json(
            r#"{
                "messageType": "OFFER",
                "seq": 7,
                "sdp": "v=0",
                "tieBreaker": 256,
                "offererSessionId": "abc",
                "answererSessionId": "def"
            }"#,
        )
        .unwrap();

        assert_eq!(msg.message_type, RoapMessageType::Offer);
        assert_eq!(msg.seq, 7);
        assert_eq!(msg.sdp.as_deref(), Some("v=0"));
        assert_eq!(msg.tie_breaker, Some(0x100));
        assert_eq!(msg.offerer_session_id.as_deref(), Some("abc"));
        assert_eq!(msg.answerer_session_id.as_deref(), Some("def"));
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn round_trips_every_message_type() {
        let messages = vec![
            RoapMessage::offer(1, String::from("v=0")),
            RoapMessage::offer_response(10, String::from("v=0")),
            RoapMessage::answer(2, String::from("v=0")),
            RoapMessage::ok(2),
            RoapMessage::error(RoapErrorType::Conflict, 4),
        ];

        for msg in messages {
            let parsed =
                RoapMessage::from_json(&msg.to_json().unwrap()).unwrap();
            assert_eq!(parsed, msg);
        }
    }

    #[test]
    fn rejects_unknown_message_type() {
        assert!(RoapMessage::from_json(
            r#"{"messageType": "SHUTDOWN", "seq": 1}"#
        )
        .is_err());
        assert!(RoapMessage::from_json(
            r#"{"messageType": "ERROR", "seq": 1, "errorType": "BOOM"}"#
        )
        .is_err());
    }

    #[test]
    fn validation_requires_per_type_fields() {
        let mut offer = RoapMessage::offer(1, String::from("v=0"));
        offer.sdp = None;
        assert!(offer.validate().is_err());

        let mut offer = RoapMessage::offer(1, String::from("v=0"));
        offer.tie_breaker = None;
        assert!(offer.validate().is_err());

        let mut answer = RoapMessage::answer(1, String::from("v=0"));
        answer.sdp = None;
        assert!(answer.validate().is_err());

        let mut err = RoapMessage::error(RoapErrorType::Failed, 1);
        err.error_type = None;
        assert!(err.validate().is_err());

        assert!(RoapMessage::ok(1).validate().is_ok());
        let request = RoapMessage {
            message_type: RoapMessageType::OfferRequest,
            seq: 1,
            sdp: None,
            tie_breaker: None,
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn retryable_classification() {
        use RoapErrorType as E;

        for kind in &[E::DoubleConflict, E::InvalidState, E::OutOfOrder, E::Retry]
        {
            assert!(kind.is_retryable(), "{} must be retryable", kind);
        }
        for kind in &[E::Conflict, E::Failed, E::NoMatch, E::Timeout] {
            assert!(!kind.is_retryable(), "{} must be fatal", kind);
        }
    }
}
