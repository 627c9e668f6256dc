//! Codec trait and implementations for event payloads.
//!
//! The ingestion loop only sees raw frames. A [`Codec`] turns those bytes
//! into an [`EventMessage`] and from there into a typed [`IncomingEvent`].
//! JSON is the only format agents speak today; the trait keeps the door
//! open for a compact binary format without touching the ingestor.

use serde::{Serialize, de::DeserializeOwned};

use crate::{EventMessage, IncomingEvent, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// the long-lived ingestion task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes one raw frame and validates it into an [`IncomingEvent`].
    ///
    /// # Errors
    /// Any decode or validation failure. Callers treat all of them as a
    /// malformed event and skip the frame.
    fn decode_event(&self, data: &[u8]) -> Result<IncomingEvent, ProtocolError> {
        let msg: EventMessage = self.decode(data)?;
        IncomingEvent::try_from(msg)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use warden_protocol::{Codec, IncomingEvent, JsonCodec, LobbyId};
///
/// let codec = JsonCodec;
/// let event = codec
///     .decode_event(br#"{"name":"discFromServer","lobbyId":3}"#)
///     .unwrap();
/// assert_eq!(event, IncomingEvent::ServerDisconnected { lobby: LobbyId(3) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{LobbyId, names};

    #[test]
    fn test_decode_event_rejects_invalid_json() {
        let err = JsonCodec.decode_event(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_decode_event_rejects_wrong_field_type() {
        let err = JsonCodec
            .decode_event(br#"{"name":"playerConn","lobbyId":"four"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_encoded_message_decodes_to_same_event() {
        let msg = EventMessage {
            name: names::PLAYER_CHAT.into(),
            steam_id: Some("76561197960287930".into()),
            lobby_id: Some(11),
            message: Some("gg".into()),
            ..EventMessage::default()
        };
        let bytes = JsonCodec.encode(&msg).unwrap();
        let event = JsonCodec.decode_event(&bytes).unwrap();
        assert_eq!(event.lobby(), LobbyId(11));
        assert!(matches!(event, IncomingEvent::PlayerChat { ref message, .. } if message == "gg"));
    }
}
