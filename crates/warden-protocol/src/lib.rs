//! Shared vocabulary for Lobby Warden.
//!
//! - **Types** ([`SteamId`], [`LobbyId`], [`PlayerClass`], [`ClassTimes`],
//!   [`CloseReason`]): identities and domain values every crate agrees on.
//! - **Events** ([`EventMessage`], [`IncomingEvent`]): what game-server
//!   agents report, raw and validated.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes to events.
//! - **Errors** ([`ProtocolError`], [`ErrorKind`]): everything that makes an
//!   event malformed, and the shared failure taxonomy.

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{ErrorKind, ProtocolError};
pub use event::{EventMessage, IncomingEvent, names};
pub use types::{
    ClassTimes, CloseReason, LobbyId, PlayerClass, SteamId, Team, is_bot_identity,
};
