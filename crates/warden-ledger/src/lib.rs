//! Player records and the ban ledger for Lobby Warden.
//!
//! This crate owns everything that outlives a single lobby:
//!
//! 1. **Records**: [`Player`] (bans, lifetime class playtime, incident
//!    history) and [`LobbyRecord`].
//! 2. **Rules**: [`BanPolicy`], the deterministic rule table that turns a
//!    ragequit, a report, or a repeat substitution into a time-boxed ban.
//! 3. **Ledger**: [`BanLedger`], which applies the rules and answers
//!    "may this player join right now?".
//! 4. **Storage**: the [`Store`] trait, implemented by the host, plus an
//!    in-memory [`MemoryStore`] for tests and single-process deployments.
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby layer (above)     ← checks eligibility on join, bans on ragequit
//!     ↕
//! Ledger layer (this crate)
//!     ↕
//! Protocol layer (below)  ← SteamId, LobbyId, ClassTimes
//! ```

mod error;
mod ledger;
mod model;
mod policy;
mod store;

pub use error::{LedgerError, StoreError};
pub use ledger::BanLedger;
pub use model::{Ban, BanReason, IncidentKind, IncidentRecord, LobbyRecord, Player};
pub use policy::BanPolicy;
pub use store::{MemoryStore, Store};
