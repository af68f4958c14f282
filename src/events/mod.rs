//! Wire events emitted by a running agent.
//!
//! The event vocabulary follows the AG-UI protocol: run lifecycle, streamed
//! text messages, streamed tool calls, coarse activity snapshots, and the
//! thinking channel. Events are consumed one at a time by the
//! [`crate::converter::EventConverter`].

pub mod types;

pub use types::{ActivityContent, RawEvent};
