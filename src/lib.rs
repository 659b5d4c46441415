//! Moxie chat client
//!
//! Streams assistant replies from a Moxie server into a local transcript.
//!
//! - [`stream`] decodes the server-sent event stream and runs one turn per task
//! - [`ChatEngine`](crate::core::ChatEngine) owns the transcript and the single in-flight turn
//! - [`client`] talks to the chat and knowledge endpoints
//! - [`config`] layers environment variables and an optional TOML file

pub mod client;
pub mod config;
pub mod conversation;
pub mod core;
pub mod stream;

pub use crate::config::{ClientConfig, Config};
pub use crate::conversation::{Message, Role, Transcript};
pub use crate::core::{ChatEngine, TurnUpdate};
