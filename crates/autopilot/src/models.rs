//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - the ledger of messages exchanged with the text generation provider
//! - fenced `tool_call` blocks emitted by the model inside free text
//! - tool results fed back to the model as a system message
//! - actions and the aggregate response surfaced to whoever drives the agent
//!
//! Providers convert the ledger into their own wire format; everything else
//! stays in these internal structs.
pub mod action;
pub mod message;
pub mod role;
pub mod tool;
