//! Session Registry
//!
//! The downstream facade the presentation layer talks to. It owns every
//! [`AgentProcessAdapter`](crate::adapter::AgentProcessAdapter), tracks focus
//! and routes commands that omit a session id to the focused session.
//!
//! This module is organized into logical submodules:
//! - `core`: Registry struct, construction, routing and shutdown
//! - `lifecycle`: Session creation, closing and focus
//! - `interaction`: Messages, stops, permissions and edit modes
//! - `list`: Session summaries

mod core;
mod interaction;
mod lifecycle;
mod list;

pub use core::SessionRegistry;
