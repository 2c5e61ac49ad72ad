//! Prefix commands, scripted handlers, custom events and a rotating presence
//! for serenity bots.
//!
//! Handlers are either registered from Rust with [`Bot::command`] and
//! [`Bot::interaction`] or loaded from a directory of Luau scripts with
//! [`Bot::handler`]. Everything is registered before [`Bot::start`] and is
//! read-only once the client runs.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod loader;
pub mod lua;
pub mod presence;
pub mod registry;
pub mod variable;

pub use client::{Bot, BotOptions, KillSwitch};
pub use config::Configuration;
pub use dispatch::{CommandEvent, ComponentEvent};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventArgs, EventSource, GatewayEvent, NativeEvent};
pub use loader::LoadReport;
pub use presence::{Activity, ActivityKind, PresenceStatus};
pub use registry::{HandlerDescriptor, HandlerKind, Registry, handler_fn};
pub use variable::{Variable, VariableOptions};
