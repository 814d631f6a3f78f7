//! Core of the contact/xls webhook bot.
//!
//! Framework-agnostic: the HTTP transport, Bot API calls and the office
//! converter live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod contacts;
pub mod convert;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;
pub mod response;
pub mod texts;
pub mod update;

pub use errors::{Error, Result};
