//! radiko / らじる★らじる protocol client shared by the daemon.

pub mod broadcaster;
pub mod client;
pub mod config;
pub mod error;
pub mod markup;
pub mod model;
pub mod parser;
pub mod platform;
pub mod session;

pub use error::{Error, Result};
