#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diff;
pub mod fetch;
pub mod fingerprint;
pub mod formats;
pub mod logging;
pub mod normalize;
pub mod notification;
pub mod resolve;
pub mod section;
