//! Terminal client for the AudioAddict family of streaming radio networks.
//!
//! `api` scrapes and talks to the networks, `player` turns a tuned channel
//! into continuous audio, and `app`/`ui` are the terminal front end.

pub mod actions;
pub mod api;
pub mod app;
pub mod audio;
pub mod commands;
pub mod config;
pub mod player;
pub mod status;
pub mod ui;
pub mod utils;
