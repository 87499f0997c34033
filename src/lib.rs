//! `skronk` - time-boxed penalty role bot
//!
//! A `/skronk` invocation puts a marker role on a group member for a while.
//! Repeat invocations extend the running penalty instead of starting a new
//! one, and a single expiry watcher per penalty removes the role once the
//! accumulated time has run out.

pub mod adapter;
pub mod bot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod observability;
pub mod penalty;
pub mod platform;
pub mod transport;
