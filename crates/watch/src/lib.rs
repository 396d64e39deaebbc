//! `jw-watch`: command-line front end for the job-progress client.
//!
//! Registers a client id with the generation backend over HTTP, attaches a
//! [`jw_client::ProgressClient`] to the progress stream, starts the job once
//! the stream is open, and prints progress until the job finishes.

pub mod api;
pub mod cli;
pub mod config;
pub mod watch;
