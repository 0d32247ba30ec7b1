//! Sales Voice API Library Crate
//!
//! This library contains the web service around the sales voice agent: the
//! application state, the voice agent WebSocket, the demo chat REST API and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod demo;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
