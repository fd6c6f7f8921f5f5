// src/lib.rs
//! Multi-user password vault. The binary in `main.rs` is a thin CLI over
//! these modules; a login front can link the crate and use
//! [`api::auth::sign_in`] on the shared session layer.

pub mod api;
pub mod cli;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod guard;
pub mod models;
pub mod pagination;
pub mod server;
pub mod state;
pub mod store;
