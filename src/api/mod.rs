// src/api/mod.rs
pub mod auth;
pub mod error;
pub mod passwords;
pub mod routes;
