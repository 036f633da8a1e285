//! CloudBoard server library.
//!
//! Exposes the API server for use in tests and embedding: an axum HTTP/
//! WebSocket server combining tenant-scoped task CRUD, a realtime gateway
//! with per-organization broadcast rooms, and a notification dispatcher
//! that fans task assignments out to the in-app log, the live channel, and
//! email.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod rest;
pub mod state;
pub mod store;
pub mod tasks;
