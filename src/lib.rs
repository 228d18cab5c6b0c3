// Library entry point for vistagram
// Exposes modules for testing

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod graph;
pub mod interactions;
pub mod models;
pub mod store;
pub mod validation;
