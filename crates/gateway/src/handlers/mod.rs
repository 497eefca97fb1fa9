//! Request handlers

pub mod chat;
pub mod data;
pub mod extract;
pub mod health;
pub mod progress;
