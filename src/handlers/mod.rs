//! Request handlers module

pub mod activity;
pub mod auth;
pub mod config;
pub mod department;
pub mod document;
pub mod document_type;
pub mod folder;
pub mod notification;
pub mod share;
pub mod user;
