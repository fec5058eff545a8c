//! Entity module - SeaORM entity definitions
//!
//! One module per table. Relations are left empty; lookups across tables are
//! written out as explicit queries.

pub mod activity;
pub mod department;
pub mod document;
pub mod document_type;
pub mod document_version;
pub mod folder;
pub mod notification;
pub mod role;
pub mod share;
pub mod user;
