//! Core data model types for indexed messages, contacts, and addresses.

pub mod address;
pub mod contact;
pub mod message;
