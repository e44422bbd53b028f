//! `mailsift`: an in-process, offline search engine for a mailbox.
//!
//! The crate keeps an inverted index over messages and a contact table
//! derived from senders, parses Gmail-style queries, ranks results locally,
//! and tells callers when a query must go to a remote search backend instead.

pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod feed;
pub mod index;
pub mod model;
pub mod search;

pub use engine::{Readiness, SearchEngine, SearchOptions};
pub use search::query::{has_unsupported_operators, parse_query as parse_search_query};
