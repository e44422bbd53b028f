//! Search engine: tokenizer, query parsing, message and contact ranking.

pub mod contacts;
pub mod query;
pub mod ranker;
pub mod tokenizer;
