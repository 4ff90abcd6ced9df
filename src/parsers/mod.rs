//! Parsers for free-form text returned by text-completion providers.

pub mod json;
