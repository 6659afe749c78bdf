//! Shared helpers: sector math, identifier encodings, timestamp formats

pub mod datetime;
pub mod sector;
pub mod string;
