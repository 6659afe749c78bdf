//! ISO9660 extension decoding: Rock Ridge (SUSP) and Joliet

pub mod joliet;
pub mod rock_ridge;
