//! Email parsing: streaming MBOX reader and header access.

pub mod header;
pub mod mbox;
