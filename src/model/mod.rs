//! Data types shared between the POP3 session, the archive and the pipeline.

pub mod message;
pub mod outcome;
