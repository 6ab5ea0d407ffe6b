//! unpackd - resumable batch archive extraction
//!
//! Reads a list of archive paths, extracts each one with an external
//! archiver, deletes the source on success and records it in a completion
//! ledger so an interrupted run picks up where it stopped.

pub mod archive;
pub mod batch;
pub mod disk;
pub mod progress_log;
pub mod settings;
