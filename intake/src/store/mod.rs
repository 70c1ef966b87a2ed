//! Upload acceptance.
//!
//! The acceptor takes a named byte stream and either persists it under the
//! configured storage directory or fails with a typed error, guaranteeing
//! that no partially written file survives a failure.

mod acceptor;

pub use acceptor::{StoredFile, accept, ensure_storage_dir, sanitize_filename, to_megabytes};
