//! Glue layer that exposes the `cast`-backed contract client to the rest of
//! the twinvault stack. The heavy lifting lives in `cast`, while `command` and
//! `parse` cover process and output handling.

mod cast;
mod command;
mod parse;

pub use cast::{CastKvClient, CastSigner, DEFAULT_CAST_PATHS};
