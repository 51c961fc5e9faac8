//! Usage: Cross-cutting helpers (errors, blocking bridge, masking, single-shot handoff).

pub(crate) mod blocking;
pub mod error;
pub(crate) mod mutex_ext;
pub(crate) mod security;
pub(crate) mod single_shot;
