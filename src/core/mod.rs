//! Core domain helpers shared by the store and the transfer engine.
//!
//! Keys and versions are opaque tokens end to end; the modules here only
//! know the lifecycle suffix convention, the chunk codec, the content
//! hash, and the normative limits.

pub mod chunk;
pub mod hash;
pub mod limits;
pub mod tag;

pub use limits::Limits;
pub use tag::{
    is_final, is_pending, is_scratch, pending_name, scratch_name, PENDING_SUFFIX, SCRATCH_SUFFIX,
};
