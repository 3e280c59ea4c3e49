//! # Response Module
//!
//! What handlers produce and how it becomes final:
//!
//! - [`core`] - the [`Response`] type, its [`Source`] and [`Variant`], and the
//!   optional [`Preparation`] step
//! - [`wrap`] - reduction of arbitrary handler output ([`Payload`]) into a
//!   response or a [`Fault`](crate::Fault)
//! - [`commit`] - the hold/send state machine deciding when a produced
//!   response is committed

mod commit;
mod core;
mod wrap;

pub use self::core::{
    preparation, HeaderVec, Outcome, Preparation, Response, Source, Variant, MAX_INLINE_HEADERS,
};
pub use commit::{CommitState, HeldResponse, PendingResponse};
pub use wrap::{wrap, Payload};
