//! beaconproto - wire protocol types for the beacon monitor relay
//!
//! This crate is the JSON boundary between the herald gateway and the
//! beacon monitor:
//! - `request`: the two tool request kinds and their validation layer
//! - `envelope`: the outbound wire envelope with injected metadata
//!
//! Validation and envelope building are pure (apart from the clock and
//! the request-id sequence); no I/O happens in this crate.

pub mod envelope;
pub mod request;

pub use envelope::{Envelope, IdentifyPayload};
pub use request::{
    AuthorizationRequest, FieldError, RawAuthorization, RawTaskEvent, TaskEvent, TaskEventKind,
    ValidationError,
};
