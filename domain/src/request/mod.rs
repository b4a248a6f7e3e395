//! Request domain module
//!
//! The request record is the persisted finite-state machine of one query.
//! Any process can read it to learn how far orchestration has progressed.

pub mod entities;

pub use entities::{
    Request, RequestFailure, RequestOutput, RequestPhase, RequestStatus, RequestTransition,
};
