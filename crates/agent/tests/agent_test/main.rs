//! Integration tests for rasp-agent.
//!
//! The authority and its health endpoint are replaced by in-process mocks,
//! except in `end_to_end`, which talks to a scripted ROUTER socket.

mod end_to_end;
mod engines;
mod health;
mod lifecycle;
mod mocks;
mod sync;
