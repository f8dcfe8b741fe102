//! End-to-end tests over the public crate API.

mod pipeline;
mod simulation;
