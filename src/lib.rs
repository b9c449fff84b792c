//! totem: total-order update propagation for replicated variables.
//!
//! See [`dsm`] for the protocol layer; `src/main.rs` runs a small
//! thread-per-process demo group on the in-process transport.

pub mod dsm;
