//! Sequencer-ordered replicated variables.
//!
//! A fixed group of processes shares named integer variables. One designated
//! process, the sequencer, assigns a total order to update requests (writes
//! and compare-and-exchange) and relays the resulting order records only to
//! the processes subscribed to the touched variable. Every process, the
//! sequencer included, applies records addressed to it in arrival order and
//! notifies a listener when a value changes.
//!
//! # Invariants
//!
//! 1. **Strict ordering**: the global sequence number increases with every
//!    accepted request; rejected requests consume no number.
//! 2. **Per-variable agreement**: subscribers of a variable receive its order
//!    records in identical sequence order.
//! 3. **Single decision point**: CAS outcomes are decided once, by the
//!    sequencer, and echoed by every replica.
//! 4. **Convergence**: subscribers that applied the same record prefix hold
//!    identical values.
//!
//! Not covered, on purpose: process crashes, resubscription, persistence,
//! transport security, sequencer failover.

pub mod config;
pub mod errors;
pub mod message;
pub mod node;
pub mod subscription;
pub mod transport;


pub use config::GroupConfig;
pub use errors::DsmError;
pub use message::{DsmMessage, MessageClass, OrderedOp};
pub use node::{ChangeListener, DsmNode, POLL_INTERVAL};
pub use subscription::{SubscriberSet, SubscriptionTable, MAX_GROUP_SIZE};
pub use transport::{Endpoint, Network, Source};
