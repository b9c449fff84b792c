//! Group configuration.
//!
//! The sequencer identity and the subscription table are configuration, not
//! protocol state: both are fixed before the group starts and never change
//! during a run.

use serde::{Deserialize, Serialize};

use super::subscription::SubscriptionTable;

/// Static configuration shared by every process in the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// The process holding the sequencer role.
    ///
    /// By convention this process should appear in every subscriber set; the
    /// protocol keeps working without it, but the sequencer's own replica
    /// then diverges silently from what it multicasts.
    pub sequencer: u32,

    /// Variable -> subscriber set, fixed for the run.
    pub subscriptions: SubscriptionTable,
}

impl GroupConfig {
    pub fn new(sequencer: u32, subscriptions: SubscriptionTable) -> Self {
        GroupConfig {
            sequencer,
            subscriptions,
        }
    }

    /// Iterate the declared variable names.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.variables()
    }
}
