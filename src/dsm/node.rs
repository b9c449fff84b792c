use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::config::GroupConfig;
use super::errors::DsmError;
use super::message::{DsmMessage, MessageClass, OrderedOp};
use super::subscription::SubscriptionTable;
use super::transport::{Endpoint, Source};

/// Pause between progress attempts while a CAS call waits for its outcome.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Called when an applied order record changes a local variable.
///
/// Notifications arrive in the sequence-number order the records were
/// applied: exactly one per write record, and one per successful CAS record.
/// A failed CAS changes nothing and stays silent.
pub trait ChangeListener: Send {
    fn on_change(&mut self, seq: u64, var: &str, new_value: i32);
}

impl<F> ChangeListener for F
where
    F: FnMut(u64, &str, i32) + Send,
{
    fn on_change(&mut self, seq: u64, var: &str, new_value: i32) {
        self(seq, var, new_value)
    }
}

/// One process's view of the replicated variable group.
///
/// Every process runs the replica role: it applies order records addressed to
/// it, in arrival order, to its local value cache. The process named by the
/// group configuration additionally runs the sequencer role: it drains
/// pending requests, assigns each accepted one a strictly increasing global
/// sequence number, decides CAS outcomes against its own authoritative
/// values, and multicasts the resulting order record to the target variable's
/// subscriber set only.
///
/// A node has a single logical thread of control. Nothing advances unless the
/// owning process pumps [`DsmNode::progress`]; `write` never suspends, and
/// `compare_and_exchange` is the only call that blocks, pumping internally
/// until its outcome arrives.
///
/// # Invariants
///
/// 1. The global sequence number strictly increases with every accepted
///    request; rejected requests consume no number.
/// 2. All order records for one variable reach each subscriber over the same
///    stream, so subscribers see them in identical sequence order.
/// 3. A CAS outcome is decided exactly once, by the sequencer; replicas echo
///    the carried flag and never recompute it.
/// 4. Subscribers that applied the same prefix of a variable's records hold
///    identical values for it.
pub struct DsmNode {
    process_id: u32,
    sequencer: u32,
    table: SubscriptionTable,
    endpoint: Endpoint,

    /// Local replica of values, authoritative only for subscribed variables.
    /// Every declared variable starts at 0 regardless of subscription.
    local_values: HashMap<String, i32>,

    /// Last assigned global sequence number. Only the sequencer advances it.
    global_seq: u64,

    /// Per-process request id generator.
    next_request_id: u64,

    /// CAS outcomes awaiting consumption by their blocked caller.
    cas_results: HashMap<u64, bool>,

    listener: Option<Box<dyn ChangeListener>>,
}

impl DsmNode {
    /// Create a node from the group configuration and this process's
    /// endpoint. The listener, if any, fires from within `progress`.
    pub fn new(
        config: GroupConfig,
        endpoint: Endpoint,
        listener: Option<Box<dyn ChangeListener>>,
    ) -> Self {
        let mut local_values = HashMap::new();
        for var in config.subscriptions.variables() {
            local_values.insert(var.to_string(), 0);
        }

        DsmNode {
            process_id: endpoint.process_id(),
            sequencer: config.sequencer,
            table: config.subscriptions,
            endpoint,
            local_values,
            global_seq: 0,
            next_request_id: 1,
            cas_results: HashMap::new(),
            listener,
        }
    }

    /// This process's id.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// True if this process holds the sequencer role.
    pub fn is_sequencer(&self) -> bool {
        self.process_id == self.sequencer
    }

    /// The local replica value, 0 for declared-but-never-updated variables.
    ///
    /// Only meaningful when this process subscribes to `var`; a
    /// non-subscriber keeps the initialization default for the whole run.
    pub fn get_local_value(&self, var: &str) -> i32 {
        self.local_values.get(var).copied().unwrap_or(0)
    }

    /// Last sequence number this node assigned. Zero on non-sequencers.
    pub fn last_sequence(&self) -> u64 {
        self.global_seq
    }

    /// Number of CAS outcomes delivered but not yet consumed by a caller.
    pub fn outstanding_cas(&self) -> usize {
        self.cas_results.len()
    }

    // ======= CLIENT SURFACE =======

    /// Request an unconditional write of `var`.
    ///
    /// Non-blocking: the request is on its way to the sequencer when this
    /// returns, and the local replica updates once the order record comes
    /// back through `progress`. Fails fast, before anything is sent, if this
    /// process is not a subscriber.
    pub fn write(&mut self, var: &str, value: i32) -> Result<(), DsmError> {
        self.ensure_subscriber(var)?;

        let request_id = self.fresh_request_id();
        self.send_to_sequencer(DsmMessage::WriteRequest {
            var: var.to_string(),
            value,
            origin: self.process_id,
            request_id,
        })
    }

    /// Compare-and-exchange: store `new_value` iff the globally agreed value
    /// of `var` equals `expected` at the instant of sequencing.
    ///
    /// Blocks until the matching order record has been applied locally and
    /// returns the sequencer-decided outcome. There is no timeout: if the
    /// sequencer never answers, the call never returns.
    pub fn compare_and_exchange(
        &mut self,
        var: &str,
        expected: i32,
        new_value: i32,
    ) -> Result<bool, DsmError> {
        self.ensure_subscriber(var)?;

        let request_id = self.fresh_request_id();
        self.send_to_sequencer(DsmMessage::CasRequest {
            var: var.to_string(),
            expected,
            new_value,
            origin: self.process_id,
            request_id,
        })?;

        loop {
            self.progress();

            if let Some(success) = self.cas_results.remove(&request_id) {
                return Ok(success);
            }

            if self.is_sequencer() {
                // Our own progress call is the only thing that can resolve us.
                thread::yield_now();
            } else if let Some(msg) =
                self.endpoint
                    .recv_timeout(self.sequencer, MessageClass::Order, POLL_INTERVAL)
            {
                self.apply_ordered(msg);
            }
        }
    }

    // ======= PROGRESS =======

    /// Advance the protocol: drain and handle all pending requests when this
    /// process is the sequencer, then drain and apply all pending order
    /// records. Must be pumped regularly by the owning process.
    pub fn progress(&mut self) {
        if self.is_sequencer() {
            while let Some((_, req)) = self.endpoint.try_recv(Source::Any, MessageClass::Request) {
                self.handle_request(req);
            }
        }

        while let Some((_, msg)) = self
            .endpoint
            .try_recv(Source::Process(self.sequencer), MessageClass::Order)
        {
            self.apply_ordered(msg);
        }
    }

    /// Pump `progress` with short pauses until `window` has elapsed.
    pub fn drain_best_effort(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            self.progress();
            thread::sleep(POLL_INTERVAL);
        }
    }

    // ======= STOP PROTOCOL =======

    /// Broadcast the termination signal to every process, itself included.
    /// Only the sequencer coordinates shutdown; a no-op elsewhere.
    pub fn broadcast_stop(&self) {
        if !self.is_sequencer() {
            return;
        }
        for dest in 0..self.endpoint.group_size() {
            self.endpoint.send(dest, DsmMessage::Stop);
        }
    }

    /// Non-blocking check for a pending termination signal.
    pub fn poll_stop(&self) -> bool {
        self.endpoint.probe(Source::Any, MessageClass::Stop)
    }

    /// Pump the protocol until the termination signal arrives, then consume
    /// it. Call this before exiting the process's main loop.
    pub fn await_stop(&mut self) {
        loop {
            self.progress();
            if self
                .endpoint
                .try_recv(Source::Any, MessageClass::Stop)
                .is_some()
            {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    // ======= SEQUENCER ROLE =======

    fn handle_request(&mut self, req: DsmMessage) {
        match req {
            DsmMessage::WriteRequest {
                var,
                value,
                origin,
                request_id,
            } => {
                if !self.authorize(&var, origin) {
                    return;
                }

                self.global_seq += 1;
                debug!(seq = self.global_seq, %var, value, origin, "sequenced write");

                self.multicast(
                    &var,
                    DsmMessage::OrderApply {
                        seq: self.global_seq,
                        var: var.clone(),
                        op: OrderedOp::Write { value },
                        origin,
                        request_id,
                    },
                );

                // The authoritative copy updates at sequencing time whether or
                // not the sequencer subscribes to the variable.
                self.local_values.insert(var, value);
            }

            DsmMessage::CasRequest {
                var,
                expected,
                new_value,
                origin,
                request_id,
            } => {
                if !self.authorize(&var, origin) {
                    return;
                }

                self.global_seq += 1;

                let current = self.local_values.get(&var).copied().unwrap_or(0);
                let success = current == expected;
                if success {
                    self.local_values.insert(var.clone(), new_value);
                }
                debug!(
                    seq = self.global_seq,
                    %var, expected, new_value, success, origin, "sequenced CAS"
                );

                self.multicast(
                    &var,
                    DsmMessage::OrderApply {
                        seq: self.global_seq,
                        var: var.clone(),
                        op: OrderedOp::Cas {
                            expected,
                            new_value,
                            success,
                        },
                        origin,
                        request_id,
                    },
                );
            }

            other => {
                warn!(process = self.process_id, ?other, "non-request on the request stream");
            }
        }
    }

    /// Sequencer-side enforcement. Unauthorized requests are dropped with no
    /// side effect and no reply; the origin's own pre-send check is the only
    /// reporting path.
    fn authorize(&self, var: &str, origin: u32) -> bool {
        if self.table.is_subscriber(var, origin) {
            true
        } else {
            warn!(%var, origin, "dropping request from non-subscriber");
            false
        }
    }

    /// Send one copy of `order` to each subscriber of `var`, this process
    /// included when it subscribes.
    fn multicast(&self, var: &str, order: DsmMessage) {
        let Some(subscribers) = self.table.subscribers(var) else {
            return;
        };
        for dest in subscribers.iter() {
            if !self.endpoint.send(dest, order.clone()) {
                warn!(dest, %var, "subscriber endpoint is gone, order record dropped");
            }
        }
    }

    // ======= REPLICA ROLE =======

    fn apply_ordered(&mut self, msg: DsmMessage) {
        let (seq, var, op, origin, request_id) = match msg {
            DsmMessage::OrderApply {
                seq,
                var,
                op,
                origin,
                request_id,
            } => (seq, var, op, origin, request_id),
            other => {
                warn!(process = self.process_id, ?other, "non-order record on the order stream");
                return;
            }
        };

        // The sequencer only multicasts to subscribers; receiving a record
        // for a variable we never subscribed to is a protocol violation.
        if !self.table.is_subscriber(&var, self.process_id) {
            warn!(
                process = self.process_id,
                seq, %var, "order record for unsubscribed variable, ignoring"
            );
            return;
        }

        let changed = match op {
            OrderedOp::Write { value } => {
                self.local_values.insert(var.clone(), value);
                true
            }
            OrderedOp::Cas {
                new_value, success, ..
            } => {
                if success {
                    self.local_values.insert(var.clone(), new_value);
                }
                // The origin learns the outcome even when nothing changed.
                if origin == self.process_id {
                    self.cas_results.insert(request_id, success);
                }
                success
            }
        };

        if changed {
            let new_value = self.get_local_value(&var);
            if let Some(listener) = self.listener.as_mut() {
                listener.on_change(seq, &var, new_value);
            }
        }
    }

    // ======= INTERNALS =======

    fn ensure_subscriber(&self, var: &str) -> Result<(), DsmError> {
        match self.table.subscribers(var) {
            None => Err(DsmError::UnknownVariable {
                var: var.to_string(),
            }),
            Some(set) if !set.contains(self.process_id) => Err(DsmError::NotSubscribed {
                process: self.process_id,
                var: var.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn fresh_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn send_to_sequencer(&self, req: DsmMessage) -> Result<(), DsmError> {
        if self.endpoint.send(self.sequencer, req) {
            Ok(())
        } else {
            Err(DsmError::Disconnected {
                dest: self.sequencer,
            })
        }
    }
}
