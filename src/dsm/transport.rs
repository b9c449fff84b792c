//! In-process transport for a fixed group of processes.
//!
//! Uses crossbeam channels, one per (source, destination, class) triple, so
//! delivery is FIFO within each logical stream and streams never interfere
//! with each other. This mirrors what a point-to-point messaging layer with
//! per-tag ordering provides, which is exactly the guarantee the ordering
//! protocol leans on: all order records for one destination share a stream.
//!
//! Self-streams exist too — the sequencer reaches its own replica by sending
//! to itself like to any other subscriber.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::message::{DsmMessage, MessageClass};
use super::subscription::MAX_GROUP_SIZE;

/// Source selector for probe/receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Match any process, scanned in ascending id order.
    Any,
    /// Match one specific process.
    Process(u32),
}

/// A transport endpoint owned by a single process.
pub struct Endpoint {
    process_id: u32,
    group_size: u32,
    /// Inbound streams, keyed by (source, class).
    rx: HashMap<(u32, MessageClass), Receiver<DsmMessage>>,
    /// Outbound streams, keyed by (destination, class).
    tx: HashMap<(u32, MessageClass), Sender<DsmMessage>>,
}

impl Endpoint {
    /// This endpoint's process id.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Number of processes in the group.
    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// Send a message to `dest` on the stream its class dictates.
    ///
    /// Returns false if the destination endpoint no longer exists.
    pub fn send(&self, dest: u32, msg: DsmMessage) -> bool {
        let class = msg.class();
        match self.tx.get(&(dest, class)) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Non-blocking check whether a message of `class` is waiting.
    pub fn probe(&self, source: Source, class: MessageClass) -> bool {
        match source {
            Source::Process(p) => self
                .rx
                .get(&(p, class))
                .map(|rx| !rx.is_empty())
                .unwrap_or(false),
            Source::Any => (0..self.group_size).any(|p| self.probe(Source::Process(p), class)),
        }
    }

    /// Dequeue one matching message without blocking.
    ///
    /// Returns the sending process together with the message.
    pub fn try_recv(&self, source: Source, class: MessageClass) -> Option<(u32, DsmMessage)> {
        match source {
            Source::Process(p) => {
                let rx = self.rx.get(&(p, class))?;
                rx.try_recv().ok().map(|msg| (p, msg))
            }
            Source::Any => {
                (0..self.group_size).find_map(|p| self.try_recv(Source::Process(p), class))
            }
        }
    }

    /// Block up to `timeout` for one message from a specific source.
    pub fn recv_timeout(
        &self,
        source: u32,
        class: MessageClass,
        timeout: Duration,
    ) -> Option<DsmMessage> {
        let rx = self.rx.get(&(source, class))?;
        rx.recv_timeout(timeout).ok()
    }
}

/// Builds the full mesh of streams for a process group.
///
/// Create one, then hand each process its endpoint. Endpoints can be moved
/// to threads; the network itself is only needed during setup.
pub struct Network {
    group_size: u32,
    /// Sender halves, keyed by (source, destination, class).
    senders: HashMap<(u32, u32, MessageClass), Sender<DsmMessage>>,
    /// Receiver halves, moved out when the destination's endpoint is created.
    receivers: HashMap<(u32, u32, MessageClass), Receiver<DsmMessage>>,
}

impl Network {
    /// Create a network for `group_size` processes (ids 0..group_size).
    pub fn new(group_size: u32) -> Self {
        assert!(
            group_size <= MAX_GROUP_SIZE,
            "group size {} exceeds MAX_GROUP_SIZE",
            group_size
        );

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for from in 0..group_size {
            for to in 0..group_size {
                for class in MessageClass::ALL {
                    let (tx, rx) = unbounded();
                    senders.insert((from, to, class), tx);
                    receivers.insert((from, to, class), rx);
                }
            }
        }

        Network {
            group_size,
            senders,
            receivers,
        }
    }

    /// Create the endpoint for `process_id`.
    ///
    /// Consumes that process's receiver halves, so it can only be called once
    /// per process.
    pub fn create_endpoint(&mut self, process_id: u32) -> Option<Endpoint> {
        if process_id >= self.group_size {
            return None;
        }

        let mut rx = HashMap::new();
        for from in 0..self.group_size {
            for class in MessageClass::ALL {
                rx.insert((from, class), self.receivers.remove(&(from, process_id, class))?);
            }
        }

        let mut tx = HashMap::new();
        for to in 0..self.group_size {
            for class in MessageClass::ALL {
                tx.insert((to, class), self.senders[&(process_id, to, class)].clone());
            }
        }

        Some(Endpoint {
            process_id,
            group_size: self.group_size,
            rx,
            tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::message::OrderedOp;

    fn order(seq: u64) -> DsmMessage {
        DsmMessage::OrderApply {
            seq,
            var: "A".to_string(),
            op: OrderedOp::Write { value: 1 },
            origin: 0,
            request_id: seq,
        }
    }

    #[test]
    fn test_fifo_per_stream() {
        let mut network = Network::new(2);
        let ep0 = network.create_endpoint(0).unwrap();
        let ep1 = network.create_endpoint(1).unwrap();

        for seq in 1..=5 {
            assert!(ep0.send(1, order(seq)));
        }

        for expected in 1..=5 {
            let (from, msg) = ep1.try_recv(Source::Process(0), MessageClass::Order).unwrap();
            assert_eq!(from, 0);
            assert_eq!(msg.seq(), Some(expected));
        }
        assert!(ep1.try_recv(Source::Process(0), MessageClass::Order).is_none());
    }

    #[test]
    fn test_classes_are_independent_streams() {
        let mut network = Network::new(2);
        let ep0 = network.create_endpoint(0).unwrap();
        let ep1 = network.create_endpoint(1).unwrap();

        assert!(ep0.send(1, DsmMessage::Stop));
        assert!(ep0.send(1, order(1)));

        // Draining the order stream leaves the stop message untouched.
        assert!(ep1.probe(Source::Any, MessageClass::Stop));
        let (_, msg) = ep1.try_recv(Source::Process(0), MessageClass::Order).unwrap();
        assert_eq!(msg.seq(), Some(1));
        assert!(ep1.probe(Source::Process(0), MessageClass::Stop));
    }

    #[test]
    fn test_probe_and_self_stream() {
        let mut network = Network::new(3);
        let ep0 = network.create_endpoint(0).unwrap();

        assert!(!ep0.probe(Source::Any, MessageClass::Order));

        // A process can send to itself; the sequencer's own replica relies on it.
        assert!(ep0.send(0, order(9)));
        assert!(ep0.probe(Source::Process(0), MessageClass::Order));
        assert!(ep0.probe(Source::Any, MessageClass::Order));

        let (from, msg) = ep0.try_recv(Source::Any, MessageClass::Order).unwrap();
        assert_eq!(from, 0);
        assert_eq!(msg.seq(), Some(9));
    }

    #[test]
    fn test_endpoint_created_once() {
        let mut network = Network::new(2);
        assert!(network.create_endpoint(1).is_some());
        assert!(network.create_endpoint(1).is_none());
        assert!(network.create_endpoint(7).is_none());
    }

    #[test]
    fn test_recv_timeout() {
        let mut network = Network::new(2);
        let ep0 = network.create_endpoint(0).unwrap();
        let ep1 = network.create_endpoint(1).unwrap();

        assert!(ep1
            .recv_timeout(0, MessageClass::Order, Duration::from_millis(10))
            .is_none());

        assert!(ep0.send(1, order(3)));
        let msg = ep1
            .recv_timeout(0, MessageClass::Order, Duration::from_millis(100))
            .unwrap();
        assert_eq!(msg.seq(), Some(3));
    }
}
