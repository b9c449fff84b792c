use serde::{Deserialize, Serialize};

/// Transport-level message class.
///
/// Each class is carried on its own logical stream per (source, destination)
/// pair. Delivery order is guaranteed only within a single stream, so messages
/// whose relative order matters must share a class: all order records for a
/// given destination travel on `Order`, all requests to the sequencer on
/// `Request`. `Stop` is out-of-band control traffic and is never sequenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageClass {
    /// Origin -> sequencer: unsequenced update intents.
    Request,
    /// Sequencer -> subscribers: sequenced order records.
    Order,
    /// Sequencer -> everyone: termination signal.
    Stop,
}

impl MessageClass {
    /// Every class, for transport setup.
    pub const ALL: [MessageClass; 3] =
        [MessageClass::Request, MessageClass::Order, MessageClass::Stop];
}

/// The operation carried by an order record.
///
/// One payload shape per case; a CAS record additionally carries the outcome
/// the sequencer decided at sequencing time. Replicas echo that flag, they
/// never recompute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderedOp {
    /// Unconditional store of `value`.
    Write { value: i32 },
    /// Conditional store: applied iff `success`, which the sequencer set to
    /// `current == expected` at the instant of sequencing.
    Cas { expected: i32, new_value: i32, success: bool },
}

/// Protocol messages.
///
/// Request variants are unsequenced intents on their way to the sequencer.
/// `OrderApply` is the sequencer's immutable decision, multicast to the target
/// variable's subscriber set. `Stop` carries nothing beyond its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DsmMessage {
    /// Plain write request.
    WriteRequest {
        var: String,
        value: i32,
        origin: u32,
        request_id: u64,
    },

    /// Compare-and-exchange request.
    CasRequest {
        var: String,
        expected: i32,
        new_value: i32,
        origin: u32,
        request_id: u64,
    },

    /// A sequenced order record.
    ///
    /// `seq` strictly increases across all variables for accepted requests.
    /// `origin` and `request_id` echo the request so the origin can resolve
    /// its pending CAS call.
    OrderApply {
        seq: u64,
        var: String,
        op: OrderedOp,
        origin: u32,
        request_id: u64,
    },

    /// Out-of-band termination broadcast.
    Stop,
}

impl DsmMessage {
    /// The transport class this message travels on.
    pub fn class(&self) -> MessageClass {
        match self {
            DsmMessage::WriteRequest { .. } | DsmMessage::CasRequest { .. } => MessageClass::Request,
            DsmMessage::OrderApply { .. } => MessageClass::Order,
            DsmMessage::Stop => MessageClass::Stop,
        }
    }

    /// The global sequence number, if this message carries one.
    pub fn seq(&self) -> Option<u64> {
        match self {
            DsmMessage::OrderApply { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    /// Serialize to the wire encoding.
    ///
    /// The in-process transport moves messages by value; this is the encoding
    /// a socket-backed transport would put on the wire.
    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("DsmMessage serialization should not fail")
    }

    /// Deserialize from the wire encoding.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classes() {
        let write = DsmMessage::WriteRequest {
            var: "A".to_string(),
            value: 1,
            origin: 2,
            request_id: 1,
        };
        let cas = DsmMessage::CasRequest {
            var: "A".to_string(),
            expected: 0,
            new_value: 1,
            origin: 2,
            request_id: 2,
        };
        let order = DsmMessage::OrderApply {
            seq: 7,
            var: "A".to_string(),
            op: OrderedOp::Write { value: 1 },
            origin: 2,
            request_id: 1,
        };

        assert_eq!(write.class(), MessageClass::Request);
        assert_eq!(cas.class(), MessageClass::Request);
        assert_eq!(order.class(), MessageClass::Order);
        assert_eq!(DsmMessage::Stop.class(), MessageClass::Stop);

        assert_eq!(order.seq(), Some(7));
        assert_eq!(write.seq(), None);
    }

    #[test]
    fn test_wire_round_trip() {
        let msg = DsmMessage::OrderApply {
            seq: 42,
            var: "B".to_string(),
            op: OrderedOp::Cas {
                expected: 3,
                new_value: 9,
                success: true,
            },
            origin: 1,
            request_id: 5,
        };

        let bytes = msg.serialize();
        let decoded = DsmMessage::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
