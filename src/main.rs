//! Demo group run: four processes on threads over the in-process transport.
//!
//! Process 0 is the sequencer. Subscriptions: A {0,2}, B {0,1,2}, C {0,3}.
//! Processes 0 and 1 issue writes, process 2 races a pair of CAS calls
//! against them, then everyone reports its local view and the sequencer
//! broadcasts the stop signal.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use totem::dsm::{DsmNode, Endpoint, GroupConfig, Network, SubscriberSet, SubscriptionTable};

const GROUP_SIZE: u32 = 4;
const SEQUENCER: u32 = 0;

/// How long each process keeps pumping after issuing its operations.
const DRAIN_WINDOW: Duration = Duration::from_millis(300);

fn group_config() -> GroupConfig {
    let mut table = SubscriptionTable::new();
    table.declare("A", SubscriberSet::of(&[0, 2]));
    table.declare("B", SubscriberSet::of(&[0, 1, 2]));
    table.declare("C", SubscriberSet::of(&[0, 3]));
    GroupConfig::new(SEQUENCER, table)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut network = Network::new(GROUP_SIZE);
    let barrier = Arc::new(Barrier::new(GROUP_SIZE as usize));

    let mut handles = Vec::new();
    for id in 0..GROUP_SIZE {
        let endpoint = network
            .create_endpoint(id)
            .expect("endpoints are created once per process");
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || run_process(id, endpoint, barrier)));
    }

    for handle in handles {
        handle.join().expect("process thread panicked");
    }
}

fn run_process(id: u32, endpoint: Endpoint, barrier: Arc<Barrier>) {
    let listener = move |seq: u64, var: &str, value: i32| {
        info!(process = id, seq, var, value, "applied change");
    };
    let mut node = DsmNode::new(group_config(), endpoint, Some(Box::new(listener)));

    barrier.wait();

    match id {
        0 => {
            node.write("A", 10).expect("process 0 subscribes to A");
            node.write("C", 1).expect("process 0 subscribes to C");
        }
        1 => {
            node.write("B", 20).expect("process 1 subscribes to B");
        }
        2 => {
            // Whether this first CAS wins depends on whether process 0's
            // write of A has been sequenced yet; both outcomes are valid.
            let won_a = node
                .compare_and_exchange("A", 10, 15)
                .expect("process 2 subscribes to A");
            info!(process = id, success = won_a, "CAS A: 10 -> 15");

            let won_b = node
                .compare_and_exchange("B", 25, 30)
                .expect("process 2 subscribes to B");
            info!(process = id, success = won_b, "CAS B: 25 -> 30");
        }
        _ => {}
    }

    node.drain_best_effort(DRAIN_WINDOW);
    info!(
        process = id,
        a = node.get_local_value("A"),
        b = node.get_local_value("B"),
        c = node.get_local_value("C"),
        "local view"
    );

    barrier.wait();

    if node.is_sequencer() {
        node.broadcast_stop();
    } else {
        node.await_stop();
    }
}
