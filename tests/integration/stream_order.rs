use lunasentri::events::{EventBus, ServerEvent};
use lunasentri::models::MetricsSample;

fn sample(machine_id: i64, cpu: f64, minute: u32) -> MetricsSample {
    MetricsSample {
        machine_id,
        timestamp: format!("2026-08-01T10:{minute:02}:00.000000Z"),
        cpu_pct: cpu,
        mem_used_pct: 40.0,
        disk_used_pct: 50.0,
        net_rx_bytes: 0,
        net_tx_bytes: 0,
        uptime_seconds: None,
    }
}

/// Samples published for one machine arrive at a subscriber in publish
/// (ingestion) order.
#[rocket::async_test]
async fn test_subscriber_sees_ingestion_order() {
    let bus = EventBus::new();
    let mut rx = bus.sender.subscribe();

    for (i, cpu) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        bus.publish(ServerEvent::SampleIngested {
            machine_id: 7,
            sample: sample(7, cpu, i as u32),
        });
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        match rx.recv().await.unwrap() {
            ServerEvent::SampleIngested { machine_id, sample } => {
                assert_eq!(machine_id, 7);
                seen.push(sample.cpu_pct);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(seen, vec![10.0, 20.0, 30.0]);
}

/// Publishing with no subscribers is a quiet no-op.
#[rocket::async_test]
async fn test_publish_without_subscribers() {
    let bus = EventBus::new();
    bus.publish(ServerEvent::SampleIngested {
        machine_id: 1,
        sample: sample(1, 5.0, 0),
    });
}

/// A subscriber only interleaves events from other machines; per-machine
/// relative order is preserved.
#[rocket::async_test]
async fn test_per_machine_order_with_interleaving() {
    let bus = EventBus::new();
    let mut rx = bus.sender.subscribe();

    bus.publish(ServerEvent::SampleIngested { machine_id: 1, sample: sample(1, 1.0, 0) });
    bus.publish(ServerEvent::SampleIngested { machine_id: 2, sample: sample(2, 9.0, 0) });
    bus.publish(ServerEvent::SampleIngested { machine_id: 1, sample: sample(1, 2.0, 1) });

    let mut machine_one = Vec::new();
    for _ in 0..3 {
        if let ServerEvent::SampleIngested { machine_id: 1, sample } = rx.recv().await.unwrap() {
            machine_one.push(sample.cpu_pct);
        }
    }
    assert_eq!(machine_one, vec![1.0, 2.0]);
}
