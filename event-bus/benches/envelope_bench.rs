use criterion::{black_box, criterion_group, criterion_main, Criterion};
use event_bus::{EventPayload, IntegrationEvent, SerializerOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct OrderCreated {
    order_id: u64,
    customer_name: String,
    line_items: Vec<u64>,
}
impl EventPayload for OrderCreated {}

fn sample_event() -> IntegrationEvent<OrderCreated> {
    IntegrationEvent::new(OrderCreated {
        order_id: 42,
        customer_name: "Ada Lovelace".to_string(),
        line_items: vec![1, 2, 3, 4, 5],
    })
}

fn bench_serialize(c: &mut Criterion) {
    let event = sample_event();
    let options = SerializerOptions::default();

    c.bench_function("serialize_event", |b| {
        b.iter(|| event_bus::serialization::serialize(black_box(&event), black_box(&options)))
    });
}

fn bench_deserialize(c: &mut Criterion) {
    let event = sample_event();
    let options = SerializerOptions::default();
    let bytes = event_bus::serialization::serialize(&event, &options).unwrap();

    c.bench_function("deserialize_event", |b| {
        b.iter(|| {
            event_bus::serialization::deserialize::<IntegrationEvent<OrderCreated>>(black_box(
                &bytes,
            ))
        })
    });
}

criterion_group!(benches, bench_serialize, bench_deserialize);
criterion_main!(benches);
