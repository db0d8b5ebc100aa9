use clicktail::buffer::{Batch, BatchType};
use clicktail::domain::SampledEvent;
use clicktail::parser::{LineParser, ParserOptions, ParserRegistry};
use clicktail::sampler::{DynSamplerSettings, DynSamplerState, SamplingPolicy};
use clicktail::sender::BatchSerializer;
use clicktail::transform::{QueryMode, TransformSettings, Transformer};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

const NGINX_LINE: &str = r#"192.168.1.1 - frank [10/Oct/2023:13:55:36 -0700] "GET /api/users/42?page=2&sort=asc HTTP/1.1" 200 612 "-" "curl/7.68.0""#;
const JSON_LINE: &str = r#"{"time":"2023-10-10T13:55:36Z","status":200,"path":"/api/users/42","user":"alice","duration_ms":12.5}"#;
const KEYVAL_LINE: &str = r#"time=2023-10-10T13:55:36Z level=info status=200 path=/api/users/42 msg="request done" duration_ms=12.5"#;

fn parser(name: &str) -> Box<dyn LineParser> {
    ParserRegistry::with_builtin()
        .resolve(name, ParserOptions::default())
        .unwrap()
        .instantiate()
        .unwrap()
}

fn benchmark_parsers(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");

    for (name, line) in [("nginx", NGINX_LINE), ("json", JSON_LINE), ("keyval", KEYVAL_LINE)] {
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_function(name, |b| {
            let mut parser = parser(name);
            b.iter(|| parser.consume(black_box(line)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_transforms(c: &mut Criterion) {
    let mut parser = parser("nginx");
    let event = parser.consume(NGINX_LINE).unwrap().event.unwrap();

    let transformer = Transformer::new(&TransformSettings {
        add_fields: vec!["env=prod".into()],
        drop_fields: vec!["http_referer".into()],
        scrub_fields: vec!["remote_user".into()],
        request_shape: vec!["request".into()],
        request_patterns: vec!["/api/users/:id".into()],
        query_mode: QueryMode::All,
        ..Default::default()
    })
    .unwrap();

    c.bench_function("transform_event", |b| {
        b.iter(|| {
            let mut event = event.clone();
            transformer.apply(&mut event);
            event
        });
    });
}

fn benchmark_sampling(c: &mut Criterion) {
    let mut parser = parser("json");
    let event = parser.consume(JSON_LINE).unwrap().event.unwrap();

    let policy = SamplingPolicy::Dynamic {
        fields: vec!["status".into(), "path".into()],
        state: DynSamplerState::new(DynSamplerSettings::default()),
    };
    let mut sampler = policy.sampler(Some(7), 0);

    c.bench_function("dynamic_sample_decision", |b| {
        b.iter(|| sampler.decide_event(black_box(&event)));
    });
}

fn benchmark_serialization(c: &mut Criterion) {
    let mut parser = parser("nginx");
    let event = parser.consume(NGINX_LINE).unwrap().event.unwrap();
    let events: Vec<SampledEvent> = (0..1000).map(|_| SampledEvent::new(event.clone(), 1)).collect();
    let batch = Batch::new(events, BatchType::SizeBased);
    let serializer = BatchSerializer::new();

    let mut group = c.benchmark_group("serialize_batch");
    group.throughput(Throughput::Elements(batch.size() as u64));
    group.bench_function("ndjson", |b| {
        b.iter(|| serializer.serialize_ndjson(black_box(&batch)).unwrap());
    });
    group.bench_function("gzip", |b| {
        b.iter(|| serializer.serialize_compressed(black_box(&batch)).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_parsers,
    benchmark_transforms,
    benchmark_sampling,
    benchmark_serialization
);
criterion_main!(benches);
