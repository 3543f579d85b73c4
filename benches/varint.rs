use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use schemabuf::WireBuffer;

/// Benchmark encoding and decoding 100 varints per case: small (1 byte),
/// medium (5 bytes), large (10 bytes), and mixed widths.
fn varint(c: &mut Criterion) {
    let cases: Vec<(&str, Vec<u64>)> = vec![
        ("small", (0u64..100).collect()),
        ("medium", (1u64 << 28..(1u64 << 28) + 100).collect()),
        ("large", (1u64 << 63..(1u64 << 63) + 100).collect()),
        (
            "mixed",
            (0u64..10)
                .flat_map(|width| {
                    let exponent = width * 7;
                    (0u64..10).map(move |offset| offset + (1u64 << exponent))
                })
                .collect(),
        ),
    ];

    let mut group = c.benchmark_group("varint");
    for (name, values) in &cases {
        group.throughput(Throughput::Bytes(values.len() as u64 * 8));

        group.bench_function(format!("encode/{}", name), |b| {
            let mut buf = WireBuffer::with_capacity(10 * values.len());
            b.iter(|| {
                buf.seek(0).unwrap();
                for &value in values {
                    buf.put_varint(value).unwrap();
                }
                black_box(buf.written_bytes().len());
            });
        });

        let mut encoded = WireBuffer::with_capacity(10 * values.len());
        for &value in values {
            encoded.put_varint(value).unwrap();
        }
        group.bench_function(format!("decode/{}", name), |b| {
            b.iter(|| {
                let mut buf = WireBuffer::from_slice(encoded.written_bytes());
                for _ in values {
                    black_box(buf.get_varint().unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, varint);
criterion_main!(benches);
