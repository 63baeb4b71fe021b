//! Framing and payload benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tinyrpc_protocol::{
    FrameCodec, FrameDecoder, Message, MessageCodec, MessageKind, Request, Response,
    SerializerKind,
};

fn create_test_request(payload_size: usize) -> Request {
    Request::new(7, "hello").with_argument(serde_json::json!({
        "text": "x".repeat(payload_size),
        "tags": ["a", "b", "c"],
    }))
}

fn create_test_response(payload_size: usize) -> Response {
    Response::ok(
        7,
        serde_json::json!({
            "text": "x".repeat(payload_size),
            "count": 12345678,
        }),
    )
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    let codec = FrameCodec::default();

    for size in [100, 1000, 10000] {
        let payload = vec![b'x'; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(codec.encode(payload).unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_feed");
    let codec = FrameCodec::default();

    for size in [100, 1000, 10000] {
        let encoded = codec.encode(&vec![b'x'; size]).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = BytesMut::new();
                black_box(codec.feed(&mut buf, encoded).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_sticky_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_feed_sticky");
    let codec = FrameCodec::default();

    // Many small frames coalesced into one read
    for frames in [10, 100, 1000] {
        let mut stream = BytesMut::new();
        for i in 0..frames {
            stream.extend_from_slice(&codec.encode(format!("frame-{}", i).as_bytes()).unwrap());
        }

        group.throughput(Throughput::Elements(frames as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &stream, |b, stream| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(codec);
                black_box(decoder.feed(stream).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_split_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_feed_split");
    let codec = FrameCodec::default();
    let encoded = codec.encode(&vec![b'x'; 16 * 1024]).unwrap();

    // One frame arriving in chunks of various sizes
    for chunk in [64, 512, 4096] {
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(codec);
                let mut frames = Vec::new();
                for piece in encoded.chunks(chunk) {
                    frames.extend(decoder.feed(piece).unwrap());
                }
                black_box(frames)
            });
        });
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for kind in [SerializerKind::Json, SerializerKind::MsgPack] {
        let codec = MessageCodec::new(FrameCodec::default(), kind.build());
        let message = Message::Request(create_test_request(1000));

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(kind), &message, |b, message| {
            b.iter(|| black_box(codec.encode(message).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for kind in [SerializerKind::Json, SerializerKind::MsgPack] {
        let codec = MessageCodec::new(FrameCodec::default(), kind.build());
        let encoded = codec
            .encode(&Message::Response(create_test_response(1000)))
            .unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(kind), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = codec.decoder(MessageKind::Response);
                black_box(decoder.feed(encoded).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_feed,
    bench_sticky_feed,
    bench_split_feed,
    bench_request_encode,
    bench_response_decode,
);

criterion_main!(benches);
