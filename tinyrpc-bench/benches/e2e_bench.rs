//! End-to-end client-server benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_client::{Client, ConnectionConfig, InvocationGateway};
use tinyrpc_protocol::SerializerKind;
use tinyrpc_server::{Router, Server, ServerConfig};
use tokio::runtime::Runtime;

fn start_server(rt: &Runtime, serializer: SerializerKind) -> SocketAddr {
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let router = Router::new()
        .route("echo", |argument: Value| Ok(argument))
        .route("hello", |argument: Value| {
            Ok(json!(format!("echo:{}", argument.as_str().unwrap_or_default())))
        });
    let server = Arc::new(Server::new(
        ServerConfig::new(addr).with_serializer(serializer),
        router,
    ));
    rt.spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

fn connect_client(rt: &Runtime, addr: SocketAddr, serializer: SerializerKind) -> Client {
    let client = Client::new(ConnectionConfig::new(addr).with_serializer(serializer));
    rt.block_on(client.connect()).unwrap();
    client
}

fn bench_call_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("e2e_call");
    group.throughput(Throughput::Elements(1));

    for kind in [SerializerKind::Json, SerializerKind::MsgPack] {
        let addr = start_server(&rt, kind);
        let client = connect_client(&rt, addr, kind);

        group.bench_function(BenchmarkId::new("hello", kind), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(client.call("hello", json!("hi")).await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_concurrent_calls(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let addr = start_server(&rt, SerializerKind::Json);
    let client = connect_client(&rt, addr, SerializerKind::Json);

    let mut group = c.benchmark_group("e2e_concurrent");
    group.sample_size(20);

    for concurrency in [1, 10, 50] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("calls", concurrency),
            &concurrency,
            |b, &conc| {
                b.to_async(&rt).iter(|| {
                    let client = &client;
                    async move {
                        let futures: Vec<_> = (0..conc)
                            .map(|i| client.call("echo", json!(i)))
                            .collect();
                        black_box(futures::future::join_all(futures).await)
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_gateway_invoke(c: &mut Criterion) {
    let server_rt = Runtime::new().unwrap();
    let addr = start_server(&server_rt, SerializerKind::Json);
    let gateway = InvocationGateway::connect(ConnectionConfig::new(addr)).unwrap();

    let mut group = c.benchmark_group("e2e_gateway");
    group.throughput(Throughput::Elements(1));

    group.bench_function("invoke", |b| {
        b.iter(|| {
            black_box(
                gateway
                    .invoke("hello", json!("hi"), Duration::from_secs(5))
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_call_latency,
    bench_concurrent_calls,
    bench_gateway_invoke,
);

criterion_main!(benches);
