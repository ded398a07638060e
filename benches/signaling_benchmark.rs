use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use rendezvous::signaling::{ClientMessage, ServerMessage, Signal};
use serde_json::json;

const OFFER: &str = r#"{"type":"offer","roomId":"482913","from":"provider","offer":{"type":"offer","sdp":"v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n"}}"#;

const CANDIDATE: &str = r#"{"type":"ice-candidate","roomId":"482913","from":"inspector","candidate":{"candidate":"candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx raddr 0.0.0.0 rport 0","sdpMid":"0","sdpMLineIndex":0}}"#;

/// inbound parsing benchmark
fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parsing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("offer", |b| {
        b.iter(|| black_box(ClientMessage::parse(black_box(OFFER)).unwrap()))
    });

    group.bench_function("ice_candidate", |b| {
        b.iter(|| black_box(ClientMessage::parse(black_box(CANDIDATE)).unwrap()))
    });

    group.bench_function("invalid_json", |b| {
        b.iter(|| black_box(ClientMessage::parse(black_box("{\"type\": ")).is_err()))
    });

    group.finish();
}

/// sanitized outbound encoding benchmark
fn bench_encoding(c: &mut Criterion) {
    let signal = Signal::Offer {
        offer: Some(json!({"type": "offer", "sdp": "v=0\r\ns=-\r\nt=0 0\r\n"})),
    };

    let mut group = c.benchmark_group("Encoding");
    group.throughput(Throughput::Elements(1));

    group.bench_function("signal", |b| {
        b.iter(|| black_box(black_box(&signal).to_outbound()))
    });

    group.bench_function("inspector_joined", |b| {
        b.iter(|| black_box(ServerMessage::InspectorJoined.to_outbound()))
    });

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_encoding);
criterion_main!(benches);
