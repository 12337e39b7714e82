//! Request Assembler Benchmarks
//!
//! Measures the hot path of the server: turning inbound bytes into
//! parsed requests.
//!
//! This benchmark suite covers:
//! - Header-only requests (small and header-heavy)
//! - Content-Length bodies (4 KiB, 64 KiB)
//! - Chunked bodies, single-shot and fragmented delivery
//!
//! Run with: cargo bench --bench assembler_performance

use breakwater::http::assembler::{Assembled, RequestAssembler};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const MAX_HEADER: usize = 16 * 1024;
const MAX_BODY: usize = 5 * 1024 * 1024;

fn assemble(wire: &[u8]) {
    let mut asm = RequestAssembler::new(MAX_HEADER, MAX_BODY, false);
    match asm.feed(black_box(wire)) {
        Assembled::Complete(request) => {
            black_box(request);
        }
        other => panic!("benchmark input did not assemble: {:?}", other),
    }
}

fn browser_style_head() -> Vec<u8> {
    b"GET /index.html HTTP/1.1\r\n\
      Host: bench.example\r\n\
      User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0\r\n\
      Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8\r\n\
      Accept-Language: en-US,en;q=0.5\r\n\
      Accept-Encoding: gzip, deflate\r\n\
      Connection: close\r\n\
      Cookie: session=0123456789abcdef; theme=dark\r\n\
      Cache-Control: max-age=0\r\n\r\n"
        .to_vec()
}

fn fixed_body_request(size: usize) -> Vec<u8> {
    let mut wire = format!(
        "POST /upload HTTP/1.1\r\nHost: bench.example\r\nContent-Length: {}\r\n\r\n",
        size
    )
    .into_bytes();
    wire.extend(std::iter::repeat(b'x').take(size));
    wire
}

fn chunked_request(chunk_size: usize, chunks: usize) -> Vec<u8> {
    let mut wire =
        b"POST /upload HTTP/1.1\r\nHost: bench.example\r\nTransfer-Encoding: chunked\r\n\r\n"
            .to_vec();
    let chunk = vec![b'x'; chunk_size];
    for _ in 0..chunks {
        wire.extend(format!("{:x}\r\n", chunk_size).into_bytes());
        wire.extend_from_slice(&chunk);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");
    wire
}

fn bench_headers(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_headers");

    let minimal = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
    group.throughput(Throughput::Bytes(minimal.len() as u64));
    group.bench_function("minimal_get", |b| b.iter(|| assemble(&minimal)));

    let browser = browser_style_head();
    group.throughput(Throughput::Bytes(browser.len() as u64));
    group.bench_function("browser_get", |b| b.iter(|| assemble(&browser)));

    group.finish();
}

fn bench_fixed_bodies(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_fixed_body");

    for size in [4 * 1024, 64 * 1024] {
        let wire = fixed_body_request(size);
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(format!("content_length_{}k", size / 1024), |b| {
            b.iter(|| assemble(&wire))
        });
    }

    group.finish();
}

fn bench_chunked_bodies(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_chunked_body");

    let wire = chunked_request(1024, 16);
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("16_chunks_of_1k", |b| b.iter(|| assemble(&wire)));

    // Same request delivered in awkward segment sizes, the way a slow
    // peer would trickle it in.
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("16_chunks_of_1k_fragmented", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new(MAX_HEADER, MAX_BODY, false);
            let mut done = false;
            for segment in wire.chunks(293) {
                match asm.feed(black_box(segment)) {
                    Assembled::NeedMore => {}
                    Assembled::Complete(request) => {
                        black_box(request);
                        done = true;
                    }
                    Assembled::Fatal(code) => panic!("unexpected fatal {:?}", code),
                }
            }
            assert!(done);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_headers,
    bench_fixed_bodies,
    bench_chunked_bodies
);
criterion_main!(benches);
