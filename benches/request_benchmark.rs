use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tunnelweb::request::Request;

fn simple_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /static/css/site.css HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("simple_request_parse", |b| {
        b.iter(|| {
            let _ = Request::try_from(black_box(request), 0).unwrap();
        });
    });
}

fn tunnel_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /static/widget/specs/default.json?lang=en-US&device=phone HTTP/1.1\r\n\
                    Host: localhost:7878\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: application/json\r\n\
                    x-mojito-header: tunnel\r\n\
                    If-None-Match: 182-1700000000000\r\n\
                    \r\n";

    c.bench_function("tunnel_request_parse", |b| {
        b.iter(|| {
            let _ = Request::try_from(black_box(request), 0).unwrap();
        });
    });
}

fn rpc_request_parse_benchmark(c: &mut Criterion) {
    let body = r#"{"action":"index","instance":{"base":"widget"},"context":{"runtime":"client"}}"#;
    let request = format!(
        "POST /tunnel HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\nx-mojito-header: tunnel\r\n\r\n{}",
        body.len(),
        body
    );

    c.bench_function("rpc_request_parse", |b| {
        b.iter(|| {
            let _ = Request::try_from(black_box(request.as_bytes()), 0).unwrap();
        });
    });
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    tunnel_request_parse_benchmark,
    rpc_request_parse_benchmark
);
criterion_main!(benches);
