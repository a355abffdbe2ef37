use criterion::{black_box, criterion_group, criterion_main, Criterion};
use execution_guard::{
    CircuitBreakerConfig, FingerprintGenerator, RateLimitingConfig,
};
use execution_guard::resilience::RateLimiter;

fn bench_fingerprint(c: &mut Criterion) {
    let gen = FingerprintGenerator::new();
    c.bench_function("fingerprint_url_method", |b| {
        b.iter(|| {
            gen.fingerprint(
                black_box("https://api.example.com/v1/chat/completions"),
                black_box("POST"),
            )
        })
    });
}

fn bench_admission_check(c: &mut Criterion) {
    let limiter = RateLimiter::new(
        RateLimitingConfig::default(),
        CircuitBreakerConfig::default(),
    );
    // pre-load a realistic window population across a few scopes
    for i in 0..50 {
        limiter.check(&format!("scope-{}", i % 5));
    }
    c.bench_function("admission_check_warm", |b| {
        b.iter(|| limiter.check(black_box("scope-bench")))
    });

    let saturated = RateLimiter::new(
        RateLimitingConfig::default(),
        CircuitBreakerConfig::default(),
    );
    for _ in 0..60 {
        saturated.check("scope-bench");
    }
    c.bench_function("admission_check_limited", |b| {
        b.iter(|| saturated.check(black_box("scope-bench")))
    });
}

criterion_group!(benches, bench_fingerprint, bench_admission_check);
criterion_main!(benches);
