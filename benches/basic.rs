use adkg::crypto::erasure;
use adkg::crypto::poly::split;
use adkg::crypto::Generators;
use adkg::traits::Curve;
use adkg::traits::ScalarField;
use adkg::Bls12381;
use adkg::Bn254;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

const N: usize = 16;
const K: usize = 6;

fn feldman<C: Curve>() -> bool {
    let g = Generators::<C>::new().g;
    let (commits, shares) = split::<C>(C::Scalar::random(), K, N, &g).unwrap();

    shares.iter().all(|share| commits.verify_share(&g, share))
}

fn erasure_roundtrip(payload: &[u8]) -> Vec<u8> {
    let shards = erasure::encode(payload, K, N).unwrap();

    erasure::decode(&shards[N - K..], K, N).unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("feldman split+verify bls12381", |b| {
        b.iter(|| black_box(feldman::<Bls12381>()))
    });
    c.bench_function("feldman split+verify bn254", |b| {
        b.iter(|| black_box(feldman::<Bn254>()))
    });

    let payload = vec![7u8; 4096];
    c.bench_function("erasure encode+decode 4KiB", |b| {
        b.iter(|| black_box(erasure_roundtrip(&payload)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
