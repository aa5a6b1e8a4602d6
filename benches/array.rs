#[macro_use]
extern crate bencher;

use bencher::Bencher;
use ndarray::{Array, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use ndfield::backend::cpu;
use ndfield::builtins::neighbor_sum;
use ndfield::{concat_where, Dimension, Domain, Field, FieldOffset, NeighborTable, OffsetProvider};

const N: usize = 4096;

fn random_field(dim: &Dimension, start: isize, len: usize) -> Field {
    let data = Array::random(len, Uniform::new(0.0f64, 1.0)).into_dyn();
    Field::from_array(&cpu(), data, Domain::from(dim.range(start..start + len as isize)), None).unwrap()
}

fn ring(len: usize) -> Array2<i64> {
    Array2::from_shape_fn((len, 2), |(r, c)| ((r + c) % len) as i64)
}

fn bench_add(bench: &mut Bencher) {
    let i = Dimension::horizontal("I");
    let a = random_field(&i, 0, N);
    let b = random_field(&i, 7, N);
    bench.iter(|| (&a + &b).unwrap())
}

fn bench_remap(bench: &mut Bencher) {
    let (v, e, e2v) = (Dimension::horizontal("V"), Dimension::horizontal("E"), Dimension::local("E2V"));
    let provider = OffsetProvider::new().with("E2V", NeighborTable::new(ring(N), e.clone(), e2v.clone()));
    let offset = FieldOffset::new("E2V", v.clone(), vec![e, e2v]);
    let f = random_field(&v, 0, N);
    bench.iter(|| f.remap_offset(&offset, &provider).unwrap())
}

fn bench_neighbor_sum(bench: &mut Bencher) {
    let (v, e, e2v) = (Dimension::horizontal("V"), Dimension::horizontal("E"), Dimension::local("E2V"));
    let provider = OffsetProvider::new().with("E2V", NeighborTable::new(ring(N), e.clone(), e2v.clone()));
    let f = random_field(&v, 0, N)
        .remap_offset(&FieldOffset::new("E2V", v.clone(), vec![e, e2v.clone()]), &provider)
        .unwrap();
    bench.iter(|| neighbor_sum(&f, &e2v, &provider).unwrap())
}

fn bench_concat_where(bench: &mut Bencher) {
    let i = Dimension::horizontal("I");
    let mask_data = Array::from_shape_fn(N, |x| (x / 512) % 2 == 0).into_dyn();
    let mask = Field::from_array(&cpu(), mask_data, Domain::from(i.range(0..N as isize)), None).unwrap();
    let t = random_field(&i, 0, N);
    bench.iter(|| concat_where(&mask, &t, 0.0).unwrap())
}

benchmark_group!(benches, bench_add, bench_remap, bench_neighbor_sum, bench_concat_where);
benchmark_main!(benches);
