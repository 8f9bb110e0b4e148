use rpenc_crypto::{encrypt_cfb8, ContentHashDeriver, FileKey, FileKeyDeriver};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_cfb8(bencher: divan::Bencher, size: usize) {
    let key = FileKey::from_bytes(*b"0123456789abcdef0123456789abcdef");
    let iv = key.iv();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt_cfb8(
                divan::black_box(key.as_bytes()),
                divan::black_box(&iv),
                divan::black_box(&data),
            )
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_derive_file_key(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            ContentHashDeriver.derive_key(
                divan::black_box("textures/blocks/stone.png"),
                divan::black_box(&data),
            )
        });
}

fn main() {
    divan::main();
}
