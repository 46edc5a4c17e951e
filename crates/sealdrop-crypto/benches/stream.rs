use std::io::Cursor;

use sealdrop_crypto::{decrypt_stream, encrypt_stream, FileKey, KEY_SIZE};

const CHUNK_SIZE: usize = 64 * 1024;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 8388608])]
fn bench_encrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = FileKey::from_bytes([0x11u8; KEY_SIZE]);
    let file_id = [0xABu8; 32];
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out: Vec<u8> = Vec::with_capacity(size + size / 1024 + 64);
            encrypt_stream(
                divan::black_box(&key),
                divan::black_box(&file_id),
                CHUNK_SIZE,
                &mut Cursor::new(divan::black_box(&data)),
                &mut out,
            )
            .unwrap();
            out
        });
}

#[divan::bench(args = [1024, 65536, 1048576, 8388608])]
fn bench_decrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = FileKey::from_bytes([0x11u8; KEY_SIZE]);
    let file_id = [0xABu8; 32];
    let data = make_data(size);
    let mut sealed: Vec<u8> = Vec::new();
    encrypt_stream(&key, &file_id, CHUNK_SIZE, &mut Cursor::new(&data), &mut sealed).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out: Vec<u8> = Vec::with_capacity(size);
            decrypt_stream(
                divan::black_box(&key),
                divan::black_box(&file_id),
                CHUNK_SIZE,
                &mut Cursor::new(divan::black_box(&sealed)),
                &mut out,
            )
            .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
