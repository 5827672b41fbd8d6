use super::backends::Backend;
use super::*;
use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

/// ChaCha20 block 0 for the all-zero key and iv (RFC 8439 A.1 #1)
const BLOCK_ZERO: &str = "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7\
                          da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586";

/// ChaCha20 block 1 for the same key and iv (RFC 8439 A.1 #2; counter = 1
/// is the identical cipher state under the 64/64 counter/nonce layout)
const BLOCK_ONE: &str = "9f07e7be5551387a98ba977c732d080dcb0f29a048e3656912c6533e32ee7aed\
                         29b721769ce64e43d57133b074d839d531ed1f28510afb45ace10a1f4b794d6f";

fn test_key() -> [u8; CHACHA_KEY_SIZE] {
    let mut key = [0u8; CHACHA_KEY_SIZE];
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    rng.fill(&mut key);
    key
}

#[test]
fn test_chacha20_block_vectors() {
    let key = [0u8; CHACHA_KEY_SIZE];
    let iv = [0u8; CHACHA_IV_SIZE];
    let expected = hex::decode(format!("{}{}", BLOCK_ZERO, BLOCK_ONE)).unwrap();

    // Whichever backend the host binds must reproduce the reference
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    let mut out = [0u8; 128];
    stream.generate(&mut out).unwrap();
    assert_eq!(out.to_vec(), expected);

    // And the scalar path explicitly
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.rebind(Backend::Soft);
    let mut out = [0u8; 128];
    stream.generate(&mut out).unwrap();
    assert_eq!(out.to_vec(), expected);
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[test]
fn test_backend_equivalence() {
    use super::backends::{avx2_available, ssse3_available};

    let mut wide = Vec::new();
    if ssse3_available() {
        wide.push(Backend::Ssse3);
    }
    if avx2_available() {
        wide.push(Backend::Avx2);
    }

    let key = test_key();
    // Base counters: zero, and one that makes the first batch straddle the
    // 2^32 carry boundary of the low counter word
    let ivs: [[u8; CHACHA_IV_SIZE]; 2] = [
        [0u8; CHACHA_IV_SIZE],
        [
            0xfe, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x0b, 0xad, 0xca, 0xfe, 0x00, 0x01,
            0x02, 0x03,
        ],
    ];

    for backend in wide {
        for iv in &ivs {
            for rounds in [Rounds::R8, Rounds::R12, Rounds::R20] {
                let mut reference = ChaChaStream::new(&key, iv, rounds);
                reference.rebind(Backend::Soft);
                let mut candidate = ChaChaStream::new(&key, iv, rounds);
                candidate.rebind(backend);

                let mut expected = vec![0u8; 1024];
                let mut actual = vec![0u8; 1024];
                reference.generate(&mut expected).unwrap();
                candidate.generate(&mut actual).unwrap();

                assert_eq!(expected, actual, "{:?} diverged from scalar", backend);
                assert_eq!(reference.block_position(), candidate.block_position());
            }
        }
    }
}

#[test]
fn test_chunking_invariant() {
    let key = test_key();
    let iv = [0x24u8; CHACHA_IV_SIZE];

    let mut one_shot = vec![0u8; 4096];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.generate(&mut one_shot).unwrap();

    // Fixed awkward partition, including an empty request
    let partition = [1usize, 63, 0, 64, 409, 511, 512, 1000, 1536];
    assert_eq!(partition.iter().sum::<usize>(), 4096);
    let mut chunked = vec![0u8; 4096];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    let mut pos = 0;
    for len in partition {
        stream.generate(&mut chunked[pos..pos + len]).unwrap();
        pos += len;
    }
    assert_eq!(one_shot, chunked);

    // Randomized partitions
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..8 {
        let mut chunked = vec![0u8; 4096];
        let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
        let mut pos = 0;
        while pos < chunked.len() {
            let len = rng.gen_range(1..=300).min(chunked.len() - pos);
            stream.generate(&mut chunked[pos..pos + len]).unwrap();
            pos += len;
        }
        assert_eq!(one_shot, chunked);
    }

    // One byte at a time
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    for (i, expected) in one_shot.iter().take(300).enumerate() {
        let mut byte = [0u8; 1];
        stream.generate(&mut byte).unwrap();
        assert_eq!(byte[0], *expected, "byte {} differs", i);
    }
}

#[test]
fn test_seek_round_trip() {
    let key = test_key();
    let iv = [0u8; CHACHA_IV_SIZE];

    let mut seeked = ChaChaStream::new(&key, &iv, Rounds::R20);
    let mut control = ChaChaStream::new(&key, &iv, Rounds::R20);

    // 512 bytes is a whole number of batches for every backend, leaving the
    // lookahead buffer empty
    let mut scratch = vec![0u8; 512];
    seeked.generate(&mut scratch).unwrap();
    control.generate(&mut scratch).unwrap();

    let before = seeked.block_position();
    seeked.seek_blocks(7);
    assert_eq!(seeked.block_position(), before + 7);
    seeked.seek_blocks(-7);
    assert_eq!(seeked.block_position(), before);

    let mut a = vec![0u8; 256];
    let mut b = vec![0u8; 256];
    seeked.generate(&mut a).unwrap();
    control.generate(&mut b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_seek_matches_one_shot() {
    let key = test_key();
    let iv = [0u8; CHACHA_IV_SIZE];

    let mut one_shot = vec![0u8; 4096];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.generate(&mut one_shot).unwrap();

    // Jump straight to block 8
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.seek_to_block(8);
    let mut block = [0u8; CHACHA_BLOCK_SIZE];
    stream.generate(&mut block).unwrap();
    assert_eq!(&block[..], &one_shot[512..576]);

    // Two workers interleaving four-block chunks reassemble the stream
    let chunk_blocks = 4u64;
    let chunk_bytes = (chunk_blocks as usize) * CHACHA_BLOCK_SIZE;
    let workers = 2u64;
    let mut reassembled = vec![0u8; 4096];
    for k in 0..workers {
        let mut worker = ChaChaStream::new(&key, &iv, Rounds::R20);
        let mut claimed = k * chunk_blocks;
        while (claimed as usize) * CHACHA_BLOCK_SIZE < reassembled.len() {
            worker.seek_to_block(claimed);
            let at = (claimed as usize) * CHACHA_BLOCK_SIZE;
            worker
                .generate(&mut reassembled[at..at + chunk_bytes])
                .unwrap();
            claimed += workers * chunk_blocks;
        }
    }
    assert_eq!(one_shot, reassembled);
}

#[test]
fn test_counter_carry() {
    let key = test_key();
    let mut iv = [0u8; CHACHA_IV_SIZE];
    iv[..4].copy_from_slice(&[0xff; 4]);

    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.rebind(Backend::Soft);
    assert_eq!(stream.block_position(), 0xffff_ffff);

    let mut block = [0u8; CHACHA_BLOCK_SIZE];
    stream.generate(&mut block).unwrap();

    // Low word wrapped to zero with the carry landing in the high word
    assert_eq!(stream.state[12], 0);
    assert_eq!(stream.state[13], 1);
    assert_eq!(stream.block_position(), 0x1_0000_0000);
}

#[test]
fn test_buffered_delivery_state_machine() {
    let key = test_key();
    let iv = [0u8; CHACHA_IV_SIZE];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.rebind(Backend::Soft);

    // Sub-block request fills the lookahead and leaves a partial region
    let mut out = [0u8; 10];
    stream.generate(&mut out).unwrap();
    assert_eq!((stream.offset, stream.end), (10, 64));

    // Served entirely from the buffer
    let mut out = [0u8; 20];
    stream.generate(&mut out).unwrap();
    assert_eq!((stream.offset, stream.end), (30, 64));

    // Drains the 34 leftover bytes, then refills for the remaining 6
    let mut out = [0u8; 40];
    stream.generate(&mut out).unwrap();
    assert_eq!((stream.offset, stream.end), (6, 64));

    // Exact drain flips the buffer back to empty
    let mut out = [0u8; 58];
    stream.generate(&mut out).unwrap();
    assert_eq!((stream.offset, stream.end), (0, 0));
}

#[test]
fn test_wipe_zeroizes_context() {
    let key = test_key();
    let iv = [0x24u8; CHACHA_IV_SIZE];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);

    let mut out = [0u8; 100];
    stream.generate(&mut out).unwrap();
    stream.wipe();

    assert_eq!(stream.state, [0u32; 16]);
    assert!(stream.buffer.iter().all(|&b| b == 0));
    assert_eq!((stream.offset, stream.end), (0, 0));

    // A wiped context refuses further use
    let err = stream.generate(&mut out).unwrap_err();
    assert!(matches!(err, Error::Processing { .. }));
}

#[test]
fn test_invalid_parameters_rejected() {
    for bad in [0u32, 2, 10, 16, 21, 40] {
        assert!(matches!(
            Rounds::from_count(bad),
            Err(Error::Parameter { name: "rounds", .. })
        ));
    }
    for good in [8u32, 12, 20] {
        assert!(Rounds::from_count(good).is_ok());
    }

    let key = [0u8; CHACHA_KEY_SIZE];
    let iv = [0u8; CHACHA_IV_SIZE];
    assert!(matches!(
        ChaChaStream::from_slices(&key[..31], &iv, 20),
        Err(Error::Length { .. })
    ));
    assert!(matches!(
        ChaChaStream::from_slices(&key, &iv[..8], 20),
        Err(Error::Length { .. })
    ));
    assert!(ChaChaStream::from_slices(&key, &iv, 20).is_ok());
}

#[test]
fn test_from_slices_matches_new() {
    let key = test_key();
    let iv = [0x24u8; CHACHA_IV_SIZE];

    let mut a = ChaChaStream::new(&key, &iv, Rounds::R12);
    let mut b = ChaChaStream::from_slices(&key, &iv, 12).unwrap();

    let mut out_a = vec![0u8; 777];
    let mut out_b = vec![0u8; 777];
    a.generate(&mut out_a).unwrap();
    b.generate(&mut out_b).unwrap();
    assert_eq!(out_a, out_b);
}

#[test]
fn test_generate_once_matches_stream() {
    let key = test_key();
    let iv = [0x42u8; CHACHA_IV_SIZE];

    let mut expected = vec![0u8; 1000];
    let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
    stream.generate(&mut expected).unwrap();

    let mut actual = vec![0u8; 1000];
    generate_once(&mut actual, &key, &iv, Rounds::R20).unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn test_rounds_produce_distinct_streams() {
    let key = test_key();
    let iv = [0u8; CHACHA_IV_SIZE];

    let mut outs = Vec::new();
    for rounds in [Rounds::R8, Rounds::R12, Rounds::R20] {
        assert_eq!(rounds.count() as usize, 2 * rounds.double_rounds());
        let mut out = [0u8; CHACHA_BLOCK_SIZE];
        generate_once(&mut out, &key, &iv, rounds).unwrap();
        outs.push(out);
    }
    assert_ne!(outs[0], outs[1]);
    assert_ne!(outs[0], outs[2]);
    assert_ne!(outs[1], outs[2]);
}

#[test]
fn test_no_cross_contamination() {
    // Statistical sanity check: distinct keys never collide on any block
    let mut key_a = [0u8; CHACHA_KEY_SIZE];
    let mut key_b = [0u8; CHACHA_KEY_SIZE];
    OsRng.fill_bytes(&mut key_a);
    OsRng.fill_bytes(&mut key_b);
    assert_ne!(key_a, key_b);
    let iv = [0u8; CHACHA_IV_SIZE];

    let blocks = 1024;
    let mut stream_a = vec![0u8; blocks * CHACHA_BLOCK_SIZE];
    let mut stream_b = vec![0u8; blocks * CHACHA_BLOCK_SIZE];
    generate_once(&mut stream_a, &key_a, &iv, Rounds::R20).unwrap();
    generate_once(&mut stream_b, &key_b, &iv, Rounds::R20).unwrap();

    let seen: HashSet<&[u8]> = stream_a.chunks_exact(CHACHA_BLOCK_SIZE).collect();
    for block in stream_b.chunks_exact(CHACHA_BLOCK_SIZE) {
        assert!(!seen.contains(block));
    }
}

#[test]
fn test_clone_is_independent() {
    let key = test_key();
    let iv = [0u8; CHACHA_IV_SIZE];

    let mut original = ChaChaStream::new(&key, &iv, Rounds::R20);
    let mut scratch = [0u8; 100];
    original.generate(&mut scratch).unwrap();

    let mut fork = original.clone();
    let mut a = vec![0u8; 500];
    let mut b = vec![0u8; 500];
    original.generate(&mut a).unwrap();
    fork.generate(&mut b).unwrap();
    assert_eq!(a, b);

    // Diverge: the fork does not follow the original
    original.generate(&mut a).unwrap();
    fork.seek_blocks(1);
    fork.generate(&mut b).unwrap();
    assert_ne!(a, b);
}
