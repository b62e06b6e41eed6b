//! End-to-end tests for the monotone MMPHF.

use std::collections::BTreeSet;

use monotone_mphf::{
    BitVector, MmphfBuilder, MphfError, PrefixFreeBytes, PrefixFreeStr, RawBitVectors,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_key(rng: &mut StdRng) -> String {
    let len = rng.gen_range(3..20);
    (0..len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

fn sorted_keys(n: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = BTreeSet::new();
    while set.len() < n {
        set.insert(random_key(&mut rng));
    }
    set.into_iter().collect()
}

#[test]
fn rank_identity_small() {
    let mmphf = MmphfBuilder::new(PrefixFreeStr)
        .build(["apple", "banana", "cherry", "date"])
        .unwrap();
    assert_eq!(mmphf.rank("apple"), 0);
    assert_eq!(mmphf.rank("banana"), 1);
    assert_eq!(mmphf.rank("cherry"), 2);
    assert_eq!(mmphf.rank("date"), 3);
    assert_eq!(mmphf.len(), 4);
}

#[test]
fn rank_identity_at_scale() {
    for n in [100usize, 1000, 10_000] {
        let keys = sorted_keys(n, 0xBEEF ^ n as u64);
        let mmphf = MmphfBuilder::new(PrefixFreeStr)
            .num_keys(n as i64)
            .build(keys.iter().map(String::as_str))
            .unwrap();
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(mmphf.rank(k.as_str()), i as i64, "n={n}, key {k}");
        }
        assert!(mmphf.num_bits() > 0);
    }
}

#[test]
fn signature_rejects_non_members() {
    let keys = sorted_keys(1000, 0xCAFE);
    let mmphf = MmphfBuilder::new(PrefixFreeStr)
        .signature_width(32)
        .build(keys.iter().map(String::as_str))
        .unwrap();

    for (i, k) in keys.iter().enumerate() {
        assert_eq!(mmphf.rank(k.as_str()), i as i64);
    }

    let mut rng = StdRng::seed_from_u64(0xF00D);
    let mut hits = 0;
    let mut probes = 0;
    while probes < 10_000 {
        let probe = random_key(&mut rng);
        if keys.binary_search(&probe).is_ok() {
            continue;
        }
        probes += 1;
        if mmphf.rank(probe.as_str()) != -1 {
            hits += 1;
        }
    }
    // Expected false-positive rate is 2^-32 per probe.
    assert!(hits <= 1, "{hits} false positives in {probes} probes");
}

#[test]
fn duplicate_keys_are_rejected() {
    let err = MmphfBuilder::new(PrefixFreeStr)
        .build(["same", "same"])
        .unwrap_err();
    assert!(matches!(err, MphfError::DuplicateKey), "{err}");
}

#[test]
fn out_of_order_keys_are_rejected() {
    // 0b01 then 0b00 as raw two-bit vectors.
    let keys = [bv(&[false, true]), bv(&[false, false])];
    let err = MmphfBuilder::new(RawBitVectors).build(&keys).unwrap_err();
    assert!(matches!(err, MphfError::NotSorted), "{err}");
}

#[test]
fn prefix_keys_are_rejected() {
    // The first vector is a proper prefix of the second.
    let keys = [bv(&[false]), bv(&[false, true])];
    let err = MmphfBuilder::new(RawBitVectors).build(&keys).unwrap_err();
    assert!(matches!(err, MphfError::NotPrefixFree), "{err}");
}

#[test]
fn builds_are_deterministic() {
    let keys = sorted_keys(2000, 0xA11CE);
    let build = || {
        MmphfBuilder::new(PrefixFreeStr)
            .signature_width(16)
            .build(keys.iter().map(String::as_str))
            .unwrap()
    };
    let a = build();
    let b = build();
    assert_eq!(a.num_bits(), b.num_bits());
    assert_eq!(a.seed(), b.seed());
    assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
}

#[test]
fn serialization_round_trips_query_equivalent() {
    let keys = sorted_keys(500, 0x5E1A);
    let mmphf = MmphfBuilder::new(PrefixFreeStr)
        .signature_width(24)
        .build(keys.iter().map(String::as_str))
        .unwrap();

    let bytes = mmphf.to_bytes().unwrap();
    let restored = monotone_mphf::MonotoneMphf::<PrefixFreeStr>::from_bytes(&bytes).unwrap();

    for (i, k) in keys.iter().enumerate() {
        assert_eq!(restored.rank(k.as_str()), i as i64);
    }
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..100 {
        let probe = random_key(&mut rng);
        assert_eq!(mmphf.rank(probe.as_str()), restored.rank(probe.as_str()));
    }
}

#[test]
fn num_bits_is_deterministic() {
    let keys = sorted_keys(800, 0xD00F);
    let a = MmphfBuilder::new(PrefixFreeStr)
        .build(keys.iter().map(String::as_str))
        .unwrap();
    let b = MmphfBuilder::new(PrefixFreeStr)
        .build(keys.iter().map(String::as_str))
        .unwrap();
    assert_eq!(a.num_bits(), b.num_bits());
}

#[test]
fn temp_dir_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let keys = sorted_keys(200, 7);
    let mmphf = MmphfBuilder::new(PrefixFreeStr)
        .temp_dir(dir.path())
        .build(keys.iter().map(String::as_str))
        .unwrap();
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(mmphf.rank(k.as_str()), i as i64);
    }
    // Spill files are unlinked at creation, so nothing may linger.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn byte_slice_keys_work() {
    let keys: Vec<Vec<u8>> = (0u16..300).map(|i| i.to_be_bytes().to_vec()).collect();
    let mmphf = MmphfBuilder::new(PrefixFreeBytes)
        .build(keys.iter().map(Vec::as_slice))
        .unwrap();
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(mmphf.rank(k.as_slice()), i as i64);
    }
}

fn bv(bits: &[bool]) -> BitVector {
    let mut out = BitVector::new();
    for &b in bits {
        out.push(b);
    }
    out
}
