use std::collections::BTreeSet;
use std::time::Instant;

use monotone_mphf::{MmphfBuilder, MphfError, PrefixFreeStr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() -> Result<(), MphfError> {
    println!("--- monotone_mphf test ---");
    println!("n = {N_KEYS}");

    // 1) Generate sorted unique keys
    let t0 = Instant::now();
    let keys = gen_sorted_keys(N_KEYS, GEN_SEED);
    let gen_s = t0.elapsed().as_secs_f64();
    println!(
        "gen:    {:>8.3} s   ({:.1} M keys/s)",
        gen_s,
        N_KEYS as f64 / gen_s / 1e6
    );

    // 2) Build the monotone MMPHF
    let t1 = Instant::now();
    let mmphf = MmphfBuilder::new(PrefixFreeStr)
        .num_keys(N_KEYS as i64)
        .signature_width(32)
        .build(keys.iter().map(|k| k.as_str()))?;
    let build_s = t1.elapsed().as_secs_f64();
    println!(
        "build:  {:>8.3} s   ({:.1} M keys/s, {:.2} bits/key)",
        build_s,
        N_KEYS as f64 / build_s / 1e6,
        mmphf.num_bits() as f64 / N_KEYS as f64
    );

    // 3) Query every key and verify the rank identity
    let t2 = Instant::now();
    let mut acc: i64 = 0;
    for (i, k) in keys.iter().enumerate() {
        let r = mmphf.rank(k.as_str());
        assert_eq!(r, i as i64, "rank mismatch for key {i}");
        acc = acc.wrapping_add(r);
    }
    let query_s = t2.elapsed().as_secs_f64();
    println!(
        "query:  {:>8.3} s   ({:.1} M keys/s, checksum {acc})",
        query_s,
        N_KEYS as f64 / query_s / 1e6
    );

    // 4) Probe non-members against the signature
    let mut rng = StdRng::seed_from_u64(GEN_SEED ^ 0xdead);
    let mut hits = 0usize;
    for _ in 0..100_000 {
        let probe = random_key(&mut rng);
        if keys.binary_search(&probe).is_err() && mmphf.rank(probe.as_str()) != -1 {
            hits += 1;
        }
    }
    println!("false positives: {hits} / 100000");

    Ok(())
}

fn gen_sorted_keys(n: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = BTreeSet::new();
    while set.len() < n {
        set.insert(random_key(&mut rng));
    }
    set.into_iter().collect()
}

fn random_key(rng: &mut StdRng) -> String {
    let len = rng.gen_range(4..24);
    (0..len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}
