use rand::SeedableRng;
use rand::rngs::StdRng;

/// Derives an independent stream seed from a master seed and a stream index
/// with the SplitMix64 finalizer, so neighbouring indices give unrelated
/// generator states.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Generator for a nested stream, e.g. (imputation, chain).
pub fn stream_rng(seed: u64, path: &[u64]) -> StdRng {
    let derived = path.iter().fold(seed, |acc, &index| stream_seed(acc, index));
    StdRng::seed_from_u64(derived)
}
