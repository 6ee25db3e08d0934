use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Produces a standard RNG for cryptographic use (fresh node keys, nonces, object ids in the
/// reference store). Kept as a single helper so the RNG choice can change in one place.
pub fn crypto_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_entropy()
}

/// Current time in milliseconds since the Unix epoch, the precision `CommonAttrs` timestamps are
/// stored at.
pub fn current_time_ms() -> i64 {
    use time::OffsetDateTime;
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn std_io_err(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg)
}
