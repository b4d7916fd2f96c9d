//! Token demand for reads and writes.
//!
//! Prices are tokens per GiB. Demand is rounded up so that any non-zero
//! transfer at a non-zero price costs at least one token.

const GIB: u128 = 1 << 30;

/// Tokens needed to serve `num_blocks` blocks of `chunk_size` bytes.
pub fn want_read(num_blocks: u64, chunk_size: u64, read_price: u64) -> u64 {
    cost(num_blocks as u128 * chunk_size as u128, read_price)
}

/// Tokens needed to store `size` additional bytes. Non-positive sizes cost
/// nothing.
pub fn want_write(size: i64, write_price: u64) -> u64 {
    if size <= 0 {
        return 0;
    }
    cost(size as u128, write_price)
}

fn cost(bytes: u128, price: u64) -> u64 {
    let scaled = bytes * price as u128;
    u64::try_from(scaled.div_ceil(GIB)).unwrap_or(u64::MAX)
}
