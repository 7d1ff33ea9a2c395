// Per-plant parameter schedule.
//
// A run of many plants steps through every combination of the varied
// parameters (`deltas`). Plant `n` (1-based) takes the mixed-radix digits of
// `n - 1`, least-significant digit first: digit `m` selects the level of
// delta `m`, and each delta's radix is its own number of levels. The first
// delta therefore cycles fastest; once every combination has been used the
// schedule wraps around.
//
// See also: `params.rs` for `Delta` and `ParamStore::apply_delta`,
// `engine.rs` which resolves a plant's settings in `next_plant`.

use crate::params::{Delta, Value};

/// Mixed-radix digits of `number`, least significant first. A zero radix
/// yields a zero digit and leaves `number` unchanged.
pub fn mixed_radix_digits(mut number: u64, radices: &[usize]) -> Vec<usize> {
    radices
        .iter()
        .map(|&radix| {
            if radix == 0 {
                return 0;
            }
            let radix = radix as u64;
            let digit = number % radix;
            number /= radix;
            digit as usize
        })
        .collect()
}

/// Total number of distinct plants before the schedule repeats.
pub fn combinations(deltas: &[Delta]) -> u64 {
    deltas
        .iter()
        .map(|d| d.levels.len().max(1) as u64)
        .fold(1u64, u64::saturating_mul)
}

/// The `(name, value)` settings for 1-based plant `plant_nr`.
pub fn resolve_plant(deltas: &[Delta], plant_nr: u32) -> Vec<(String, Value)> {
    let radices: Vec<usize> = deltas.iter().map(|d| d.levels.len()).collect();
    let digits = mixed_radix_digits(u64::from(plant_nr.saturating_sub(1)), &radices);
    deltas
        .iter()
        .zip(digits)
        .filter_map(|(delta, digit)| {
            delta
                .levels
                .get(digit)
                .map(|value| (delta.name.clone(), value.clone()))
        })
        .collect()
}
