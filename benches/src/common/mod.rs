use flow::prelude::*;

/// Sequences `1..=n` in a deterministic scrambled order
///
/// Items arrive in blocks of `window` reversed, so the reorder buffer holds
/// up to `window - 1` items at a time.
#[allow(dead_code)]
pub fn scrambled(n: u64, window: u64) -> Vec<Tagged<u64>> {
    let window = window.max(1);
    let mut sequences: Vec<u64> = (1..=n).collect();
    for block in sequences.chunks_mut(window as usize) {
        block.reverse();
    }
    sequences.into_iter().map(|s| Tagged::new(s, s)).collect()
}

/// `key,value` CSV with `rows` rows
#[allow(dead_code)]
pub fn generate_csv(rows: usize) -> String {
    let mut csv = String::from("key,value\n");
    for i in 0..rows {
        csv.push_str(&format!("k{},{}.{:02}\n", i % 16, i, i % 100));
    }
    csv
}
