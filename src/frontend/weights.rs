use crate::mem::org::BankIndex;
use log::warn;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Per-bank sets of address signatures denoting banks occupied by pre-placed
/// model weights.
pub type StaticWeightMap = BTreeMap<BankIndex, HashSet<u64>>;

/// Field of the address tuple carrying the bank coordinate, per convention:
/// simple PIM traces put it second, full HBM hierarchy tuples fourth.
fn bank_field(tuple_len: usize) -> usize {
    if tuple_len >= 6 {
        3
    } else {
        1
    }
}

/// Parse the upstream layout trace into a bank -> weight-signature map.
///
/// Only `R`/`W` lines contribute; anything else (metadata, kernel blocks,
/// malformed tuples) is skipped.  An unopenable file yields an empty map:
/// that is not an error, it means no prior knowledge of the weight layout,
/// and the caller falls back to the mapping observed during kernel expansion.
pub fn extract_weight_banks(path: &Path, num_banks: usize) -> StaticWeightMap {
    let mut weight_map = StaticWeightMap::new();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("could not open static weight trace {}: {}", path.display(), err);
            return weight_map;
        }
    };

    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let mut fields = line.split_whitespace();
        let Some(head) = fields.next() else { continue };
        if head != "R" && head != "W" {
            continue;
        }
        let Some(addr_field) = fields.next() else { continue };

        let tuple: Vec<&str> = addr_field.split(',').collect();
        let Some(bank) = tuple
            .get(bank_field(tuple.len()))
            .and_then(|t| t.trim().parse::<usize>().ok())
        else {
            continue;
        };
        if bank >= num_banks {
            continue;
        }
        // Signature from the row field when present; coarse but unique enough
        // to distinguish weight placements within a bank.
        let signature = tuple
            .get(4)
            .and_then(|t| t.trim().parse::<u64>().ok())
            .unwrap_or(0);
        weight_map.entry(bank).or_default().insert(signature);
    }

    weight_map
}
