use crate::sim::config::Config;
use serde::Deserialize;

pub type BankIndex = usize;
pub type AddrVec = Vec<u64>;

/// DRAM hierarchy levels, outermost first.  Address vectors index into this
/// order; the flat bank space is the mixed-radix product of every level above
/// and including `bank`.
pub const LEVELS: [&str; 6] = ["channel", "rank", "bankgroup", "bank", "row", "column"];

const BANK_LEVEL: usize = 3;
const ROW_LEVEL: usize = 4;
const COLUMN_LEVEL: usize = 5;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MemConfig {
    pub channels: usize,
    pub ranks: usize,
    pub bankgroups: usize,
    pub banks_per_bankgroup: usize,
    pub rows: usize,
    pub columns: usize,
    /// Per-bank request queue depth in the banked service model.
    pub queue_depth: usize,
    /// Cycles a bank is busy serving one operation.
    pub service_latency: u64,
}

impl Config for MemConfig {}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            ranks: 1,
            bankgroups: 2,
            banks_per_bankgroup: 4,
            rows: 16384,
            columns: 64,
            queue_depth: 16,
            service_latency: 4,
        }
    }
}

/// Mixed-radix description of the DRAM hierarchy.  This is the organization
/// descriptor the frontend consumes to size the flat bank space and to move
/// between global bank indices and address vectors.
#[derive(Debug, Clone)]
pub struct DramOrganization {
    count: Vec<u64>,
}

impl DramOrganization {
    pub fn new(config: &MemConfig) -> Self {
        Self {
            count: vec![
                config.channels as u64,
                config.ranks as u64,
                config.bankgroups as u64,
                config.banks_per_bankgroup as u64,
                config.rows as u64,
                config.columns as u64,
            ],
        }
    }

    /// Build directly from a count vector, one entry per level in `LEVELS`.
    pub fn from_counts(count: Vec<u64>) -> Self {
        assert_eq!(count.len(), LEVELS.len(), "one count per hierarchy level");
        Self { count }
    }

    pub fn level(&self, name: &str) -> Option<usize> {
        LEVELS.iter().position(|n| *n == name)
    }

    pub fn get_level_size(&self, name: &str) -> usize {
        self.level(name).map_or(0, |j| self.count[j] as usize)
    }

    pub fn count(&self) -> &[u64] {
        &self.count
    }

    pub fn num_levels(&self) -> usize {
        self.count.len()
    }

    pub fn bank_level(&self) -> usize {
        BANK_LEVEL
    }

    pub fn row_level(&self) -> usize {
        ROW_LEVEL
    }

    pub fn column_level(&self) -> usize {
        COLUMN_LEVEL
    }

    pub fn num_banks(&self) -> usize {
        self.count[..=BANK_LEVEL].iter().product::<u64>() as usize
    }

    /// Reverse the mixed-radix encoding of a global bank index into hierarchy
    /// coordinates.  Row and column slots are left at zero.
    pub fn decompose(&self, bank: BankIndex) -> Option<AddrVec> {
        if bank >= self.num_banks() {
            return None;
        }
        let mut addr_vec = vec![0u64; self.count.len()];
        let mut rem = bank as u64;
        for j in (0..=BANK_LEVEL).rev() {
            addr_vec[j] = rem % self.count[j];
            rem /= self.count[j];
        }
        Some(addr_vec)
    }

    /// Fold hierarchy coordinates back into the global bank index.
    pub fn project(&self, addr_vec: &[u64]) -> Option<BankIndex> {
        if addr_vec.len() <= BANK_LEVEL {
            return None;
        }
        let mut bank = 0u64;
        for j in 0..=BANK_LEVEL {
            if addr_vec[j] >= self.count[j] {
                return None;
            }
            bank = bank * self.count[j] + addr_vec[j];
        }
        Some(bank as usize)
    }

    /// Extract the bank index of an address vector of either convention: full
    /// hierarchy vectors project through every level, short simple-trace
    /// vectors carry the bank in their second field.
    pub fn bank_of(&self, addr_vec: &[u64]) -> Option<BankIndex> {
        if addr_vec.len() >= self.num_levels() {
            return self.project(addr_vec);
        }
        let bank = *addr_vec.get(1)? as usize;
        (bank < self.num_banks()).then_some(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hbm_org() -> DramOrganization {
        DramOrganization::from_counts(vec![2, 1, 2, 4, 128, 32])
    }

    #[test]
    fn num_banks_is_product_above_row() {
        assert_eq!(hbm_org().num_banks(), 16);
        let single = DramOrganization::from_counts(vec![1, 1, 1, 4, 8, 8]);
        assert_eq!(single.num_banks(), 4);
    }

    #[test]
    fn decompose_then_project_round_trips() {
        let org = hbm_org();
        for bank in 0..org.num_banks() {
            let addr_vec = org.decompose(bank).expect("bank in range");
            assert_eq!(addr_vec.len(), LEVELS.len());
            assert_eq!(addr_vec[org.row_level()], 0);
            assert_eq!(addr_vec[org.column_level()], 0);
            assert_eq!(
                org.project(&addr_vec),
                Some(bank),
                "round trip broke at bank {}",
                bank
            );
        }
    }

    #[test]
    fn decompose_rejects_out_of_range() {
        let org = hbm_org();
        assert!(org.decompose(org.num_banks()).is_none());
    }

    #[test]
    fn project_rejects_overflowing_coordinates() {
        let org = hbm_org();
        assert!(org.project(&[0, 0, 0, 4, 0, 0]).is_none());
        assert!(org.project(&[0, 0]).is_none());
    }

    #[test]
    fn bank_of_handles_both_conventions() {
        let org = hbm_org();
        // Full hierarchy vector projects through every level.
        let addr_vec = org.decompose(13).unwrap();
        assert_eq!(org.bank_of(&addr_vec), Some(13));
        // Simple-trace vector carries the bank in field 1.
        assert_eq!(org.bank_of(&[0, 5]), Some(5));
        assert_eq!(org.bank_of(&[0, 99]), None);
    }

    #[test]
    fn level_lookup_matches_names() {
        let org = hbm_org();
        assert_eq!(org.get_level_size("channel"), 2);
        assert_eq!(org.get_level_size("bankgroup"), 2);
        assert_eq!(org.get_level_size("bank"), 4);
        assert_eq!(org.get_level_size("subarray"), 0);
    }
}
