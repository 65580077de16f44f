use super::*;
use std::collections::HashSet;

fn weight_map(banks: &[usize], sigs_per_bank: u64) -> StaticWeightMap {
    let mut map = StaticWeightMap::new();
    for &bank in banks {
        let sigs: HashSet<u64> = (0..sigs_per_bank).collect();
        map.insert(bank, sigs);
    }
    map
}

fn config_for(name: &str) -> Arc<PolicyConfig> {
    Arc::new(PolicyConfig {
        policy_impl: name.to_string(),
        ..PolicyConfig::default()
    })
}

fn allocate_n(policy: &mut dyn KvCachePolicy, tokens: usize) -> Vec<BankIndex> {
    (0..tokens)
        .map(|t| policy.allocate_kv_cache_bank(4096, t).expect("configured"))
        .collect()
}

fn per_bank_counts(placements: &[BankIndex], num_banks: usize) -> Vec<usize> {
    let mut counts = vec![0; num_banks];
    for &bank in placements {
        counts[bank] += 1;
    }
    counts
}

fn stat(policy: &dyn KvCachePolicy, name: &str) -> i64 {
    policy
        .stats()
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .unwrap_or_else(|| panic!("missing stat {}", name))
}

#[test]
fn naive_round_robin_conflicts_proportional_to_weighted_banks() {
    let mut policy = NaiveKvPolicy::new();
    policy.init(16, &weight_map(&(0..12).collect::<Vec<_>>(), 4));

    let placements = allocate_n(&mut policy, 512);
    assert_eq!(placements[0], 0);
    assert_eq!(placements[15], 15);
    assert_eq!(stat(&policy, "total_allocations"), 512);
    // 12 of 16 banks hold weights and the walk is uniform.
    assert_eq!(stat(&policy, "total_conflicts"), 384);

    let counts = per_bank_counts(&placements, 16);
    assert!(counts.iter().all(|&c| c == 32));
    assert_eq!(counts.iter().sum::<usize>() as i64, 512);
}

#[test]
fn partitioning_reserved_range_stays_conflict_free() {
    let config = Arc::new(PolicyConfig {
        policy_impl: super::partition::NAME.to_string(),
        kv_cache_banks_start: 12,
        kv_cache_banks_count: Some(4),
        ..PolicyConfig::default()
    });
    let mut policy = BankPartitioningPolicy::new(config);
    policy.init(16, &weight_map(&(0..12).collect::<Vec<_>>(), 4));

    // Precondition of the scenario: the reserved range carries no weights.
    for bank in 12..16 {
        assert!(!policy.has_bank_conflict(bank));
    }

    let placements = allocate_n(&mut policy, 512);
    assert_eq!(placements[4], 12);
    assert!(placements.iter().all(|&b| (12..16).contains(&b)));
    assert_eq!(stat(&policy, "total_allocations"), 512);
    assert_eq!(stat(&policy, "total_conflicts"), 0);
    assert_eq!(stat(&policy, "reserved_banks"), 4);
}

#[test]
fn partitioning_reports_weights_inside_reserved_range() {
    let config = Arc::new(PolicyConfig {
        policy_impl: super::partition::NAME.to_string(),
        kv_cache_banks_start: 0,
        kv_cache_banks_count: Some(4),
        ..PolicyConfig::default()
    });
    let mut policy = BankPartitioningPolicy::new(config);
    policy.init(16, &weight_map(&[2], 1));

    allocate_n(&mut policy, 8);
    // Bank 2 is visited twice in two laps of the reserved range.
    assert_eq!(stat(&policy, "total_conflicts"), 2);
}

#[test]
fn partitioning_clamps_range_to_bank_space() {
    let config = Arc::new(PolicyConfig {
        policy_impl: super::partition::NAME.to_string(),
        kv_cache_banks_start: 14,
        kv_cache_banks_count: Some(8),
        ..PolicyConfig::default()
    });
    let mut policy = BankPartitioningPolicy::new(config);
    policy.init(16, &StaticWeightMap::new());

    let placements = allocate_n(&mut policy, 6);
    assert!(placements.iter().all(|&b| b == 14 || b == 15));
    assert_eq!(stat(&policy, "reserved_banks"), 2);
}

#[test]
fn partitioning_defaults_to_a_quarter_of_banks() {
    let mut policy = BankPartitioningPolicy::new(config_for(super::partition::NAME));
    policy.init(16, &StaticWeightMap::new());
    assert_eq!(stat(&policy, "reserved_banks"), 4);
}

#[test]
fn contention_fills_weight_free_banks_up_to_cap() {
    let mut policy = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    policy.init(16, &weight_map(&(0..12).collect::<Vec<_>>(), 4));

    let placements = allocate_n(&mut policy, 12);
    assert!(placements.iter().all(|&b| (12..16).contains(&b)));
    let counts = per_bank_counts(&placements, 16);
    assert!(counts[12..16].iter().all(|&c| c == 3));
    assert_eq!(stat(&policy, "total_conflicts"), 0);
}

#[test]
fn contention_overflow_spreads_by_minimum_load() {
    let mut policy = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    policy.init(16, &weight_map(&(0..12).collect::<Vec<_>>(), 4));

    let placements = allocate_n(&mut policy, 20);
    assert!(placements.iter().all(|&b| (12..16).contains(&b)));
    let counts = per_bank_counts(&placements, 16);
    assert!(counts[12..16].iter().all(|&c| c == 5));
    assert_eq!(stat(&policy, "total_conflicts"), 0);
    assert_eq!(stat(&policy, "total_allocations"), 20);
}

#[test]
fn contention_with_all_banks_weighted_balances_load() {
    let mut policy = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    policy.init(4, &weight_map(&[0, 1, 2, 3], 2));

    let placements = allocate_n(&mut policy, 8);
    let counts = per_bank_counts(&placements, 4);
    assert_eq!(counts, vec![2, 2, 2, 2]);
    assert_eq!(stat(&policy, "total_conflicts"), 8);
    assert_eq!(stat(&policy, "total_allocations"), 8);
}

#[test]
fn contention_distributes_exactly_cap_per_bank_without_weights() {
    let num_banks = 8;
    let cap = 3;
    let mut policy = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    policy.init(num_banks, &StaticWeightMap::new());

    let placements = allocate_n(&mut policy, num_banks * cap);
    let counts = per_bank_counts(&placements, num_banks);
    assert!(counts.iter().all(|&c| c == cap), "uneven fill: {:?}", counts);
}

#[test]
fn smart_locality_without_bonus_matches_contention_aware() {
    let map = weight_map(&(0..12).collect::<Vec<_>>(), 4);

    let mut contention = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    contention.init(16, &map);
    let expected = allocate_n(&mut contention, 12);

    let config = Arc::new(PolicyConfig {
        policy_impl: super::locality::NAME.to_string(),
        locality_weight: 0.0,
        ..PolicyConfig::default()
    });
    let mut locality = SmartLocalityPolicy::new(config);
    locality.init(16, &map);
    let placements = allocate_n(&mut locality, 12);

    assert_eq!(placements, expected);
    assert_eq!(stat(&locality, "total_conflicts"), 0);
    assert_eq!(stat(&locality, "locality_bonus_hits"), 0);
}

#[test]
fn smart_locality_bonus_prefers_moderately_active_banks() {
    // Bank 1 sits in the bonus band (50% of the busiest bank), bank 0 is the
    // hot bank, banks 2..4 are free.  Once the free banks hit the cap, the
    // banded bank 1 must win over bank 0.
    let mut map = weight_map(&[0], 8);
    map.insert(1, (0..4).collect());

    let config = Arc::new(PolicyConfig {
        policy_impl: super::locality::NAME.to_string(),
        locality_weight: 1.0,
        max_kv_per_bank: 1,
        activity_threshold_percent: 101,
        ..PolicyConfig::default()
    });
    let mut policy = SmartLocalityPolicy::new(config);
    policy.init(4, &map);

    // Two free banks take the first two entries.
    let first = allocate_n(&mut policy, 2);
    assert_eq!(first, vec![2, 3]);
    // Score with every bank cold-classified: bank 1 = 400 - 50, bank 0 = 800.
    let third = policy.allocate_kv_cache_bank(4096, 2).unwrap();
    assert_eq!(third, 1);
    assert_eq!(stat(&policy, "locality_bonus_hits"), 1);
}

#[test]
fn allocations_remain_in_bank_space_for_every_variant() {
    let map = weight_map(&[0, 3, 5], 2);
    let mut policies: Vec<Box<dyn KvCachePolicy>> = vec![
        Box::new(NaiveKvPolicy::new()),
        Box::new(BankPartitioningPolicy::new(config_for(
            super::partition::NAME,
        ))),
        Box::new(ContentionAwarePolicy::new(config_for(
            super::contention::NAME,
        ))),
        Box::new(SmartLocalityPolicy::new(config_for(super::locality::NAME))),
    ];
    for policy in policies.iter_mut() {
        policy.init(8, &map);
        for token in 0..40 {
            let bank = policy
                .allocate_kv_cache_bank(4096, token)
                .expect("configured policy allocates");
            assert!(bank < 8, "{} placed bank {}", policy.name(), bank);
            assert_eq!(policy.get_kv_cache_bank(token), Some(bank));
        }
        assert_eq!(stat(policy.as_ref(), "total_allocations"), 40);
        assert!(stat(policy.as_ref(), "total_conflicts") <= 40);
        assert_eq!(policy.get_kv_cache_bank(999), None);
    }
}

#[test]
fn late_weight_mapping_rebinds_without_touching_allocations() {
    let mut policy = NaiveKvPolicy::new();
    policy.init(4, &StaticWeightMap::new());
    allocate_n(&mut policy, 4);
    assert_eq!(stat(&policy, "total_conflicts"), 0);

    policy.set_static_weight_mapping(&weight_map(&[0, 1, 2, 3], 1));
    assert_eq!(policy.get_kv_cache_bank(0), Some(0), "placements survive");
    allocate_n_more(&mut policy, 4, 4);
    assert_eq!(stat(&policy, "total_conflicts"), 4);
    assert_eq!(stat(&policy, "total_allocations"), 8);
}

fn allocate_n_more(policy: &mut dyn KvCachePolicy, first_token: usize, tokens: usize) {
    for t in first_token..first_token + tokens {
        policy.allocate_kv_cache_bank(4096, t).expect("configured");
    }
}

#[test]
fn reset_stats_keeps_placement_table() {
    let mut policy = ContentionAwarePolicy::new(config_for(super::contention::NAME));
    policy.init(4, &weight_map(&[0, 1, 2, 3], 1));
    allocate_n(&mut policy, 4);

    policy.reset_stats();
    assert_eq!(stat(&policy, "total_allocations"), 0);
    assert_eq!(stat(&policy, "total_conflicts"), 0);
    assert!(policy.get_kv_cache_bank(0).is_some());
}

#[test]
fn unconfigured_policy_refuses_to_allocate() {
    let mut policy = NaiveKvPolicy::new();
    assert_eq!(policy.allocate_kv_cache_bank(4096, 0), None);
}

#[test]
fn registry_builds_every_variant_and_rejects_unknown_names() {
    for name in [
        super::naive::NAME,
        super::partition::NAME,
        super::contention::NAME,
        super::locality::NAME,
    ] {
        let policy = build_policy(&config_for(name)).expect("known variant");
        assert_eq!(policy.name(), name);
    }
    assert!(build_policy(&config_for("RoundRobinPlus")).is_err());
}
