use super::history::{Tier, UsageIndex};
use super::model::{Candidate, PastAssignment, SelectionCriteria};
use super::partition::{eligible_pool, partition_key, partition_keys, partition_targets};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRow {
    pub candidate: Candidate,
    pub tier: Tier,
    pub partition: String,
    pub quota_group: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub group: String,
    pub needed: usize,
    pub selected: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStats {
    pub key: String,
    pub target: usize,
    pub selected: usize,
    pub groups: Vec<GroupStats>,
}

/// An unpersisted proposal. Regenerating replaces it wholesale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub job_id: String,
    pub seed: u64,
    pub total_required: usize,
    pub eligible_count: usize,
    pub rows: Vec<DraftRow>,
    pub partitions: Vec<PartitionStats>,
    pub shortfall: usize,
}

/// Builds the usage index for `job_id`, seeds the shuffle and runs the selector.
pub fn generate_draft(
    job_id: &str,
    pool: &[Candidate],
    history: &[PastAssignment],
    criteria: &SelectionCriteria,
    seed: Option<u64>,
) -> Draft {
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let index = UsageIndex::build(history, job_id);
    let mut draft = select_draft(job_id, pool, &index, criteria, &mut rng);
    draft.seed = seed;
    tracing::debug!(
        job_id,
        seed,
        eligible = draft.eligible_count,
        selected = draft.rows.len(),
        "selector finished"
    );
    draft
}

pub fn select_draft<R: Rng + ?Sized>(
    job_id: &str,
    pool: &[Candidate],
    index: &UsageIndex,
    criteria: &SelectionCriteria,
    rng: &mut R,
) -> Draft {
    let mut eligible = eligible_pool(pool, criteria);
    let eligible_count = eligible.len();

    // Shuffle first so the stable sort leaves tier-mates in random order.
    eligible.shuffle(rng);
    let mut ranked: Vec<(Tier, &Candidate)> =
        eligible.into_iter().map(|c| (index.tier(c), c)).collect();
    ranked.sort_by_key(|(tier, _)| *tier);

    let keys = partition_keys(
        &ranked.iter().map(|(_, c)| *c).collect::<Vec<_>>(),
        criteria,
    );
    let targets = partition_targets(criteria.total_required, &keys, criteria.distribute_remainder);

    let mut used_workstations: HashSet<&str> = HashSet::new();
    let mut rows: Vec<DraftRow> = Vec::new();
    let mut partitions: Vec<PartitionStats> = Vec::with_capacity(targets.len());

    for target in &targets {
        let mut stats = PartitionStats {
            key: target.key.clone(),
            target: target.target,
            selected: 0,
            groups: Vec::new(),
        };
        for share in criteria.quotas.shares() {
            let needed = quota_count(target.target, share.percent);
            let mut selected = 0usize;
            for (tier, c) in &ranked {
                if selected >= needed {
                    break;
                }
                if partition_key(c, criteria.partition_by) != target.key || c.sex != share.group {
                    continue;
                }
                if !used_workstations.insert(c.workstation.as_str()) {
                    continue;
                }
                rows.push(DraftRow {
                    candidate: (*c).clone(),
                    tier: *tier,
                    partition: target.key.clone(),
                    quota_group: share.group.clone(),
                });
                selected += 1;
            }
            stats.selected += selected;
            stats.groups.push(GroupStats {
                group: share.group.clone(),
                needed,
                selected,
            });
        }
        partitions.push(stats);
    }

    Draft {
        job_id: job_id.to_string(),
        seed: 0,
        total_required: criteria.total_required,
        eligible_count,
        shortfall: criteria.total_required.saturating_sub(rows.len()),
        rows,
        partitions,
    }
}

/// `round(target * percent / 100)`, halves rounding up.
pub fn quota_count(target: usize, percent: u32) -> usize {
    ((target as f64) * (percent as f64) / 100.0).round() as usize
}
