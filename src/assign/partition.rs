use super::model::{Candidate, PartitionBy, Scope, SelectionCriteria};
use serde::Serialize;
use std::collections::BTreeSet;

pub fn partition_key(candidate: &Candidate, by: PartitionBy) -> &str {
    match by {
        PartitionBy::District => &candidate.district_number,
        PartitionBy::Workstation => &candidate.workstation,
    }
}

/// Active candidates of the job's registry inside the region/district scope.
pub fn eligible_pool<'a>(pool: &'a [Candidate], criteria: &SelectionCriteria) -> Vec<&'a Candidate> {
    pool.iter()
        .filter(|c| c.active)
        .filter(|c| c.kind == criteria.kind)
        .filter(|c| !c.workstation.is_empty())
        .filter(|c| criteria.region.admits(&c.region_code))
        .filter(|c| criteria.district.admits(&c.district_number))
        .collect()
}

/// Distinct partition keys in key order. A narrowed district is a single partition when
/// partitioning by district.
pub fn partition_keys(eligible: &[&Candidate], criteria: &SelectionCriteria) -> Vec<String> {
    if criteria.partition_by == PartitionBy::District {
        if let Scope::Only(d) = &criteria.district {
            return vec![d.clone()];
        }
    }
    eligible
        .iter()
        .map(|c| partition_key(c, criteria.partition_by).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionTarget {
    pub key: String,
    pub target: usize,
}

/// `floor(total / partitions)` each. With `distribute_remainder` the first `total % partitions`
/// keys get one more.
pub fn partition_targets(
    total_required: usize,
    keys: &[String],
    distribute_remainder: bool,
) -> Vec<PartitionTarget> {
    if keys.is_empty() {
        return Vec::new();
    }
    let base = total_required / keys.len();
    let remainder = total_required % keys.len();
    keys.iter()
        .enumerate()
        .map(|(i, key)| PartitionTarget {
            key: key.clone(),
            target: if distribute_remainder && i < remainder {
                base + 1
            } else {
                base
            },
        })
        .collect()
}
