use super::model::{Candidate, PastAssignment};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Which workstations and which people other jobs have already drawn on.
#[derive(Debug, Clone, Default)]
pub struct UsageIndex {
    workstation_to_jobs: HashMap<String, BTreeSet<String>>,
    candidate_to_jobs: HashMap<String, BTreeSet<String>>,
}

impl UsageIndex {
    /// Rows of `current_job_id` are skipped so a job never penalises its own earlier picks.
    pub fn build<'a, I>(records: I, current_job_id: &str) -> Self
    where
        I: IntoIterator<Item = &'a PastAssignment>,
    {
        let mut index = Self::default();
        for r in records {
            if r.job_id == current_job_id {
                continue;
            }
            if !r.workstation.is_empty() {
                index
                    .workstation_to_jobs
                    .entry(r.workstation.clone())
                    .or_default()
                    .insert(r.job_id.clone());
            }
            index
                .candidate_to_jobs
                .entry(r.candidate_id.clone())
                .or_default()
                .insert(r.job_id.clone());
        }
        index
    }

    pub fn jobs_for_workstation(&self, workstation: &str) -> Option<&BTreeSet<String>> {
        self.workstation_to_jobs.get(workstation)
    }

    pub fn jobs_for_candidate(&self, candidate_id: &str) -> Option<&BTreeSet<String>> {
        self.candidate_to_jobs.get(candidate_id)
    }

    fn workstation_used(&self, workstation: &str) -> bool {
        self.jobs_for_workstation(workstation)
            .map(|jobs| !jobs.is_empty())
            .unwrap_or(false)
    }

    fn candidate_used(&self, candidate_id: &str) -> bool {
        self.jobs_for_candidate(candidate_id)
            .map(|jobs| !jobs.is_empty())
            .unwrap_or(false)
    }

    pub fn tier(&self, candidate: &Candidate) -> Tier {
        match (
            self.workstation_used(&candidate.workstation),
            self.candidate_used(&candidate.id),
        ) {
            (false, false) => Tier::Untouched,
            (false, true) => Tier::CandidateUsed,
            (true, false) => Tier::WorkstationUsed,
            (true, true) => Tier::BothUsed,
        }
    }
}

/// Lower ranks are picked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Untouched = 1,
    CandidateUsed = 2,
    WorkstationUsed = 3,
    BothUsed = 4,
}

impl Tier {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl Serialize for Tier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.rank())
    }
}
