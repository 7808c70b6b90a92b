use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A committed row joined with its job, as the validator needs it.
#[derive(Debug, Clone)]
pub struct ExistingAssignment {
    pub job_id: String,
    pub job_name: String,
    pub assignment_year: i64,
    pub candidate_id: String,
    pub workstation: String,
}

#[derive(Debug, Clone, Copy)]
pub struct JobRef<'a> {
    pub id: &'a str,
    pub assignment_year: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum HardConflict {
    #[serde(rename_all = "camelCase")]
    AlreadyAssigned { job_id: String, candidate_id: String },
    #[serde(rename_all = "camelCase")]
    WorkstationClaimed {
        job_id: String,
        candidate_id: String,
        workstation: String,
        held_by: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingJob {
    pub job_id: String,
    pub job_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftConflict {
    pub candidate_id: String,
    pub assignment_year: i64,
    pub jobs: Vec<ConflictingJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "details")]
pub enum ConflictOutcome {
    Clear,
    HardConflict(HardConflict),
    SoftConflict(SoftConflict),
}

#[derive(Debug, Clone, Copy)]
pub struct CheckOptions<'a> {
    /// Candidate being replaced; their row and workstation claim do not count.
    pub replacing: Option<&'a str>,
    pub soft_check: bool,
}

/// Hard conflicts win over soft ones; a soft conflict is only reported when nothing blocks.
pub fn check_candidate(
    job: JobRef<'_>,
    candidate_id: &str,
    workstation: &str,
    existing: &[ExistingAssignment],
    opts: CheckOptions<'_>,
) -> ConflictOutcome {
    let in_job = existing
        .iter()
        .filter(|a| a.job_id == job.id)
        .filter(|a| Some(a.candidate_id.as_str()) != opts.replacing);

    for a in in_job {
        if a.candidate_id == candidate_id {
            return ConflictOutcome::HardConflict(HardConflict::AlreadyAssigned {
                job_id: job.id.to_string(),
                candidate_id: candidate_id.to_string(),
            });
        }
        if !workstation.is_empty() && a.workstation == workstation {
            return ConflictOutcome::HardConflict(HardConflict::WorkstationClaimed {
                job_id: job.id.to_string(),
                candidate_id: candidate_id.to_string(),
                workstation: workstation.to_string(),
                held_by: a.candidate_id.clone(),
            });
        }
    }

    if !opts.soft_check {
        return ConflictOutcome::Clear;
    }

    let mut others: BTreeMap<&str, &str> = BTreeMap::new();
    for a in existing {
        if a.job_id != job.id
            && a.candidate_id == candidate_id
            && a.assignment_year == job.assignment_year
        {
            others.insert(a.job_id.as_str(), a.job_name.as_str());
        }
    }
    if others.is_empty() {
        return ConflictOutcome::Clear;
    }
    ConflictOutcome::SoftConflict(SoftConflict {
        candidate_id: candidate_id.to_string(),
        assignment_year: job.assignment_year,
        jobs: others
            .into_iter()
            .map(|(job_id, job_name)| ConflictingJob {
                job_id: job_id.to_string(),
                job_name: job_name.to_string(),
            })
            .collect(),
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkConflicts {
    pub hard: Vec<HardConflict>,
    pub soft: Vec<SoftConflict>,
}

impl BulkConflicts {
    pub fn is_clear(&self) -> bool {
        self.hard.is_empty() && self.soft.is_empty()
    }
}

/// Validates a whole draft against committed rows before a bulk insert.
/// `picks` are `(candidate_id, workstation)` pairs in draft order.
pub fn check_bulk(
    job: JobRef<'_>,
    picks: &[(&str, &str)],
    existing: &[ExistingAssignment],
    soft_check: bool,
) -> BulkConflicts {
    let mut out = BulkConflicts::default();
    let mut seen_candidates: HashSet<&str> = HashSet::new();
    let mut seen_workstations: HashSet<&str> = HashSet::new();
    let opts = CheckOptions {
        replacing: None,
        soft_check,
    };

    for &(candidate_id, workstation) in picks {
        if !seen_candidates.insert(candidate_id) {
            out.hard.push(HardConflict::AlreadyAssigned {
                job_id: job.id.to_string(),
                candidate_id: candidate_id.to_string(),
            });
            continue;
        }
        if !seen_workstations.insert(workstation) {
            out.hard.push(HardConflict::WorkstationClaimed {
                job_id: job.id.to_string(),
                candidate_id: candidate_id.to_string(),
                workstation: workstation.to_string(),
                held_by: picks
                    .iter()
                    .find(|(_, ws)| *ws == workstation)
                    .map(|(id, _)| id.to_string())
                    .unwrap_or_default(),
            });
            continue;
        }
        match check_candidate(job, candidate_id, workstation, existing, opts) {
            ConflictOutcome::Clear => {}
            ConflictOutcome::HardConflict(h) => out.hard.push(h),
            ConflictOutcome::SoftConflict(s) => out.soft.push(s),
        }
    }
    out
}
