use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateKind {
    Teacher,
    Supervisor,
}

impl CandidateKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Self::Teacher),
            "supervisor" => Some(Self::Supervisor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Supervisor => "supervisor",
        }
    }
}

/// Normalises the sex column to the quota group codes used by the selector.
pub fn normalize_sex(raw: &str) -> Option<String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "M" | "MALE" => Some("M".to_string()),
        "F" | "FEMALE" => Some("F".to_string()),
        _ => None,
    }
}

/// One row of the teacher or supervisor registry, as the selector sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub kind: CandidateKind,
    pub full_name: String,
    pub sex: String,
    pub region_code: String,
    pub district_number: String,
    /// School/office code for teachers, exam center number for supervisors.
    pub workstation: String,
    pub active: bool,
}

/// A committed assignment, reduced to the columns the usage index needs.
#[derive(Debug, Clone)]
pub struct PastAssignment {
    pub job_id: String,
    pub candidate_id: String,
    pub workstation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum Scope {
    All,
    Only(String),
}

impl Scope {
    /// `None`, empty and `"all"` (any case) all mean no narrowing.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None => Self::All,
            Some(s) if s.is_empty() || s.eq_ignore_ascii_case("all") => Self::All,
            Some(s) => Self::Only(s.to_string()),
        }
    }

    pub fn admits(&self, value: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(v) => v == value,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Only(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PartitionBy {
    District,
    Workstation,
}

impl PartitionBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "district" => Some(Self::District),
            "workstation" | "center" => Some(Self::Workstation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::District => "district",
            Self::Workstation => "workstation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaShare {
    pub group: String,
    pub percent: u32,
}

/// Ordered quota groups. Iteration order is the order groups are filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSplit(pub Vec<QuotaShare>);

impl QuotaSplit {
    pub fn male_female(male_percent: u32) -> Self {
        let male = male_percent.min(100);
        Self(vec![
            QuotaShare {
                group: "M".to_string(),
                percent: male,
            },
            QuotaShare {
                group: "F".to_string(),
                percent: 100 - male,
            },
        ])
    }

    pub fn shares(&self) -> &[QuotaShare] {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    pub kind: CandidateKind,
    pub total_required: usize,
    pub region: Scope,
    pub district: Scope,
    pub quotas: QuotaSplit,
    pub partition_by: PartitionBy,
    pub distribute_remainder: bool,
}
