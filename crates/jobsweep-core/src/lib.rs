//! Core domain model for the JobSweep ingestion pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod digest;

pub const CRATE_NAME: &str = "jobsweep-core";

/// Where a posting was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Adzuna,
    Greenhouse,
    Lever,
    Ashby,
    Workable,
    SmartRecruiters,
    Google,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Adzuna => "adzuna",
            DataSource::Greenhouse => "greenhouse",
            DataSource::Lever => "lever",
            DataSource::Ashby => "ashby",
            DataSource::Workable => "workable",
            DataSource::SmartRecruiters => "smartrecruiters",
            DataSource::Google => "google",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "adzuna" => Some(DataSource::Adzuna),
            "greenhouse" => Some(DataSource::Greenhouse),
            "lever" => Some(DataSource::Lever),
            "ashby" => Some(DataSource::Ashby),
            "workable" => Some(DataSource::Workable),
            "smartrecruiters" => Some(DataSource::SmartRecruiters),
            "google" => Some(DataSource::Google),
            _ => None,
        }
    }

    /// Aggregator descriptions are short excerpts; direct ATS boards carry
    /// the full posting. The dedup merger prefers direct sources.
    pub fn is_aggregator(&self) -> bool {
        matches!(self, DataSource::Adzuna)
    }

    pub const ALL: [DataSource; 7] = [
        DataSource::Adzuna,
        DataSource::Greenhouse,
        DataSource::Lever,
        DataSource::Ashby,
        DataSource::Workable,
        DataSource::SmartRecruiters,
        DataSource::Google,
    ];
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of one career board we scrape. Immutable once configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerRef {
    pub source: DataSource,
    pub display_name: String,
    pub slug: String,
    /// Region variant for sources with global/EU hosts (Lever).
    pub instance: Option<String>,
}

/// Structured hints a source exposes alongside the free text. Forwarded to
/// the classifier and the taxonomy mapper; persisted in raw metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workplace_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_remote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_is_predicted: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<StructuredLocation>,
}

impl SourceHints {
    /// True when the source supplied any structured workplace signal that
    /// can override an `unknown` classifier verdict.
    pub fn workplace_signal(&self) -> bool {
        self.workplace_type.is_some() || self.is_remote.is_some() || self.location_type.is_some()
    }
}

/// Structured location as provided by sources that expose one (Ashby
/// postal addresses, Google feed `<locations>`, Workable).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Canonicalized, source-native view of one job ad after field extraction
/// and HTML stripping. Identity is `(source, posting_url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: DataSource,
    pub posting_url: String,
    pub source_job_id: Option<String>,
    pub title: String,
    pub company: String,
    /// Display location string as the board renders it.
    pub location: String,
    /// Plain-text description, HTML stripped and whitespace-normalized.
    pub raw_text: String,
    /// City code of the sweep that observed the posting, when known.
    pub city_hint: Option<String>,
    /// Change-detection digest over the canonicalized text.
    pub content_hash: String,
    pub hints: SourceHints,
}

impl RawPosting {
    /// Recompute and store the content hash from the current title + text.
    pub fn seal(mut self) -> Self {
        self.content_hash = digest::content_hash(&self.title, &self.raw_text);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingArrangement {
    Onsite,
    Hybrid,
    Remote,
    Flexible,
    #[serde(other)]
    Unknown,
}

impl WorkingArrangement {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkingArrangement::Onsite => "onsite",
            WorkingArrangement::Hybrid => "hybrid",
            WorkingArrangement::Remote => "remote",
            WorkingArrangement::Flexible => "flexible",
            WorkingArrangement::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgencyConfidence {
    Low,
    Medium,
    High,
}

impl AgencyConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyConfidence::Low => "low",
            AgencyConfidence::Medium => "medium",
            AgencyConfidence::High => "high",
        }
    }
}

/// Verdict of the pattern-based agency detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyVerdict {
    pub is_agency: bool,
    pub confidence: AgencyConfidence,
}

impl AgencyVerdict {
    pub const NOT_AGENCY: AgencyVerdict = AgencyVerdict {
        is_agency: false,
        confidence: AgencyConfidence::Low,
    };

    pub fn agency(confidence: AgencyConfidence) -> Self {
        Self {
            is_agency: true,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    City,
    Country,
    Region,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteScope {
    Global,
    Country,
    Region,
}

/// One entry of the canonical `locations` list on an enriched row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLocation {
    #[serde(rename = "type")]
    pub kind: LocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<RemoteScope>,
}

impl JobLocation {
    pub fn city(city: impl Into<String>, country_code: Option<String>) -> Self {
        Self {
            kind: LocationKind::City,
            city: Some(city.into()),
            region: None,
            country_code,
            scope: None,
        }
    }

    pub fn remote(scope: RemoteScope, country_code: Option<String>) -> Self {
        Self {
            kind: LocationKind::Remote,
            city: None,
            region: None,
            country_code,
            scope: Some(scope),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployerFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_agency: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_confidence: Option<AgencyConfidence>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_subfamily: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_range: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_arrangement: Option<WorkingArrangement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<JobLocation>>,
    /// Legacy display hint; `locations` is canonical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_eligible: Option<bool>,
}

impl CompensationFacts {
    pub fn suppress(&mut self) {
        self.currency = None;
        self.salary_min = None;
        self.salary_max = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub family_code: Option<String>,
}

/// Structured classifier output plus deterministic corrections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub employer: EmployerFacts,
    #[serde(default)]
    pub role: RoleFacts,
    #[serde(default)]
    pub location: LocationFacts,
    #[serde(default)]
    pub compensation: CompensationFacts,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Token and dollar accounting for one classifier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMeta {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub provider: String,
    pub model: String,
}

/// Joined record published to the analytic store; one per raw posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPosting {
    pub employer_name: String,
    pub title_display: String,
    pub job_family: Option<String>,
    pub job_subfamily: Option<String>,
    pub seniority: Option<String>,
    pub track: Option<String>,
    pub position_type: Option<String>,
    pub working_arrangement: Option<WorkingArrangement>,
    pub locations: Vec<JobLocation>,
    pub experience_range: Option<String>,
    pub employer_department: Option<String>,
    pub employer_size: Option<String>,
    pub is_agency: bool,
    pub agency_confidence: AgencyConfidence,
    pub currency: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub equity_eligible: Option<bool>,
    pub skills: Vec<Skill>,
    pub data_source: DataSource,
    pub description_source: DataSource,
    pub deduplicated: bool,
    pub posted_date: Option<NaiveDate>,
    pub last_seen_date: Option<NaiveDate>,
}

impl EnrichedPosting {
    /// Skeleton row for a posting that never reached the classifier
    /// (hard agency filter). Role fields stay empty and take the store's
    /// write-time defaults.
    pub fn unclassified(raw: &RawPosting, verdict: AgencyVerdict) -> Self {
        Self {
            employer_name: raw.company.clone(),
            title_display: raw.title.clone(),
            job_family: None,
            job_subfamily: None,
            seniority: None,
            track: None,
            position_type: None,
            working_arrangement: None,
            locations: Vec::new(),
            experience_range: None,
            employer_department: None,
            employer_size: None,
            is_agency: verdict.is_agency,
            agency_confidence: verdict.confidence,
            currency: None,
            salary_min: None,
            salary_max: None,
            equity_eligible: None,
            skills: Vec::new(),
            data_source: raw.source,
            description_source: raw.source,
            deduplicated: false,
            posted_date: None,
            last_seen_date: None,
        }
    }
}
