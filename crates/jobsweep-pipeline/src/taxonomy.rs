//! Deterministic post-processing of classifier output: subfamily → family,
//! skill → family code, track/seniority corrections, location extraction,
//! working-arrangement fallback, and compensation suppression.

use std::collections::HashMap;

use jobsweep_core::{
    Classification, DataSource, JobLocation, LocationKind, RawPosting, RemoteScope, Skill,
    WorkingArrangement,
};
use serde::Deserialize;
use tracing::warn;

/// Title tokens that legitimize `track = management` / `seniority =
/// director_plus`.
const DIRECTOR_SIGNALS: [&str; 14] = [
    "director",
    "head of",
    "head,",
    "vp",
    "vice president",
    "svp",
    "evp",
    "avp",
    "rvp",
    "chief",
    "cto",
    "cpo",
    "cdo",
    "partner",
];

const STAFF_SIGNALS: [&str; 2] = ["staff", "principal"];
const SENIOR_SIGNALS: [&str; 3] = ["senior", "sr", "lead"];

/// Country-name tokens seen in board location strings, normalized to ISO
/// alpha-2 codes.
const COUNTRY_TOKENS: [(&str, &str); 14] = [
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("great britain", "GB"),
    ("england", "GB"),
    ("united states", "US"),
    ("usa", "US"),
    ("us", "US"),
    ("ireland", "IE"),
    ("singapore", "SG"),
    ("germany", "DE"),
    ("france", "FR"),
    ("canada", "CA"),
    ("netherlands", "NL"),
    ("australia", "AU"),
];

/// Cities the sweeps target, with their countries.
const KNOWN_CITIES: [(&str, &str); 6] = [
    ("london", "GB"),
    ("new york", "US"),
    ("denver", "US"),
    ("singapore", "SG"),
    ("dublin", "IE"),
    ("san francisco", "US"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SkillDuplicate {
    pub name: String,
    pub kept_family: String,
    pub shadowed_family: String,
}

/// Case-insensitive skill lookup with canonical casing from config.
/// Duplicate names follow last-write-wins; the shadowed entries are kept as
/// evidence for the taxonomy audit.
#[derive(Debug, Clone, Default)]
pub struct SkillTable {
    by_lower: HashMap<String, (String, String)>,
    pub duplicates: Vec<SkillDuplicate>,
}

impl SkillTable {
    pub fn insert(&mut self, name: &str, family: &str) {
        let key = name.trim().to_lowercase();
        if let Some((_, previous_family)) =
            self.by_lower.insert(key, (name.trim().to_string(), family.to_string()))
        {
            if previous_family != family {
                self.duplicates.push(SkillDuplicate {
                    name: name.trim().to_string(),
                    kept_family: family.to_string(),
                    shadowed_family: previous_family,
                });
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<(&str, &str)> {
        self.by_lower
            .get(&name.trim().to_lowercase())
            .map(|(canonical, family)| (canonical.as_str(), family.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_lower.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaxonomyTables {
    pub subfamily_to_family: HashMap<String, String>,
    pub skills: SkillTable,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuppressionRule {
    #[serde(default)]
    pub city_contains: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Config-driven compensation suppression: markets without pay-transparency
/// regulation and aggregator rows with model-predicted numbers. This table
/// is the single knob; no ad-hoc source checks elsewhere.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuppressionRules {
    #[serde(default)]
    pub rules: Vec<SuppressionRule>,
}

impl SuppressionRules {
    pub fn applies(
        &self,
        source: DataSource,
        raw_location: &str,
        locations: &[JobLocation],
    ) -> bool {
        let raw_location = raw_location.to_lowercase();
        self.rules.iter().any(|rule| {
            if let Some(rule_source) = &rule.source {
                if !rule_source.eq_ignore_ascii_case(source.as_str()) {
                    return false;
                }
            }
            if let Some(fragment) = &rule.city_contains {
                let fragment = fragment.to_lowercase();
                let in_display = raw_location.contains(&fragment);
                let in_structured = locations.iter().any(|l| {
                    l.city
                        .as_deref()
                        .is_some_and(|city| city.to_lowercase().contains(&fragment))
                });
                if !in_display && !in_structured {
                    return false;
                }
            }
            rule.source.is_some() || rule.city_contains.is_some()
        })
    }
}

fn has_director_signal(title: &str) -> bool {
    let title = title.to_lowercase();
    DIRECTOR_SIGNALS
        .iter()
        .any(|signal| contains_token(&title, signal))
}

/// Word-boundary containment so "vp" does not match inside "developer".
fn contains_token(haystack: &str, token: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(token) {
        let begin = start + pos;
        let end = begin + token.len();
        let left_ok = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let right_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if left_ok && right_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

/// Re-infer IC seniority from title qualifiers.
fn infer_seniority(title: &str) -> &'static str {
    let title = title.to_lowercase();
    if STAFF_SIGNALS.iter().any(|s| contains_token(&title, s)) {
        return "staff_principal";
    }
    if SENIOR_SIGNALS.iter().any(|s| contains_token(&title, s)) {
        return "senior";
    }
    "mid"
}

fn country_code_for(token: &str) -> Option<String> {
    let token = token.trim().to_lowercase();
    COUNTRY_TOKENS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, code)| (*code).to_string())
}

fn known_city(token: &str) -> Option<(String, String)> {
    let lowered = token.trim().to_lowercase();
    KNOWN_CITIES
        .iter()
        .find(|(city, _)| lowered.contains(city))
        .map(|(city, code)| {
            let display = city
                .split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            (display, (*code).to_string())
        })
}

pub struct TaxonomyMapper {
    tables: TaxonomyTables,
    suppression: SuppressionRules,
}

impl TaxonomyMapper {
    pub fn new(tables: TaxonomyTables, suppression: SuppressionRules) -> Self {
        Self {
            tables,
            suppression,
        }
    }

    pub fn family_table(&self) -> &HashMap<String, String> {
        &self.tables.subfamily_to_family
    }

    /// Apply every deterministic correction in order. The classifier output
    /// is advisory where these rules disagree with it.
    pub fn apply(&self, classification: &mut Classification, raw: &RawPosting) {
        self.map_family(classification);
        self.enrich_skills(&mut classification.skills);
        self.correct_track_and_seniority(classification, &raw.title);
        self.fill_locations(classification, raw);
        self.fill_working_arrangement(classification, raw);
        self.suppress_compensation(classification, raw);
    }

    fn map_family(&self, classification: &mut Classification) {
        let Some(subfamily) = classification.role.job_subfamily.as_deref() else {
            return;
        };
        let subfamily = subfamily.to_lowercase();
        if subfamily == "out_of_scope" {
            classification.role.job_family = Some("out_of_scope".to_string());
        } else if let Some(family) = self.tables.subfamily_to_family.get(&subfamily) {
            classification.role.job_family = Some(family.clone());
        }
        // Out-of-table subfamilies keep the classifier's family.
    }

    /// Unknown skills keep their name with `family_code = null`; they are
    /// never dropped.
    fn enrich_skills(&self, skills: &mut [Skill]) {
        for skill in skills {
            match self.tables.skills.lookup(&skill.name) {
                Some((canonical, family)) => {
                    skill.name = canonical.to_string();
                    skill.family_code = Some(family.to_string());
                }
                None => {
                    skill.name = skill.name.trim().to_string();
                    skill.family_code = None;
                }
            }
        }
    }

    fn correct_track_and_seniority(&self, classification: &mut Classification, title: &str) {
        let director = has_director_signal(title);
        if classification.role.track.as_deref() == Some("management") && !director {
            classification.role.track = Some("ic".to_string());
        }
        if classification.role.seniority.as_deref() == Some("director_plus") && !director {
            classification.role.seniority = Some(infer_seniority(title).to_string());
        }
    }

    fn fill_locations(&self, classification: &mut Classification, raw: &RawPosting) {
        if classification
            .location
            .locations
            .as_ref()
            .is_some_and(|l| !l.is_empty())
        {
            return;
        }
        classification.location.locations = Some(extract_locations(raw));
    }

    fn fill_working_arrangement(&self, classification: &mut Classification, raw: &RawPosting) {
        let current = classification.location.working_arrangement;
        if current.is_some() && current != Some(WorkingArrangement::Unknown) {
            return;
        }

        let from_hint = arrangement_from_hints(raw);
        if let Some(arrangement) = from_hint {
            classification.location.working_arrangement = Some(arrangement);
            return;
        }

        let remote_listed = classification
            .location
            .locations
            .as_ref()
            .is_some_and(|locations| locations.iter().any(|l| l.kind == LocationKind::Remote));
        classification.location.working_arrangement = Some(if remote_listed {
            WorkingArrangement::Remote
        } else {
            WorkingArrangement::Onsite
        });
    }

    fn suppress_compensation(&self, classification: &mut Classification, raw: &RawPosting) {
        let locations = classification
            .location
            .locations
            .as_deref()
            .unwrap_or(&[]);
        if self
            .suppression
            .applies(raw.source, &raw.location, locations)
        {
            classification.compensation.suppress();
        }
    }
}

/// Structured hint override for an `unknown` classifier arrangement.
fn arrangement_from_hints(raw: &RawPosting) -> Option<WorkingArrangement> {
    if let Some(workplace) = raw.hints.workplace_type.as_deref() {
        match workplace.to_lowercase().as_str() {
            "remote" => return Some(WorkingArrangement::Remote),
            "hybrid" => return Some(WorkingArrangement::Hybrid),
            "onsite" | "on_site" | "on-site" => return Some(WorkingArrangement::Onsite),
            other => {
                if other != "unspecified" {
                    warn!(workplace = other, "unrecognized workplace_type hint");
                }
            }
        }
    }
    match raw.hints.is_remote {
        Some(true) => return Some(WorkingArrangement::Remote),
        Some(false) => return Some(WorkingArrangement::Onsite),
        None => {}
    }
    if raw
        .hints
        .location_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("remote"))
    {
        return Some(WorkingArrangement::Remote);
    }
    None
}

/// Transform the free-form location string (or structured fetcher hints)
/// into the canonical `locations` list. The first entry is the display city.
pub fn extract_locations(raw: &RawPosting) -> Vec<JobLocation> {
    if !raw.hints.locations.is_empty() {
        return raw
            .hints
            .locations
            .iter()
            .map(|structured| {
                let country_code = structured
                    .country
                    .as_deref()
                    .and_then(|c| country_code_for(c).or_else(|| two_letter(c)));
                match &structured.city {
                    Some(city) if !city.is_empty() => JobLocation {
                        kind: LocationKind::City,
                        city: Some(city.clone()),
                        region: structured.region.clone(),
                        country_code,
                        scope: None,
                    },
                    _ => JobLocation {
                        kind: LocationKind::Country,
                        city: None,
                        region: structured.region.clone(),
                        country_code,
                        scope: None,
                    },
                }
            })
            .collect();
    }

    let mut locations = Vec::new();
    for token in raw
        .location
        .split([';', '/', '|', '•', '\n'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let lowered = token.to_lowercase();

        if lowered.contains("remote") {
            let scope = if lowered.contains("global") || lowered.contains("anywhere") {
                RemoteScope::Global
            } else if token_country(token).is_some() {
                RemoteScope::Country
            } else {
                RemoteScope::Global
            };
            locations.push(JobLocation::remote(scope, token_country(token)));
            continue;
        }

        if let Some((city, code)) = known_city(token) {
            locations.push(JobLocation::city(city, Some(code)));
            continue;
        }

        // "City, Country" pattern: first segment is the city; the last one
        // maps to a country only when it names one (state abbreviations do
        // not).
        let mut segments = token.split(',').map(str::trim);
        let Some(city) = segments.next().filter(|c| !c.is_empty()) else {
            continue;
        };
        let country = segments.last().and_then(country_code_for);
        if city.to_lowercase() == "remote" {
            locations.push(JobLocation::remote(RemoteScope::Global, country));
        } else {
            locations.push(JobLocation::city(city.to_string(), country));
        }
    }
    locations
}

fn token_country(token: &str) -> Option<String> {
    token
        .split([',', '-', '(', ')'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .find_map(country_code_for)
}

fn two_letter(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| trimmed.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsweep_core::{SourceHints, StructuredLocation};

    fn tables() -> TaxonomyTables {
        let mut skills = SkillTable::default();
        skills.insert("Python", "programming");
        skills.insert("Spark", "data_processing");
        skills.insert("SQL", "data_querying");
        TaxonomyTables {
            subfamily_to_family: HashMap::from([
                ("data_engineer".to_string(), "data".to_string()),
                ("ml_engineer".to_string(), "data".to_string()),
                ("ai_ml_pm".to_string(), "product".to_string()),
                ("core_pm".to_string(), "product".to_string()),
                ("delivery_manager".to_string(), "delivery".to_string()),
            ]),
            skills,
        }
    }

    fn suppression() -> SuppressionRules {
        SuppressionRules {
            rules: vec![
                SuppressionRule {
                    city_contains: Some("london".into()),
                    source: None,
                },
                SuppressionRule {
                    city_contains: Some("singapore".into()),
                    source: None,
                },
                SuppressionRule {
                    city_contains: None,
                    source: Some("adzuna".into()),
                },
            ],
        }
    }

    fn mapper() -> TaxonomyMapper {
        TaxonomyMapper::new(tables(), suppression())
    }

    fn raw(source: DataSource, location: &str) -> RawPosting {
        RawPosting {
            source,
            posting_url: "https://example.test/job/1".into(),
            source_job_id: None,
            title: "Senior Data Engineer".into(),
            company: "Notion".into(),
            location: location.into(),
            raw_text: "Build pipelines in Python and Spark.".into(),
            city_hint: None,
            content_hash: String::new(),
            hints: SourceHints::default(),
        }
        .seal()
    }

    #[test]
    fn subfamily_drives_family() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.role.job_subfamily = Some("ai_ml_pm".into());
        classification.role.job_family = Some("data".into());
        mapper.apply(&mut classification, &raw(DataSource::Ashby, "Austin, TX"));
        assert_eq!(classification.role.job_family.as_deref(), Some("product"));
    }

    #[test]
    fn out_of_table_subfamily_keeps_classifier_family() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.role.job_subfamily = Some("quant_researcher".into());
        classification.role.job_family = Some("data".into());
        mapper.apply(&mut classification, &raw(DataSource::Ashby, "Austin, TX"));
        assert_eq!(classification.role.job_family.as_deref(), Some("data"));
    }

    #[test]
    fn unknown_skills_keep_name_with_null_family() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.skills = vec![
            Skill {
                name: "python".into(),
                family_code: None,
            },
            Skill {
                name: " Databricks ".into(),
                family_code: None,
            },
        ];
        mapper.apply(&mut classification, &raw(DataSource::Ashby, "Austin, TX"));

        assert_eq!(classification.skills[0].name, "Python");
        assert_eq!(
            classification.skills[0].family_code.as_deref(),
            Some("programming")
        );
        assert_eq!(classification.skills[1].name, "Databricks");
        assert_eq!(classification.skills[1].family_code, None);
    }

    #[test]
    fn skill_duplicates_are_last_write_wins_with_evidence() {
        let mut skills = SkillTable::default();
        skills.insert("Airflow", "data_processing");
        skills.insert("airflow", "orchestration");
        assert_eq!(skills.len(), 1);
        assert_eq!(
            skills.lookup("AIRFLOW").map(|(_, family)| family),
            Some("orchestration")
        );
        assert_eq!(skills.duplicates.len(), 1);
        assert_eq!(skills.duplicates[0].shadowed_family, "data_processing");
    }

    #[test]
    fn management_track_downgrades_without_director_signal() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.role.track = Some("management".into());
        let mut posting = raw(DataSource::Lever, "Austin, TX");
        posting.title = "Senior Programme Manager".into();
        mapper.apply(&mut classification, &posting);
        assert_eq!(classification.role.track.as_deref(), Some("ic"));

        let mut classification = Classification::default();
        classification.role.track = Some("management".into());
        let mut posting = raw(DataSource::Lever, "Austin, TX");
        posting.title = "Director of Data Engineering".into();
        mapper.apply(&mut classification, &posting);
        assert_eq!(classification.role.track.as_deref(), Some("management"));
    }

    #[test]
    fn director_plus_seniority_reinfers_from_title() {
        let mapper = mapper();

        let cases = [
            ("Staff Product Manager", "staff_principal"),
            ("Senior Delivery Manager", "senior"),
            ("Product Manager", "mid"),
        ];
        for (title, expected) in cases {
            let mut classification = Classification::default();
            classification.role.seniority = Some("director_plus".into());
            let mut posting = raw(DataSource::Lever, "Austin, TX");
            posting.title = title.into();
            mapper.apply(&mut classification, &posting);
            assert_eq!(
                classification.role.seniority.as_deref(),
                Some(expected),
                "title: {title}"
            );
        }

        // Genuine director signals keep director_plus.
        for title in ["VP of Product", "CDO - Data Platforms"] {
            let mut classification = Classification::default();
            classification.role.seniority = Some("director_plus".into());
            let mut posting = raw(DataSource::Lever, "Austin, TX");
            posting.title = title.into();
            mapper.apply(&mut classification, &posting);
            assert_eq!(
                classification.role.seniority.as_deref(),
                Some("director_plus"),
                "title: {title}"
            );
        }
    }

    #[test]
    fn locations_extract_from_display_string() {
        let locations = extract_locations(&raw(DataSource::Greenhouse, "London / Remote"));
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].kind, LocationKind::City);
        assert_eq!(locations[0].city.as_deref(), Some("London"));
        assert_eq!(locations[0].country_code.as_deref(), Some("GB"));
        assert_eq!(locations[1].kind, LocationKind::Remote);
    }

    #[test]
    fn structured_hints_win_over_the_display_string() {
        let mut posting = raw(DataSource::Ashby, "somewhere odd");
        posting.hints.locations = vec![StructuredLocation {
            city: Some("London".into()),
            region: None,
            country: Some("UK".into()),
        }];
        let locations = extract_locations(&posting);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].city.as_deref(), Some("London"));
        assert_eq!(locations[0].country_code.as_deref(), Some("GB"));
    }

    #[test]
    fn remote_country_tokens_get_country_scope() {
        let locations = extract_locations(&raw(DataSource::Lever, "Remote - UK"));
        assert_eq!(locations[0].kind, LocationKind::Remote);
        assert_eq!(locations[0].scope, Some(RemoteScope::Country));
        assert_eq!(locations[0].country_code.as_deref(), Some("GB"));
    }

    #[test]
    fn unknown_arrangement_falls_back_to_hint_then_onsite() {
        let mapper = mapper();

        // Lever posting with workplaceType=remote and unknown classifier output.
        let mut classification = Classification::default();
        classification.location.working_arrangement = Some(WorkingArrangement::Unknown);
        let mut posting = raw(DataSource::Lever, "London");
        posting.hints.workplace_type = Some("remote".into());
        mapper.apply(&mut classification, &posting);
        assert_eq!(
            classification.location.working_arrangement,
            Some(WorkingArrangement::Remote)
        );

        // No hints, non-remote location: onsite.
        let mut classification = Classification::default();
        mapper.apply(&mut classification, &raw(DataSource::Greenhouse, "Austin, TX"));
        assert_eq!(
            classification.location.working_arrangement,
            Some(WorkingArrangement::Onsite)
        );

        // Classifier verdict is never overridden when known.
        let mut classification = Classification::default();
        classification.location.working_arrangement = Some(WorkingArrangement::Hybrid);
        let mut posting = raw(DataSource::Lever, "London");
        posting.hints.workplace_type = Some("remote".into());
        mapper.apply(&mut classification, &posting);
        assert_eq!(
            classification.location.working_arrangement,
            Some(WorkingArrangement::Hybrid)
        );
    }

    #[test]
    fn london_compensation_is_suppressed_for_any_source() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.compensation.currency = Some("GBP".into());
        classification.compensation.salary_min = Some(80_000.0);
        classification.compensation.salary_max = Some(110_000.0);
        classification.compensation.equity_eligible = Some(true);
        mapper.apply(&mut classification, &raw(DataSource::Ashby, "London, UK"));

        assert_eq!(classification.compensation.currency, None);
        assert_eq!(classification.compensation.salary_min, None);
        assert_eq!(classification.compensation.salary_max, None);
        // The equity flag is not part of the suppressed triple.
        assert_eq!(classification.compensation.equity_eligible, Some(true));
    }

    #[test]
    fn adzuna_compensation_is_suppressed_everywhere() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.compensation.salary_min = Some(90_000.0);
        mapper.apply(&mut classification, &raw(DataSource::Adzuna, "Denver, CO"));
        assert_eq!(classification.compensation.salary_min, None);
    }

    #[test]
    fn non_suppressed_markets_keep_compensation() {
        let mapper = mapper();
        let mut classification = Classification::default();
        classification.compensation.salary_min = Some(120_000.0);
        classification.compensation.currency = Some("USD".into());
        mapper.apply(&mut classification, &raw(DataSource::Greenhouse, "Denver, CO"));
        assert_eq!(classification.compensation.salary_min, Some(120_000.0));
    }
}
