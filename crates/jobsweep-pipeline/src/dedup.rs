//! Cross-source deduplication keyed by the normalized
//! `(company, title, location)` digest.
//!
//! Direct-ATS descriptions win by default; the aggregator side takes over
//! only when its description is at least 1.2× longer. The losing variant is
//! kept on the winner for audit.

use std::collections::BTreeMap;
use std::collections::HashMap;

use jobsweep_core::{digest, DataSource, RawPosting};
use serde::Serialize;

const DESCRIPTION_SWAP_RATIO: f64 = 1.2;

/// One posting after the merge, with provenance of its description.
#[derive(Debug, Clone)]
pub struct MergedPosting {
    pub posting: RawPosting,
    pub description_source: DataSource,
    pub deduplicated: bool,
    /// Direct-source description when the aggregator variant won.
    pub direct_description: Option<String>,
    /// Aggregator description when the direct variant won.
    pub aggregator_description: Option<String>,
}

impl MergedPosting {
    fn single(posting: RawPosting) -> Self {
        let description_source = posting.source;
        Self {
            posting,
            description_source,
            deduplicated: false,
            direct_description: None,
            aggregator_description: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    pub direct_input: usize,
    pub aggregator_input: usize,
    pub total_merged: usize,
    pub direct_only: usize,
    pub aggregator_only: usize,
    pub deduplicated: usize,
    /// Share of all input rows that collided, in percent.
    pub dedup_rate: f64,
    pub avg_description_length: usize,
    /// Final description counts per source.
    pub description_breakdown: BTreeMap<String, usize>,
}

/// Merge an aggregator batch into a direct-ATS batch.
pub fn merge_batches(
    direct: Vec<RawPosting>,
    aggregator: Vec<RawPosting>,
) -> (Vec<MergedPosting>, MergeStats) {
    let mut stats = MergeStats {
        direct_input: direct.len(),
        aggregator_input: aggregator.len(),
        ..MergeStats::default()
    };

    let mut merged: Vec<MergedPosting> = Vec::with_capacity(direct.len() + aggregator.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for posting in direct {
        let key = digest::dedup_key(&posting.company, &posting.title, &posting.location);
        // Within-source collisions keep the first sighting.
        if by_key.contains_key(&key) {
            continue;
        }
        by_key.insert(key, merged.len());
        merged.push(MergedPosting::single(posting));
    }

    for posting in aggregator {
        let key = digest::dedup_key(&posting.company, &posting.title, &posting.location);
        match by_key.get(&key) {
            None => {
                by_key.insert(key, merged.len());
                merged.push(MergedPosting::single(posting));
            }
            Some(&index) => {
                let existing = &mut merged[index];
                let existing_len = existing.posting.raw_text.len() as f64;
                let incoming_len = posting.raw_text.len() as f64;

                if incoming_len > existing_len * DESCRIPTION_SWAP_RATIO {
                    // The aggregator variant is substantially richer.
                    existing.direct_description = Some(existing.posting.raw_text.clone());
                    existing.posting.raw_text = posting.raw_text;
                    existing.posting.content_hash = digest::content_hash(
                        &existing.posting.title,
                        &existing.posting.raw_text,
                    );
                    existing.description_source = posting.source;
                } else {
                    existing.aggregator_description = Some(posting.raw_text);
                }
                existing.deduplicated = true;
            }
        }
    }

    for entry in &merged {
        if entry.deduplicated {
            stats.deduplicated += 1;
        } else if entry.posting.source.is_aggregator() {
            stats.aggregator_only += 1;
        } else {
            stats.direct_only += 1;
        }
        *stats
            .description_breakdown
            .entry(entry.description_source.as_str().to_string())
            .or_default() += 1;
    }

    stats.total_merged = merged.len();
    let inputs = stats.direct_input + stats.aggregator_input;
    if inputs > 0 {
        stats.dedup_rate = 100.0 * stats.deduplicated as f64 / inputs as f64;
    }
    if !merged.is_empty() {
        stats.avg_description_length = merged
            .iter()
            .map(|entry| entry.posting.raw_text.len())
            .sum::<usize>()
            / merged.len();
    }

    (merged, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsweep_core::SourceHints;

    fn posting(source: DataSource, company: &str, title: &str, text: &str) -> RawPosting {
        RawPosting {
            source,
            posting_url: format!(
                "https://{}.example/{}/{}",
                source.as_str(),
                company.to_lowercase(),
                title.to_lowercase().replace(' ', "-")
            ),
            source_job_id: None,
            title: title.into(),
            company: company.into(),
            location: "London, UK".into(),
            raw_text: text.into(),
            city_hint: None,
            content_hash: String::new(),
            hints: SourceHints::default(),
        }
        .seal()
    }

    #[test]
    fn disjoint_batches_pass_through() {
        let direct = vec![posting(
            DataSource::Greenhouse,
            "Figma",
            "Data Engineer",
            "Long direct description of the role.",
        )];
        let aggregator = vec![posting(
            DataSource::Adzuna,
            "Monzo",
            "Product Manager",
            "Short excerpt.",
        )];
        let (merged, stats) = merge_batches(direct, aggregator);

        assert_eq!(merged.len(), 2);
        assert_eq!(stats.direct_only, 1);
        assert_eq!(stats.aggregator_only, 1);
        assert_eq!(stats.deduplicated, 0);
        assert_eq!(stats.dedup_rate, 0.0);
    }

    #[test]
    fn collisions_keep_the_richer_direct_description() {
        let direct_text = "A very long and complete direct description of the position.";
        let direct = vec![posting(
            DataSource::Greenhouse,
            "Figma",
            "Data Engineer",
            direct_text,
        )];
        let aggregator = vec![posting(
            DataSource::Adzuna,
            "figma",
            "data engineer",
            "Short excerpt.",
        )];
        let (merged, stats) = merge_batches(direct, aggregator);

        assert_eq!(merged.len(), 1);
        let winner = &merged[0];
        assert!(winner.deduplicated);
        assert_eq!(winner.posting.source, DataSource::Greenhouse);
        assert_eq!(winner.description_source, DataSource::Greenhouse);
        assert_eq!(winner.posting.raw_text, direct_text);
        assert_eq!(
            winner.aggregator_description.as_deref(),
            Some("Short excerpt.")
        );
        assert_eq!(stats.deduplicated, 1);
        assert!(stats.dedup_rate > 0.0);
    }

    #[test]
    fn aggregator_wins_when_twenty_percent_longer() {
        let direct = vec![posting(
            DataSource::Greenhouse,
            "Figma",
            "Data Engineer",
            "Tiny direct text.",
        )];
        let long_text =
            "An unusually detailed aggregator description that is much longer than the board's.";
        let aggregator = vec![posting(
            DataSource::Adzuna,
            "Figma",
            "Data Engineer",
            long_text,
        )];
        let (merged, _) = merge_batches(direct, aggregator);

        let winner = &merged[0];
        assert_eq!(winner.description_source, DataSource::Adzuna);
        assert_eq!(winner.posting.raw_text, long_text);
        assert_eq!(winner.direct_description.as_deref(), Some("Tiny direct text."));
        // Winner keeps the direct source identity but re-hashes new text.
        assert_eq!(winner.posting.source, DataSource::Greenhouse);
        assert_eq!(
            winner.posting.content_hash,
            jobsweep_core::digest::content_hash("Data Engineer", long_text)
        );
    }

    #[test]
    fn breakdown_counts_description_sources() {
        let direct = vec![
            posting(DataSource::Greenhouse, "Figma", "Data Engineer", "Long A."),
            posting(DataSource::Lever, "Wise", "Data Scientist", "Long B."),
        ];
        let aggregator = vec![posting(DataSource::Adzuna, "Monzo", "PM", "C.")];
        let (_, stats) = merge_batches(direct, aggregator);
        assert_eq!(stats.description_breakdown.get("greenhouse"), Some(&1));
        assert_eq!(stats.description_breakdown.get("lever"), Some(&1));
        assert_eq!(stats.description_breakdown.get("adzuna"), Some(&1));
        assert!(stats.avg_description_length > 0);
    }
}
