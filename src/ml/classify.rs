/// Column classifier: scores upload columns for "is this a time axis".
/// Pure and deterministic; the caller falls back to the first column when no
/// candidate scores above zero.
use std::collections::HashMap;

use crate::ml::preprocess::parse_timestamp;
use crate::models::TimeCandidate;

const TIME_KEYWORDS: &[&str] = &["date", "time", "timestamp", "period", "year", "month", "day"];

/// Base score for a column whose name contains a temporal keyword.
const KEYWORD_SCORE: f64 = 0.4;
/// Maximum additional score from sampled-value parseability.
const PARSE_SCORE: f64 = 0.6;

pub fn classify(columns: &[String], sample_rows: &[HashMap<String, String>]) -> Vec<TimeCandidate> {
    let mut candidates = Vec::new();

    for column in columns {
        let mut score = 0.0;

        let name = column.to_lowercase();
        if TIME_KEYWORDS.iter().any(|k| name.contains(k)) {
            score += KEYWORD_SCORE;
        }

        let values: Vec<&str> = sample_rows
            .iter()
            .filter_map(|row| row.get(column))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            let parsed = values
                .iter()
                .filter(|v| parse_timestamp(v).is_some())
                .count();
            score += PARSE_SCORE * parsed as f64 / values.len() as f64;
        }

        let score = (score * 100.0).round() / 100.0;
        if score > 0.0 {
            candidates.push(TimeCandidate {
                column: column.clone(),
                score,
            });
        }
    }

    // Stable sort keeps column order for equal scores, so output is
    // deterministic for identical input.
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[(&str, &str)]) -> Vec<HashMap<String, String>> {
        // one column per entry, three identical sample rows
        (0..3)
            .map(|_| {
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn date_column_ranks_first() {
        let columns = vec!["sales".to_string(), "date".to_string()];
        let sample = rows(&[("sales", "120.5"), ("date", "2024-03-01")]);

        let candidates = classify(&columns, &sample);
        assert_eq!(candidates[0].column, "date");
        assert!(candidates[0].score > 0.9);
    }

    #[test]
    fn parseable_values_score_without_keyword() {
        let columns = vec!["recorded".to_string()];
        let sample = rows(&[("recorded", "2024-03-01T10:00:00")]);

        let candidates = classify(&columns, &sample);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn keyword_alone_scores_low_but_nonzero() {
        let columns = vec!["day_of_week".to_string()];
        let sample = rows(&[("day_of_week", "Mon")]);

        let candidates = classify(&columns, &sample);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn unparseable_columns_are_omitted() {
        let columns = vec!["region".to_string(), "sales".to_string()];
        let sample = rows(&[("region", "emea"), ("sales", "ten")]);

        assert!(classify(&columns, &sample).is_empty());
    }

    #[test]
    fn deterministic_for_identical_input() {
        let columns = vec!["date".to_string(), "created_time".to_string()];
        let sample = rows(&[("date", "2024-03-01"), ("created_time", "2024-03-01")]);

        let a = classify(&columns, &sample);
        let b = classify(&columns, &sample);
        assert_eq!(a, b);
        // equal scores keep column order
        assert_eq!(a[0].column, "date");
    }

    #[test]
    fn never_fails_on_empty_input() {
        assert!(classify(&[], &[]).is_empty());
    }
}
