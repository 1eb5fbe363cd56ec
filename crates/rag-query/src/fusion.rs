//! Reciprocal Rank Fusion (RRF) for combining vector and lexical rankings.

use std::collections::HashMap;

use rag_core::{FusedDocument, Metadata};

/// Default RRF constant.
/// Higher values flatten the difference between neighbouring ranks.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// One entry of a ranked input list, best first.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub text: &'a str,
    pub metadata: &'a Metadata,
}

/// Fuse a vector ranking and a lexical ranking with weighted RRF.
///
/// A vector entry at rank `r` (0-indexed) contributes `alpha / (r + rrf_k)`,
/// a lexical entry at rank `r` contributes `(1 - alpha) / (r + rrf_k)`.
/// Entries are keyed by literal text: identical texts from either list
/// collapse into one result carrying the metadata of its first occurrence.
///
/// Results are sorted by fused score descending; equal scores keep
/// first-seen order (vector list first). At most `k` results are returned.
pub fn hybrid_rrf(
    vector: &[Ranked<'_>],
    lexical: &[Ranked<'_>],
    alpha: f32,
    rrf_k: f32,
    k: usize,
) -> Vec<FusedDocument> {
    let mut fused: Vec<FusedDocument> = Vec::with_capacity(vector.len() + lexical.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    let weighted = [(vector, alpha), (lexical, 1.0 - alpha)];
    for (list, weight) in weighted {
        for (rank, entry) in list.iter().enumerate() {
            let contribution = weight / (rank as f32 + rrf_k);
            match positions.get(entry.text) {
                Some(&position) => fused[position].score += contribution,
                None => {
                    positions.insert(entry.text, fused.len());
                    fused.push(FusedDocument {
                        text: entry.text.to_string(),
                        metadata: entry.metadata.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // sort_by is stable
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(filename: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("filename".to_string(), json!(filename));
        m
    }

    fn ranked<'a>(items: &'a [(&'a str, Metadata)]) -> Vec<Ranked<'a>> {
        items
            .iter()
            .map(|(text, metadata)| Ranked { text, metadata })
            .collect()
    }

    fn texts(fused: &[FusedDocument]) -> Vec<&str> {
        fused.iter().map(|d| d.text.as_str()).collect()
    }

    #[test]
    fn test_rrf_single_list() {
        let vector = [("a", meta("x")), ("b", meta("x")), ("c", meta("x"))];
        let fused = hybrid_rrf(&ranked(&vector), &[], 1.0, DEFAULT_RRF_K, 10);

        assert_eq!(texts(&fused), vec!["a", "b", "c"]);
        assert!((fused[0].score - 1.0 / 60.0).abs() < 1e-7);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_sums_shared_documents() {
        let vector = [("a", meta("v")), ("b", meta("v")), ("c", meta("v"))];
        let lexical = [("b", meta("l")), ("a", meta("l")), ("d", meta("l"))];
        let fused = hybrid_rrf(&ranked(&vector), &ranked(&lexical), 0.5, 60.0, 10);

        // a: .5/60 + .5/61, b: .5/61 + .5/60 -> tie, a first seen
        assert_eq!(texts(&fused), vec!["a", "b", "c", "d"]);
        assert!((fused[0].score - fused[1].score).abs() < 1e-7);
        assert_eq!(fused[1].metadata.get("filename"), Some(&json!("v")));
        assert!((fused[3].score - 0.5 / 62.0).abs() < 1e-7);
    }

    #[test]
    fn test_alpha_weights_lists() {
        let vector = [("v", meta("x"))];
        let lexical = [("l", meta("x"))];

        let fused = hybrid_rrf(&ranked(&vector), &ranked(&lexical), 0.7, 60.0, 2);
        assert_eq!(texts(&fused), vec!["v", "l"]);

        let fused = hybrid_rrf(&ranked(&vector), &ranked(&lexical), 0.3, 60.0, 2);
        assert_eq!(texts(&fused), vec!["l", "v"]);
    }

    #[test]
    fn test_lexical_only_entry_created() {
        let lexical = [("only lexical", meta("doc2"))];
        let fused = hybrid_rrf(&[], &ranked(&lexical), 0.0, 60.0, 5);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].filename(), Some("doc2"));
    }

    #[test]
    fn test_rrf_truncation() {
        let vector = [
            ("a", meta("x")),
            ("b", meta("x")),
            ("c", meta("x")),
            ("d", meta("x")),
        ];
        let fused = hybrid_rrf(&ranked(&vector), &[], 1.0, 60.0, 2);
        assert_eq!(texts(&fused), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(hybrid_rrf(&[], &[], 0.7, 60.0, 5).is_empty());
    }
}
