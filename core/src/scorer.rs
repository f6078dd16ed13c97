//! TF-IDF weighting: `tf * ln(N / df)`, no smoothing.

/// `ln(corpus_size / document_frequency)`, or 0 when the term is in no document.
pub fn idf(document_frequency: u32, corpus_size: u32) -> f64 {
    if document_frequency == 0 || corpus_size == 0 {
        return 0.0;
    }
    (corpus_size as f64 / document_frequency as f64).ln()
}

pub fn tfidf(term_frequency: u32, document_frequency: u32, corpus_size: u32) -> f64 {
    term_frequency as f64 * idf(document_frequency, corpus_size)
}

/// Rounds a score to 4 decimals for external consumption.
pub fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_is_zero_for_ubiquitous_terms() {
        assert_eq!(idf(10, 10), 0.0);
        assert_eq!(tfidf(3, 10, 10), 0.0);
    }

    #[test]
    fn idf_is_zero_without_documents() {
        assert_eq!(idf(0, 10), 0.0);
        assert_eq!(idf(0, 0), 0.0);
    }

    #[test]
    fn tfidf_scales_linearly_with_tf() {
        let one = tfidf(1, 1, 4);
        assert!((one - 4f64.ln()).abs() < 1e-12);
        assert!((tfidf(3, 1, 4) - 3.0 * one).abs() < 1e-12);
    }

    #[test]
    fn idf_is_non_negative_when_df_within_corpus() {
        for n in 1..50u32 {
            for df in 1..=n {
                assert!(idf(df, n) >= 0.0);
            }
        }
    }

    #[test]
    fn rounding_to_four_places() {
        assert_eq!(round4(0.405_465_108), 0.4055);
        assert_eq!(round4(1.0), 1.0);
    }
}
