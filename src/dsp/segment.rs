/// The onset pair `(a, b)` with `a < position_ms <= b`.
pub fn find_segment(onsets: &[f64], position_ms: f64) -> Option<(f64, f64)> {
    onsets
        .windows(2)
        .find(|w| w[0] < position_ms && position_ms <= w[1])
        .map(|w| (w[0], w[1]))
}

/// Consecutive onset pairs.
pub fn segments(onsets: &[f64]) -> Vec<(f64, f64)> {
    onsets.windows(2).map(|w| (w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_enclosing_pair() {
        let onsets = [0.0, 250.0, 900.0, 2000.0];
        assert_eq!(find_segment(&onsets, 100.0), Some((0.0, 250.0)));
        assert_eq!(find_segment(&onsets, 250.0), Some((0.0, 250.0)));
        assert_eq!(find_segment(&onsets, 250.5), Some((250.0, 900.0)));
        assert_eq!(find_segment(&onsets, 2000.0), Some((900.0, 2000.0)));
    }

    #[test]
    fn outside_or_empty_is_none() {
        let onsets = [0.0, 250.0, 900.0];
        assert_eq!(find_segment(&onsets, 0.0), None);
        assert_eq!(find_segment(&onsets, 901.0), None);
        assert_eq!(find_segment(&[], 10.0), None);
        assert_eq!(find_segment(&[0.0], 0.0), None);
    }

    #[test]
    fn pairs_consecutive_onsets() {
        assert_eq!(
            segments(&[0.0, 10.0, 30.0]),
            vec![(0.0, 10.0), (10.0, 30.0)]
        );
        assert!(segments(&[0.0]).is_empty());
    }
}
