use crate::pronunciation::{PronunciationError, Result};

use super::Alignment;

/// Maps both sequences onto `max(len1, len2)` evenly spaced positions, taking the
/// nearest frame of each, and sums the distances index by index.
pub fn align_point_by_point<T>(
    seq1: &[T],
    seq2: &[T],
    distance: impl Fn(&T, &T) -> f64,
) -> Result<Alignment> {
    let (n, m) = (seq1.len(), seq2.len());
    if n == 0 || m == 0 {
        return Err(PronunciationError::EmptySequence);
    }
    let len = n.max(m);
    let path: Vec<(usize, usize)> = (0..len)
        .map(|k| (nearest_index(k, len, n), nearest_index(k, len, m)))
        .collect();
    let distance: f64 = path
        .iter()
        .map(|&(i, j)| distance(&seq1[i], &seq2[j]))
        .sum();
    Ok(Alignment {
        distance,
        normalized_distance: distance / (n + m) as f64,
        path,
    })
}

fn nearest_index(position: usize, len: usize, target_len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let scaled = position as f64 * (target_len - 1) as f64 / (len - 1) as f64;
    (scaled.round() as usize).min(target_len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretches_shorter_sequence_across_longer() {
        let alignment =
            align_point_by_point(&[0.0, 1.0], &[0.0, 0.5, 1.0, 1.0, 1.0], |a: &f64, b: &f64| {
                (a - b).abs()
            })
            .unwrap();
        assert_eq!(alignment.path, vec![(0, 0), (0, 1), (1, 2), (1, 3), (1, 4)]);
        assert!((alignment.distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_empty_sequences() {
        let empty: [f64; 0] = [];
        assert_eq!(
            align_point_by_point(&empty, &[1.0], |a, b| a - b),
            Err(PronunciationError::EmptySequence)
        );
    }
}
