//! Turning-point detection
//!
//! Local maxima follow the usual peak-finding convention: a sample (or the
//! middle of a flat plateau) strictly above both neighbours. End samples are
//! never turning points.

/// Indices of the peaks and troughs of one series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurningPoints {
    pub peaks: Vec<usize>,
    pub troughs: Vec<usize>,
}

impl TurningPoints {
    /// Locate peaks and troughs independently
    pub fn detect(values: &[f64]) -> Self {
        Self {
            peaks: local_extrema(values, |a, b| a < b),
            troughs: local_extrema(values, |a, b| a > b),
        }
    }

    /// Truncate to equal numbers of peaks and troughs
    pub fn balanced(mut self) -> Self {
        let count = self.peaks.len().min(self.troughs.len());
        self.peaks.truncate(count);
        self.troughs.truncate(count);
        self
    }

    /// All turning points in time order
    pub fn merged(&self) -> Vec<usize> {
        let mut all = Vec::with_capacity(self.peaks.len() + self.troughs.len());
        all.extend_from_slice(&self.peaks);
        all.extend_from_slice(&self.troughs);
        all.sort_unstable();
        all
    }

    pub fn len(&self) -> usize {
        self.peaks.len() + self.troughs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.troughs.is_empty()
    }
}

/// Indices of local maxima
pub fn find_peaks(values: &[f64]) -> Vec<usize> {
    local_extrema(values, |a, b| a < b)
}

/// Indices of local minima
pub fn find_troughs(values: &[f64]) -> Vec<usize> {
    local_extrema(values, |a, b| a > b)
}

// `below(a, b)` is true when `a` lies on the far side of `b` from the
// extremum being sought.
fn local_extrema(values: &[f64], below: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let mut found = Vec::new();
    if values.len() < 3 {
        return found;
    }

    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if below(values[i - 1], values[i]) {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }

            if below(values[ahead], values[i]) {
                let left = i;
                let right = ahead - 1;
                found.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_peaks_and_troughs() {
        let values = [0.0, 1.0, 0.0, -1.0, 0.0, 2.0, 1.0];
        assert_eq!(find_peaks(&values), vec![1, 5]);
        assert_eq!(find_troughs(&values), vec![3]);
    }

    #[test]
    fn test_plateau_reports_midpoint() {
        let values = [0.0, 1.0, 1.0, 1.0, 0.0];
        assert_eq!(find_peaks(&values), vec![2]);

        let values = [0.0, 1.0, 1.0, 0.0];
        assert_eq!(find_peaks(&values), vec![1]);
    }

    #[test]
    fn test_edges_and_shoulders_are_not_extrema() {
        assert!(find_peaks(&[3.0, 2.0, 1.0]).is_empty());
        // Rising shoulder: plateau followed by further rise.
        assert!(find_peaks(&[0.0, 1.0, 1.0, 2.0]).is_empty());
        assert!(find_peaks(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_balanced_truncates_longer_set() {
        let points = TurningPoints {
            peaks: vec![2, 6, 10],
            troughs: vec![4, 8],
        }
        .balanced();
        assert_eq!(points.peaks, vec![2, 6]);
        assert_eq!(points.merged(), vec![2, 4, 6, 8]);
    }
}
