use crate::models::Landmark;
use crate::spectrogram::EnergyGrid;
use std::collections::VecDeque;
use std::iter;
use tracing::debug;

/// Selects locally dominant cells of an energy grid as landmarks
///
/// A cell is a candidate when it is positive and equals the maximum of the
/// `box_size × box_size` neighbourhood around it (cells outside the grid count as
/// zero energy, so borders still yield peaks). Candidates are ranked by energy and
/// capped at a density-based budget.
#[derive(Clone, Debug)]
pub struct PeakExtractor {
    box_size: usize,
    point_efficiency: f64,
}

impl PeakExtractor {
    pub fn new(box_size: usize, point_efficiency: f64) -> Self {
        PeakExtractor {
            box_size: box_size.max(1),
            point_efficiency,
        }
    }

    /// Maximum number of landmarks kept for a grid of the given shape
    ///
    /// A perfectly spaced lattice fits `area / box_size²` points; real peaks cluster,
    /// so only `point_efficiency` of that is kept.
    pub fn peak_budget(&self, height: usize, width: usize) -> usize {
        let area = (height * width) as f64;
        let ideal = area / (self.box_size * self.box_size) as f64;
        (ideal * self.point_efficiency).floor() as usize
    }

    /// Returns landmarks ordered by descending energy
    ///
    /// Equal energies keep row-major scan order.
    pub fn extract(&self, grid: &EnergyGrid) -> Vec<Landmark> {
        if grid.is_empty() {
            return Vec::new();
        }

        let filtered = maximum_filter(grid, self.box_size);
        let mut candidates: Vec<(usize, f64)> = grid
            .cells()
            .iter()
            .zip(&filtered)
            .enumerate()
            .filter(|(_, (value, max))| **value > 0.0 && **value == **max)
            .map(|(idx, (&value, _))| (idx, value))
            .collect();

        let found = candidates.len();
        // Stable sort, so ties stay in scan order
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.peak_budget(grid.height(), grid.width()));

        debug!(
            "Peaks: {} candidates, kept {} on a {}x{} grid",
            found,
            candidates.len(),
            grid.height(),
            grid.width()
        );

        let width = grid.width();
        candidates
            .into_iter()
            .map(|(idx, _)| Landmark {
                freq_bin: idx / width,
                time_bin: idx % width,
            })
            .collect()
    }
}

/// Square maximum filter with zero padding
///
/// The footprint spans `[i - size/2, i - size/2 + size - 1]` on each axis. The box
/// is separable, so rows and columns are filtered in two passes.
fn maximum_filter(grid: &EnergyGrid, size: usize) -> Vec<f64> {
    let (height, width) = (grid.height(), grid.width());
    let cells = grid.cells();

    let mut along_time = vec![0.0; cells.len()];
    let mut line = Vec::with_capacity(width.max(height));
    let mut out = Vec::with_capacity(width.max(height));

    for (row, filtered) in cells.chunks(width).zip(along_time.chunks_mut(width)) {
        sliding_max(row, size, &mut out);
        filtered.copy_from_slice(&out);
    }

    let mut result = vec![0.0; cells.len()];
    for t in 0..width {
        line.clear();
        line.extend((0..height).map(|f| along_time[f * width + t]));
        sliding_max(&line, size, &mut out);
        for (f, &value) in out.iter().enumerate() {
            result[f * width + t] = value;
        }
    }
    result
}

/// One-dimensional running maximum over a zero-padded line (monotonic deque)
fn sliding_max(line: &[f64], size: usize, out: &mut Vec<f64>) {
    let before = size / 2;
    let after = size - 1 - before;
    let padded: Vec<f64> = iter::repeat(0.0)
        .take(before)
        .chain(line.iter().copied())
        .chain(iter::repeat(0.0).take(after))
        .collect();

    out.clear();
    let mut window: VecDeque<usize> = VecDeque::with_capacity(size);
    for (i, &value) in padded.iter().enumerate() {
        while window.back().is_some_and(|&j| padded[j] <= value) {
            window.pop_back();
        }
        window.push_back(i);
        if window.front().is_some_and(|&j| j + size <= i) {
            window.pop_front();
        }
        if i + 1 >= size {
            out.push(padded[window[0]]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(freq_bin: usize, time_bin: usize) -> Landmark {
        Landmark { freq_bin, time_bin }
    }

    #[test]
    fn single_hot_cell_is_the_only_landmark() {
        let mut grid = EnergyGrid::zeros(10, 10);
        grid.set(3, 3, 5.0);

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(3, 3)]);
    }

    #[test]
    fn neighbours_inside_the_box_are_suppressed() {
        let mut grid = EnergyGrid::zeros(10, 10);
        grid.set(4, 4, 9.0);
        grid.set(5, 5, 8.0); // inside the 3x3 box of (4, 4)
        grid.set(4, 7, 7.0); // outside it

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(4, 4), lm(4, 7)]);
    }

    #[test]
    fn border_cells_can_be_peaks() {
        let mut grid = EnergyGrid::zeros(6, 6);
        grid.set(0, 0, 2.0);
        grid.set(5, 5, 3.0);

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(5, 5), lm(0, 0)]);
    }

    #[test]
    fn equal_energies_keep_scan_order() {
        let mut grid = EnergyGrid::zeros(9, 9);
        grid.set(6, 1, 4.0);
        grid.set(1, 6, 4.0);
        grid.set(1, 1, 4.0);

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(1, 1), lm(1, 6), lm(6, 1)]);
    }

    #[test]
    fn plateau_cells_all_count_as_peaks() {
        let grid = EnergyGrid::from_rows(vec![
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ])
        .unwrap();

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(1, 1), lm(1, 2)]);
    }

    #[test]
    fn even_box_footprint_leans_backwards() {
        // With size 2 each cell is compared with itself and the previous row/column
        let grid = EnergyGrid::from_rows(vec![vec![1.0, 2.0, 1.0, 0.0], vec![0.0; 4]]).unwrap();

        let peaks = PeakExtractor::new(2, 1.0).extract(&grid);
        assert_eq!(peaks, vec![lm(0, 1), lm(0, 0)]);
    }

    #[test]
    fn landmark_count_respects_the_budget() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|f| {
                (0..60)
                    .map(|t| (((f * 31 + t * 17) * 7919) % 1009) as f64 + 1.0)
                    .collect()
            })
            .collect();
        let grid = EnergyGrid::from_rows(rows).unwrap();

        for (box_size, efficiency) in [(3, 1.0), (5, 0.8), (10, 0.5), (30, 0.8)] {
            let extractor = PeakExtractor::new(box_size, efficiency);
            let ideal = 40.0 * 60.0 / (box_size * box_size) as f64;
            let budget = (ideal * efficiency).floor() as usize;
            assert_eq!(extractor.peak_budget(40, 60), budget);
            assert!(extractor.extract(&grid).len() <= budget);
        }
    }

    #[test]
    fn peaks_are_sorted_by_descending_energy() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|f| (0..20).map(|t| ((f * 13 + t * 29) % 37) as f64).collect())
            .collect();
        let grid = EnergyGrid::from_rows(rows).unwrap();

        let peaks = PeakExtractor::new(3, 1.0).extract(&grid);
        assert!(!peaks.is_empty());
        let energies: Vec<f64> = peaks
            .iter()
            .map(|p| grid.get(p.freq_bin, p.time_bin))
            .collect();
        assert!(energies.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn empty_grid_has_no_peaks() {
        let grid = EnergyGrid::zeros(401, 0);
        assert!(PeakExtractor::new(30, 0.8).extract(&grid).is_empty());
    }

    #[test]
    fn sliding_max_pads_with_zero() {
        let mut out = Vec::new();
        sliding_max(&[-1.0, -3.0, -2.0], 3, &mut out);
        assert_eq!(out, vec![0.0, -1.0, 0.0]);
    }
}
