//! Heatmap merging
//!
//! Folds one visit's cell samples into a day's heatmap and, when the union
//! outgrows the slot capacity, keeps only the most relevant cells. Relevance
//! blends absolute intensity with intensity per visit so that a cell hit hard
//! by a few visitors can outrank one brushed lightly by many.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::config::HeatmapConfig;
use crate::types::{HeatmapCell, HeatmapUpdate, PortfolioHeatmap};

/// Heatmap merger parameterised by relevance weights
#[derive(Debug, Clone, Copy)]
pub struct HeatmapMerger {
    intensity_weight: f64,
    ratio_weight: f64,
}

impl Default for HeatmapMerger {
    fn default() -> Self {
        Self::from_config(&HeatmapConfig::default())
    }
}

/// Candidate cell in the bounded heap.
///
/// Ordered so that the heap's maximum is the weakest cell: lowest score
/// first, and among equal scores the one that arrived last.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f64,
    seq: usize,
    cell: HeatmapCell,
}

impl Ranked {
    fn strength(&self) -> (f64, Reverse<usize>) {
        (self.score, Reverse(self.seq))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so BinaryHeap pops the weakest cell first.
        let (a_score, a_seq) = self.strength();
        let (b_score, b_seq) = other.strength();
        b_score.total_cmp(&a_score).then(b_seq.cmp(&a_seq))
    }
}

impl HeatmapMerger {
    pub fn new(intensity_weight: f64, ratio_weight: f64) -> Self {
        Self {
            intensity_weight,
            ratio_weight,
        }
    }

    pub fn from_config(config: &HeatmapConfig) -> Self {
        Self::new(config.intensity_weight, config.ratio_weight)
    }

    /// Merge `incoming` into `existing`, keeping at most `max_cells` cells.
    ///
    /// Every incoming sample counts as one visit. Metadata is taken from
    /// `incoming`. When nothing has to be evicted the union keeps existing
    /// order with new cells appended; otherwise survivors are returned by
    /// descending relevance.
    pub fn merge(
        &self,
        existing: &PortfolioHeatmap,
        incoming: &HeatmapUpdate,
        max_cells: usize,
    ) -> PortfolioHeatmap {
        let cells = union_cells(&existing.cells, incoming);
        let total = cells.len();

        let cells = if total <= max_cells {
            cells
        } else {
            let kept = self.top_cells(cells, max_cells);
            log::debug!("heatmap trimmed from {} to {} cells", total, kept.len());
            kept
        };

        PortfolioHeatmap {
            version: incoming.version.clone(),
            columns: incoming.columns,
            cells,
        }
    }

    /// Composite relevance of every cell, in input order
    pub fn scores(&self, cells: &[HeatmapCell]) -> Vec<f64> {
        let max_value = cells.iter().map(|c| c.value).max().unwrap_or(0).max(1) as f64;
        let max_ratio = cells
            .iter()
            .map(visit_ratio)
            .fold(0.0_f64, f64::max)
            .max(1.0);

        cells
            .iter()
            .map(|cell| {
                self.intensity_weight * (cell.value as f64 / max_value)
                    + self.ratio_weight * (visit_ratio(cell) / max_ratio)
            })
            .collect()
    }

    fn top_cells(&self, cells: Vec<HeatmapCell>, k: usize) -> Vec<HeatmapCell> {
        if k == 0 {
            return Vec::new();
        }

        let scores = self.scores(&cells);
        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k + 1);

        for (seq, (cell, score)) in cells.into_iter().zip(scores).enumerate() {
            let candidate = Ranked { score, seq, cell };
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(weakest) = heap.peek() {
                // Candidate must beat the weakest kept cell; ties favour the earlier one.
                if candidate < *weakest {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        // Ascending under the reversed ordering = strongest first.
        heap.into_sorted_vec().into_iter().map(|r| r.cell).collect()
    }
}

fn visit_ratio(cell: &HeatmapCell) -> f64 {
    cell.value as f64 / cell.count.max(1) as f64
}

/// Union by index: existing cells keep their order, new ones are appended in
/// arrival order, and collisions sum value and count.
fn union_cells(existing: &[HeatmapCell], incoming: &HeatmapUpdate) -> Vec<HeatmapCell> {
    let mut cells = existing.to_vec();
    let mut position: HashMap<u32, usize> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| (cell.index, i))
        .collect();

    for sample in &incoming.cells {
        match position.get(&sample.index) {
            Some(&i) => {
                let cell = &mut cells[i];
                cell.value = cell.value.saturating_add(sample.value);
                cell.count = cell.count.saturating_add(1);
            }
            None => {
                position.insert(sample.index, cells.len());
                cells.push(HeatmapCell {
                    index: sample.index,
                    value: sample.value,
                    count: 1,
                });
            }
        }
    }

    cells
}
