//! Exact-greedy regression trees.
//!
//! The builder works on per-row gradients and hessians, so one implementation
//! serves both the standalone decision tree (gradient `-y`, hessian `1`, no
//! regularisation: leaves hold the positive fraction and the gain is the
//! variance reduction, which ranks splits exactly like Gini on a binary label)
//! and every boosting round of the gradient-boosted ensemble.

use serde::{Deserialize, Serialize};

use crate::domain::Label;
use crate::error::AppError;

use super::learner::{Classifier, check_training_set};

/// Gains at or below this are treated as "no split".
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `row[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Flat node storage; the root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Highest column index any split reads; `None` for a single leaf.
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }
}

/// Row indices sorted by each column, computed once and shared by every tree
/// grown on the same rows.
pub struct SortedColumns {
    order: Vec<Vec<usize>>,
}

impl SortedColumns {
    pub fn new(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let order = (0..width)
            .map(|j| {
                let mut idx: Vec<usize> = (0..rows.len()).collect();
                idx.sort_by(|&a, &b| {
                    rows[a][j]
                        .partial_cmp(&rows[b][j])
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.cmp(&b))
                });
                idx
            })
            .collect();
        Self { order }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree from gradient statistics.
pub struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    sorted: &'a SortedColumns,
    params: TreeParams,
    lambda: f64,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        rows: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        sorted: &'a SortedColumns,
        params: TreeParams,
        lambda: f64,
    ) -> Self {
        Self {
            rows,
            gradients,
            hessians,
            sorted,
            params,
            lambda,
        }
    }

    pub fn build(&self) -> RegressionTree {
        let mut nodes = Vec::new();
        let mut member = vec![true; self.rows.len()];
        let all: Vec<usize> = (0..self.rows.len()).collect();
        self.build_node(&all, &mut member, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.lambda;
        if denom > 0.0 { -g / denom } else { 0.0 }
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.lambda;
        if denom > 0.0 { g * g / denom } else { 0.0 }
    }

    /// `member` flags the rows of this node; it is restored before returning.
    fn build_node(&self, indices: &[usize], member: &mut [bool], depth: usize, nodes: &mut Vec<Node>) -> usize {
        let current = nodes.len();
        let g: f64 = indices.iter().map(|&i| self.gradients[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        let leaf = Node::Leaf {
            value: self.leaf_value(g, h),
        };

        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth || indices.len() < 2 * min_leaf {
            nodes.push(leaf);
            return current;
        }

        let Some(split) = self.find_best_split(indices, member, g, h) else {
            nodes.push(leaf);
            return current;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);

        // Reserve the slot; children are filled in once built.
        nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });

        for &i in &right {
            member[i] = false;
        }
        let left_idx = self.build_node(&left, member, depth + 1, nodes);
        for &i in &right {
            member[i] = true;
        }
        for &i in &left {
            member[i] = false;
        }
        let right_idx = self.build_node(&right, member, depth + 1, nodes);
        for &i in &left {
            member[i] = true;
        }

        if let Node::Split { left, right, .. } = &mut nodes[current] {
            *left = left_idx;
            *right = right_idx;
        }
        current
    }

    /// Sweeps every column in presorted order. Ties keep the earliest
    /// (feature, threshold) candidate.
    fn find_best_split(&self, indices: &[usize], member: &[bool], g: f64, h: f64) -> Option<Split> {
        let parent = self.score(g, h);
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;

        for (feature, order) in self.sorted.order.iter().enumerate() {
            let mut gl = 0.0;
            let mut hl = 0.0;
            let mut count = 0;
            let mut prev: Option<usize> = None;

            for &i in order.iter().filter(|&&i| member[i]) {
                if let Some(p) = prev {
                    let (a, b) = (self.rows[p][feature], self.rows[i][feature]);
                    if count >= min_leaf && n - count >= min_leaf && a < b {
                        let gain = self.score(gl, hl) + self.score(g - gl, h - hl) - parent;
                        if gain > MIN_GAIN && best.as_ref().is_none_or(|s| gain > s.gain) {
                            best = Some(Split {
                                feature,
                                threshold: a + (b - a) / 2.0,
                                gain,
                            });
                        }
                    }
                }
                gl += self.gradients[i];
                hl += self.hessians[i];
                count += 1;
                prev = Some(i);
            }
        }
        best
    }
}

/// A single CART classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub params: TreeParams,
    pub tree: RegressionTree,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            tree: RegressionTree { nodes: Vec::new() },
        }
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError> {
        check_training_set(rows, labels)?;
        let gradients: Vec<f64> = labels.iter().map(|&l| -f64::from(l)).collect();
        let hessians = vec![1.0; rows.len()];
        let sorted = SortedColumns::new(rows);
        self.tree = TreeBuilder::new(rows, &gradients, &hessians, &sorted, self.params, 0.0).build();
        tracing::debug!(
            depth = self.tree.depth(),
            leaves = self.tree.leaf_count(),
            "grew decision tree"
        );
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.tree.predict(row).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_an_axis_aligned_rule() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels: Vec<Label> = (0..40).map(|i| u8::from(i >= 25)).collect();

        let mut tree = DecisionTree::new(TreeParams::default());
        tree.fit(&rows, &labels).unwrap();

        assert_eq!(tree.predict_proba(&[3.0, 0.0]), 0.0);
        assert_eq!(tree.predict_proba(&[30.0, 0.0]), 1.0);
        assert_eq!(tree.tree.max_feature(), Some(0));
        match &tree.tree.nodes[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 24.5);
            }
            other => panic!("expected a split at the root, got {other:?}"),
        }
    }

    #[test]
    fn respects_depth_and_leaf_size() {
        let rows: Vec<Vec<f64>> = (0..200).map(|i| vec![(i * 37 % 200) as f64]).collect();
        let labels: Vec<Label> = (0..200).map(|i| ((i * 37 % 200) % 2) as u8).collect();
        let params = TreeParams {
            max_depth: 3,
            min_samples_leaf: 10,
        };

        let mut tree = DecisionTree::new(params);
        tree.fit(&rows, &labels).unwrap();
        assert!(tree.tree.depth() <= 3);

        let mut counts = vec![0usize; tree.tree.nodes.len()];
        for r in &rows {
            let mut idx = 0;
            while let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = &tree.tree.nodes[idx]
            {
                idx = if r[*feature] <= *threshold { *left } else { *right };
            }
            counts[idx] += 1;
        }
        for (idx, node) in tree.tree.nodes.iter().enumerate() {
            if matches!(node, Node::Leaf { .. }) {
                assert!(counts[idx] >= 10, "leaf {idx} holds {} rows", counts[idx]);
            }
        }
    }

    #[test]
    fn pure_node_stays_a_leaf() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let labels = vec![1; 30];
        let mut tree = DecisionTree::new(TreeParams::default());
        tree.fit(&rows, &labels).unwrap();
        assert_eq!(tree.tree.nodes.len(), 1);
        assert_eq!(tree.predict_proba(&[5.0]), 1.0);
    }
}
