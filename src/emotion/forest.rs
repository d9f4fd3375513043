// Random forest classifier
// Bagged CART trees with Gini impurity, class-probability output and feature importances

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::emotion::backend::ClassifierError;

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees in the ensemble
    pub n_estimators: usize,

    /// Maximum tree depth (root is depth 0)
    pub max_depth: usize,

    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,

    /// Minimum samples required in each child of a split
    pub min_samples_leaf: usize,

    /// Seed for bootstrap sampling and feature subsampling
    pub seed: u64,

    /// How samples of each class are weighted in impurity and leaf estimates
    #[serde(default)]
    pub class_weight: ClassWeight,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 200,
            max_depth: 30,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
            class_weight: ClassWeight::Balanced,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Every sample counts once
    #[default]
    Uniform,

    /// Class `c` weighs `n / (k * count_c)` over the `k` classes present in the labels
    Balanced,
}

impl ClassWeight {
    /// Per-class weights for labels `y` in `0..n_classes`
    /// Classes absent from `y` get weight 0
    pub fn weights(self, y: &[usize], n_classes: usize) -> Vec<f64> {
        match self {
            ClassWeight::Uniform => vec![1.0; n_classes],
            ClassWeight::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &c in y {
                    counts[c] += 1;
                }
                let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
                let n = y.len() as f64;
                counts
                    .iter()
                    .map(|&c| if c == 0 { 0.0 } else { n / (present * c as f64) })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Node {
    Leaf {
        /// Class probabilities at this leaf
        distribution: Vec<f32>,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// A single decision tree stored as a flat node arena (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict_proba(&self, row: &[f32]) -> Result<&[f32], ClassifierError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in at most `nodes.len()` steps
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(Node::Leaf { distribution }) => return Ok(distribution),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().ok_or_else(|| {
                        ClassifierError::ClassificationError(format!(
                            "split references feature {} of {}",
                            feature,
                            row.len()
                        ))
                    })?;
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }

        Err(ClassifierError::ClassificationError(
            "malformed decision tree".to_string(),
        ))
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
}

/// Candidate split found while growing a node
struct SplitCandidate {
    feature: usize,
    threshold: f32,
    /// Number of samples (after sorting by `feature`) that go left
    left_count: usize,
    /// Summed class weight of the left side
    left_weight: f64,
    left_impurity: f64,
    right_impurity: f64,
    weighted_impurity: f64,
}

/// Grows one tree over a bootstrap sample
struct TreeBuilder<'a> {
    x: &'a [Vec<f32>],
    y: &'a [usize],
    n_classes: usize,
    class_weights: &'a [f64],
    max_features: usize,
    params: &'a ForestParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    n_root: f64,
}

impl<'a> TreeBuilder<'a> {
    /// Weighted class totals over `indices`
    fn class_counts(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0f64; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += self.class_weights[self.y[i]];
        }
        counts
    }

    fn leaf(&mut self, counts: &[f64]) -> usize {
        let total = counts.iter().sum::<f64>();
        let distribution = counts
            .iter()
            .map(|&c| if total > 0.0 { (c / total) as f32 } else { 0.0 })
            .collect();
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn build(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(indices);
        let total: f64 = counts.iter().sum();
        let impurity = gini(&counts, total);

        let is_pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;
        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
            || is_pure
        {
            return self.leaf(&counts);
        }

        let Some(split) = self.best_split(indices, total, rng) else {
            return self.leaf(&counts);
        };

        // Record impurity decrease weighted by node weight
        let n = total;
        let n_left = split.left_weight;
        let n_right = n - n_left;
        let decrease = n / self.n_root
            * (impurity - n_left / n * split.left_impurity - n_right / n * split.right_impurity);
        self.importances[split.feature] += decrease.max(0.0);

        // Partition in place: sorting by the split feature puts the left side first
        let x = self.x;
        indices.sort_by(|&a, &b| x[a][split.feature].total_cmp(&x[b][split.feature]));
        let (left_indices, right_indices) = indices.split_at_mut(split.left_count);

        let node_idx = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });

        let left = self.build(left_indices, depth + 1, rng);
        let right = self.build(right_indices, depth + 1, rng);

        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[node_idx]
        {
            *l = left;
            *r = right;
        }

        node_idx
    }

    fn best_split(&self, indices: &[usize], total: f64, rng: &mut StdRng) -> Option<SplitCandidate> {
        let n_features = self.x[0].len();
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        let mut sorted: Vec<(f32, usize)> = Vec::with_capacity(n);

        // Visit features in random order; constant features don't count toward
        // max_features, so a node only becomes a leaf when no feature can split it
        let mut visited = 0;
        for feature in sample(rng, n_features, n_features).into_iter() {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (self.x[i][feature], self.y[i])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            if sorted[0].0 == sorted[n - 1].0 {
                continue;
            }
            visited += 1;

            let mut left_counts = vec![0.0f64; self.n_classes];
            let mut right_counts = vec![0.0f64; self.n_classes];
            for &(_, class) in &sorted {
                right_counts[class] += self.class_weights[class];
            }
            let mut left_weight = 0.0f64;

            for i in 0..n - 1 {
                let class = sorted[i].1;
                let w = self.class_weights[class];
                left_counts[class] += w;
                right_counts[class] -= w;
                left_weight += w;

                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                if sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }

                let right_weight = total - left_weight;
                let left_impurity = gini(&left_counts, left_weight);
                let right_impurity = gini(&right_counts, right_weight);
                let weighted = (left_weight * left_impurity + right_weight * right_impurity) / total;

                if best.as_ref().map_or(true, |b| weighted < b.weighted_impurity) {
                    let mut threshold = sorted[i].0 + (sorted[i + 1].0 - sorted[i].0) / 2.0;
                    // Midpoint can round up onto the right value for adjacent floats
                    if threshold >= sorted[i + 1].0 {
                        threshold = sorted[i].0;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        left_count: n_left,
                        left_weight,
                        left_impurity,
                        right_impurity,
                        weighted_impurity: weighted,
                    });
                }
            }
        }

        best
    }
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c / total;
            p * p
        })
        .sum::<f64>()
}

/// Ensemble of decision trees averaging per-class probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f32>,
}

impl RandomForest {
    /// Fit a forest on rows `x` with class indices `y` in `0..n_classes`
    pub fn fit(
        x: &[Vec<f32>],
        y: &[usize],
        n_classes: usize,
        params: ForestParams,
    ) -> Result<Self, ClassifierError> {
        if x.is_empty() {
            return Err(ClassifierError::TrainingError("no training samples".to_string()));
        }
        if x.len() != y.len() {
            return Err(ClassifierError::TrainingError(format!(
                "{} samples but {} labels",
                x.len(),
                y.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(ClassifierError::TrainingError(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let n_features = x[0].len();
        if n_features == 0 {
            return Err(ClassifierError::TrainingError("samples have no features".to_string()));
        }
        if let Some(row) = x.iter().find(|r| r.len() != n_features) {
            return Err(ClassifierError::DimensionMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
        if let Some(&label) = y.iter().find(|&&c| c >= n_classes) {
            return Err(ClassifierError::TrainingError(format!(
                "label {} out of range for {} classes",
                label, n_classes
            )));
        }
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ClassifierError::TrainingError(
                "training data contains NaN or Inf".to_string(),
            ));
        }

        let max_features = ((n_features as f64).sqrt() as usize).clamp(1, n_features);
        let n = x.len();
        let class_weights = params.class_weight.weights(y, n_classes);

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0f64; n_features];

        for tree_idx in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
            let mut indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let n_root: f64 = indices.iter().map(|&i| class_weights[y[i]]).sum();

            let mut builder = TreeBuilder {
                x,
                y,
                n_classes,
                class_weights: &class_weights,
                max_features,
                params: &params,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
                n_root,
            };
            builder.build(&mut indices, 0, &mut rng);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(builder.importances.iter()) {
                    *acc += v / tree_total;
                }
            }

            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        let total: f64 = importances.iter().sum();
        let feature_importances = importances
            .iter()
            .map(|v| if total > 0.0 { (v / total) as f32 } else { 0.0 })
            .collect();

        log::debug!(
            "Fitted random forest: {} trees, {} samples, {} features, {} classes",
            trees.len(),
            n,
            n_features,
            n_classes
        );

        Ok(RandomForest {
            params,
            n_features,
            n_classes,
            trees,
            feature_importances,
        })
    }

    /// Average class probabilities across all trees
    pub fn predict_proba(&self, row: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        if row.len() != self.n_features {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        if self.trees.is_empty() {
            return Err(ClassifierError::NotFitted);
        }

        let mut sums = vec![0.0f32; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.predict_proba(row)?;
            if leaf.len() != self.n_classes {
                return Err(ClassifierError::ClassificationError(format!(
                    "leaf has {} classes, forest has {}",
                    leaf.len(),
                    self.n_classes
                )));
            }
            for (s, p) in sums.iter_mut().zip(leaf.iter()) {
                *s += p;
            }
        }

        let n_trees = self.trees.len() as f32;
        Ok(sums.into_iter().map(|s| s / n_trees).collect())
    }

    /// Index of the most probable class
    pub fn predict(&self, row: &[f32]) -> Result<usize, ClassifierError> {
        let proba = self.predict_proba(row)?;
        Ok(proba
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0))
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Mean decrease in impurity per feature, normalized to sum to 1
    pub fn feature_importances(&self) -> &[f32] {
        &self.feature_importances
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}
