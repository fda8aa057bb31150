use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};

use crate::models::{Interaction, ItemId, SignalType, UserId};

/// Ridge term keeping the per-factor normal equations well conditioned
const REGULARIZATION: f64 = 0.05;

/// Alternating least squares sweeps per build
const ALS_ITERATIONS: usize = 20;

/// Versioned low-rank factorization of the user x item interaction matrix
///
/// Immutable once built: the refresh layer replaces whole snapshots behind an
/// atomic pointer swap and never mutates one in place.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    pub user_factors: HashMap<UserId, Vec<f64>>,
    pub item_factors: HashMap<ItemId, Vec<f64>>,
    pub built_at: DateTime<Utc>,
    pub explained_variance: f64,
    pub k: usize,
}

impl LatentFactorModel {
    /// Builds a rank-k model over the interaction corpus
    ///
    /// Missing matrix entries are treated as unknown, never as zero: the
    /// factorization fits observed cells only. Returns `None` when the corpus
    /// is below `min_interactions` or the matrix is degenerate (fewer than
    /// two users or items, or zero variance across observations); callers
    /// fall back to the other strategies. This function never errors.
    pub fn build(
        interactions: &[Interaction],
        k: usize,
        min_interactions: usize,
    ) -> Option<LatentFactorModel> {
        let observed = collapse_observations(interactions);

        if observed.len() < min_interactions {
            tracing::debug!(
                observed = observed.len(),
                min = min_interactions,
                "Corpus below build threshold"
            );
            return None;
        }

        // Sorted indices keep builds reproducible run to run
        let user_index: BTreeMap<UserId, usize> = observed
            .keys()
            .map(|(user_id, _)| *user_id)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(idx, id)| (id, idx))
            .collect();
        let item_index: BTreeMap<ItemId, usize> = observed
            .keys()
            .map(|(_, item_id)| *item_id)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(idx, id)| (id, idx))
            .collect();

        let n_users = user_index.len();
        let n_items = item_index.len();
        if n_users < 2 || n_items < 2 {
            tracing::debug!(n_users, n_items, "Degenerate interaction matrix");
            return None;
        }

        let mean = observed.values().sum::<f64>() / observed.len() as f64;
        let total_variance: f64 = observed.values().map(|v| (v - mean).powi(2)).sum();
        if total_variance <= f64::EPSILON {
            tracing::debug!("Zero-variance interaction matrix");
            return None;
        }

        let k = k.min(n_users).min(n_items);

        // Per-row observation lists for the alternating solves
        let mut by_user: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_users];
        let mut by_item: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_items];
        for ((user_id, item_id), value) in &observed {
            let u = user_index[user_id];
            let i = item_index[item_id];
            by_user[u].push((i, *value));
            by_item[i].push((u, *value));
        }

        let mut user_factors = Array2::<f64>::zeros((n_users, k));
        let mut item_factors = seeded_factors(n_items, k);

        for _ in 0..ALS_ITERATIONS {
            solve_side(&mut user_factors, &item_factors, &by_user, k);
            solve_side(&mut item_factors, &user_factors, &by_item, k);
        }

        // Explained variance over observed cells only, as a build diagnostic
        let mut sse = 0.0;
        for ((user_id, item_id), value) in &observed {
            let u = user_index[user_id];
            let i = item_index[item_id];
            let predicted: f64 = (0..k)
                .map(|f| user_factors[[u, f]] * item_factors[[i, f]])
                .sum();
            sse += (value - predicted).powi(2);
        }
        let explained_variance = (1.0 - sse / total_variance).clamp(0.0, 1.0);

        let user_factors = user_index
            .iter()
            .map(|(id, &idx)| (*id, user_factors.row(idx).to_vec()))
            .collect();
        let item_factors = item_index
            .iter()
            .map(|(id, &idx)| (*id, item_factors.row(idx).to_vec()))
            .collect();

        Some(LatentFactorModel {
            user_factors,
            item_factors,
            built_at: Utc::now(),
            explained_variance,
            k,
        })
    }

    /// Whether the user appears in this snapshot
    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_factors.contains_key(&user_id)
    }

    /// Predicted affinity of a user for an item; `None` if either is unknown
    pub fn predict(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        let user = self.user_factors.get(&user_id)?;
        let item = self.item_factors.get(&item_id)?;
        Some(dot(user, item))
    }

    /// Ranks candidate items for a user, highest score first
    ///
    /// Seen items are excluded; ties break by ascending item id so repeated
    /// calls return identical orderings.
    pub fn rank(
        &self,
        user_id: UserId,
        candidates: &[ItemId],
        seen: &HashSet<ItemId>,
    ) -> Vec<(ItemId, f64)> {
        let Some(user) = self.user_factors.get(&user_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(ItemId, f64)> = candidates
            .iter()
            .filter(|item_id| !seen.contains(item_id))
            .filter_map(|item_id| {
                self.item_factors
                    .get(item_id)
                    .map(|item| (*item_id, dot(user, item)))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }
}

/// Collapses raw interactions to one value per (user, item) cell
///
/// Explicit ratings win over implicit signals; among ratings the latest wins,
/// among implicit signals the strongest.
fn collapse_observations(interactions: &[Interaction]) -> BTreeMap<(UserId, ItemId), f64> {
    let mut rated: HashSet<(UserId, ItemId)> = HashSet::new();
    let mut observed: BTreeMap<(UserId, ItemId), f64> = BTreeMap::new();

    for interaction in interactions {
        let key = (interaction.user_id, interaction.item_id);
        let value = interaction.matrix_value();
        match interaction.signal {
            SignalType::Rating => {
                rated.insert(key);
                observed.insert(key, value);
            }
            _ if rated.contains(&key) => {}
            _ => {
                let entry = observed.entry(key).or_insert(value);
                if value > *entry {
                    *entry = value;
                }
            }
        }
    }

    observed
}

/// Deterministic pseudo-random factor initialization
///
/// A splitmix64 walk over the flat index replaces an RNG so that two builds
/// over the same corpus produce bit-identical models.
fn seeded_factors(rows: usize, k: usize) -> Array2<f64> {
    let scale = 1.0 / (k as f64).sqrt();
    Array2::from_shape_fn((rows, k), |(row, col)| {
        let mut x = (row * k + col) as u64 ^ 0x9e3779b97f4a7c15;
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^= x >> 31;
        let unit = (x >> 11) as f64 / (1u64 << 53) as f64;
        (unit + 0.5) * scale
    })
}

/// One half of an ALS sweep: re-solves `target` rows against `fixed` factors
fn solve_side(
    target: &mut Array2<f64>,
    fixed: &Array2<f64>,
    observations: &[Vec<(usize, f64)>],
    k: usize,
) {
    for (row, obs) in observations.iter().enumerate() {
        if obs.is_empty() {
            continue;
        }

        let mut gram = Array2::<f64>::eye(k) * REGULARIZATION;
        let mut rhs = Array1::<f64>::zeros(k);

        for &(other, value) in obs {
            let factor = fixed.row(other);
            for a in 0..k {
                rhs[a] += value * factor[a];
                for b in 0..k {
                    gram[[a, b]] += factor[a] * factor[b];
                }
            }
        }

        if let Some(solution) = solve_linear(gram, rhs) {
            for f in 0..k {
                target[[row, f]] = solution[f];
            }
        }
    }
}

/// Solves a small dense k x k system by Gaussian elimination with pivoting
fn solve_linear(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        // Partial pivot
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[[row, col]].abs() > a[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                let tmp = a[[col, j]];
                a[[col, j]] = a[[pivot, j]];
                a[[pivot, j]] = tmp;
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let ratio = a[[row, col]] / a[[col, col]];
            for j in col..n {
                a[[row, j]] -= ratio * a[[col, j]];
            }
            b[row] -= ratio * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut sum = b[row];
        for j in (row + 1)..n {
            sum -= a[[row, j]] * x[j];
        }
        x[row] = sum / a[[row, row]];
    }
    Some(x)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
