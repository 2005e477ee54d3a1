//! Density-based (HDBSCAN) clustering over a combined time/space metric.
//!
//! The pipeline is the textbook one:
//!
//! 1. pairwise [`combined_distance`] matrix,
//! 2. core distance of every photo (`min_samples - 1` nearest other photos),
//! 3. minimum spanning tree of the mutual-reachability graph (Prim),
//! 4. single-linkage dendrogram from the sorted tree edges,
//! 5. condensed tree with `min_cluster_size`,
//! 6. excess-of-mass selection, allowing the root as a single cluster,
//! 7. `selection_epsilon` merging of clusters born below epsilon.
//!
//! Photos that end up under no selected cluster are noise. Every tie is
//! broken by the lower fileid, so identical input always yields identical
//! clusters.

use std::collections::BTreeMap;

use tracing::debug;

use super::distance::combined_distance;
use super::{sort_chronologically, ClusterParams, Photo, TripClusterer};

/// Neighbours used for the core distance.
pub const MIN_SAMPLES: usize = 5;

/// When the whole candidate set forms one cluster, photos whose exit
/// distance exceeds this multiple of the median exit distance are noise.
pub const OUTLIER_FACTOR: f64 = 3.0;

/// Floor applied to distances before inverting them into lambda values.
const MIN_DISTANCE: f64 = 1e-9;

const ROOT: usize = 0;

#[derive(Debug, Clone, Copy)]
pub struct DensityClusterer {
    pub min_samples: usize,
}

impl Default for DensityClusterer {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
        }
    }
}

impl TripClusterer for DensityClusterer {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn cluster(&self, photos: &[Photo], params: &ClusterParams) -> Vec<Vec<Photo>> {
        let mut sorted = photos.to_vec();
        sort_chronologically(&mut sorted);

        let min_cluster_size = params.min_photos.max(2);
        if sorted.len() < min_cluster_size {
            debug!(
                "Only {} photos, fewer than the minimum cluster size {}",
                sorted.len(),
                min_cluster_size
            );
            return Vec::new();
        }

        debug!(
            "Starting HDBSCAN clustering of {} photos (time weight {}, location weight {}, epsilon {})",
            sorted.len(),
            params.time_weight,
            params.location_weight,
            params.selection_epsilon
        );

        let labels = self.labels(&sorted, params, min_cluster_size);

        let mut groups: BTreeMap<usize, Vec<Photo>> = BTreeMap::new();
        let mut noise = 0;
        for (photo, label) in sorted.into_iter().zip(labels) {
            match label {
                Some(cluster) => groups.entry(cluster).or_default().push(photo),
                None => noise += 1,
            }
        }

        let mut trips: Vec<Vec<Photo>> = groups
            .into_values()
            .filter(|group| group.len() >= params.min_photos)
            .collect();
        trips.sort_by_key(|group| (group[0].timestamp, group[0].fileid));

        debug!("HDBSCAN found {} trips, {} photos left as noise", trips.len(), noise);
        trips
    }
}

impl DensityClusterer {
    /// Cluster label per photo, `None` for noise. `photos` must be sorted.
    fn labels(
        &self,
        photos: &[Photo],
        params: &ClusterParams,
        min_cluster_size: usize,
    ) -> Vec<Option<usize>> {
        let n = photos.len();
        let matrix = DistanceMatrix::new(photos, params.time_weight, params.location_weight);
        // The photo counts toward its own neighbourhood of `min_samples`.
        let k = self
            .min_samples
            .min(min_cluster_size)
            .saturating_sub(1)
            .min(n - 1)
            .max(1);
        let core = matrix.core_distances(k);

        let fileids: Vec<i64> = photos.iter().map(|p| p.fileid).collect();
        let edges = minimum_spanning_tree(&matrix, &core, &fileids);
        let merges = single_linkage(edges, n, &fileids);
        let tree = CondensedTree::build(&merges, n, min_cluster_size);
        let selected = tree.select(params.selection_epsilon);

        tree.assign(&selected, params.selection_epsilon)
    }
}

/// Dense symmetric matrix of combined distances.
struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    fn new(photos: &[Photo], time_weight: f64, location_weight: f64) -> Self {
        let n = photos.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = combined_distance(&photos[i], &photos[j], time_weight, location_weight);
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Self { n, values }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    /// Distance from each photo to its k-th nearest other photo.
    fn core_distances(&self, k: usize) -> Vec<f64> {
        (0..self.n)
            .map(|i| {
                let mut row: Vec<f64> = (0..self.n)
                    .filter(|&j| j != i)
                    .map(|j| self.get(i, j))
                    .collect();
                let (_, kth, _) = row.select_nth_unstable_by(k - 1, f64::total_cmp);
                *kth
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

/// Prim's algorithm over the complete mutual-reachability graph.
fn minimum_spanning_tree(matrix: &DistanceMatrix, core: &[f64], fileids: &[i64]) -> Vec<Edge> {
    let n = matrix.n;
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[current] = true;

    loop {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = matrix.get(current, j).max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                best_from[j] = current;
            }
        }

        let next = (0..n).filter(|&j| !in_tree[j]).min_by(|&x, &y| {
            best[x]
                .total_cmp(&best[y])
                .then_with(|| fileids[x].cmp(&fileids[y]))
        });
        let Some(next) = next else {
            break;
        };

        in_tree[next] = true;
        edges.push(Edge {
            a: best_from[next],
            b: next,
            weight: best[next],
        });
        current = next;
    }

    edges
}

/// One merge of the single-linkage dendrogram. Node ids below `n` are
/// photos, merge `i` creates node `n + i`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

fn single_linkage(mut edges: Vec<Edge>, n: usize, fileids: &[i64]) -> Vec<Merge> {
    let edge_key = |e: &Edge| {
        let (x, y) = (fileids[e.a], fileids[e.b]);
        (x.min(y), x.max(y))
    };
    edges.sort_by(|x, y| {
        x.weight
            .total_cmp(&y.weight)
            .then_with(|| edge_key(x).cmp(&edge_key(y)))
    });

    let total = 2 * n - 1;
    let mut parent: Vec<usize> = (0..total).collect();
    let mut size = vec![1usize; total];
    let mut merges = Vec::with_capacity(n - 1);

    for edge in edges {
        let left = find(&mut parent, edge.a);
        let right = find(&mut parent, edge.b);
        if left == right {
            continue;
        }
        let node = n + merges.len();
        parent[left] = node;
        parent[right] = node;
        size[node] = size[left] + size[right];
        merges.push(Merge {
            left,
            right,
            distance: edge.weight,
            size: size[node],
        });
    }

    merges
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    let mut root = node;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

fn lambda(distance: f64) -> f64 {
    1.0 / distance.max(MIN_DISTANCE)
}

fn lambda_to_distance(lambda: f64) -> f64 {
    if lambda > 0.0 {
        1.0 / lambda
    } else {
        f64::INFINITY
    }
}

/// Hierarchy of clusters that hold at least `min_cluster_size` photos.
///
/// Cluster ids are assigned top-down, so a parent id is always lower than
/// the ids of its children and the root is 0.
#[derive(Debug, Default)]
struct CondensedTree {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    birth: Vec<f64>,
    stability: Vec<f64>,
    /// Cluster each photo fell out of.
    point_cluster: Vec<usize>,
    /// Lambda at which each photo fell out.
    point_lambda: Vec<f64>,
}

impl CondensedTree {
    fn build(merges: &[Merge], n: usize, min_cluster_size: usize) -> Self {
        let mut tree = CondensedTree {
            point_cluster: vec![ROOT; n],
            point_lambda: vec![0.0; n],
            ..Default::default()
        };
        tree.new_cluster(None, 0.0);

        let size_of = |node: usize| if node < n { 1 } else { merges[node - n].size };
        let root_node = n + merges.len() - 1;
        let mut stack = vec![(root_node, ROOT)];

        while let Some((node, cluster)) = stack.pop() {
            if node < n {
                let birth = tree.birth[cluster];
                tree.drop_points(node, cluster, birth, merges, n);
                continue;
            }

            let merge = merges[node - n];
            let lam = lambda(merge.distance);
            let left_big = size_of(merge.left) >= min_cluster_size;
            let right_big = size_of(merge.right) >= min_cluster_size;

            match (left_big, right_big) {
                (true, true) => {
                    for child in [merge.left, merge.right] {
                        let id = tree.new_cluster(Some(cluster), lam);
                        tree.stability[cluster] +=
                            (lam - tree.birth[cluster]) * size_of(child) as f64;
                        stack.push((child, id));
                    }
                }
                (true, false) => {
                    tree.drop_points(merge.right, cluster, lam, merges, n);
                    stack.push((merge.left, cluster));
                }
                (false, true) => {
                    tree.drop_points(merge.left, cluster, lam, merges, n);
                    stack.push((merge.right, cluster));
                }
                (false, false) => {
                    tree.drop_points(merge.left, cluster, lam, merges, n);
                    tree.drop_points(merge.right, cluster, lam, merges, n);
                }
            }
        }

        tree
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn new_cluster(&mut self, parent: Option<usize>, birth: f64) -> usize {
        let id = self.parent.len();
        self.parent.push(parent);
        self.children.push(Vec::new());
        self.birth.push(birth);
        self.stability.push(0.0);
        if let Some(parent) = parent {
            self.children[parent].push(id);
        }
        id
    }

    /// Every photo under `node` leaves `cluster` at `lam`.
    fn drop_points(&mut self, node: usize, cluster: usize, lam: f64, merges: &[Merge], n: usize) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current < n {
                self.point_cluster[current] = cluster;
                self.point_lambda[current] = lam;
                self.stability[cluster] += lam - self.birth[cluster];
            } else {
                let merge = &merges[current - n];
                stack.push(merge.left);
                stack.push(merge.right);
            }
        }
    }

    fn descendants(&self, cluster: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = self.children[cluster].clone();
        while let Some(c) = stack.pop() {
            out.push(c);
            stack.extend(self.children[c].iter().copied());
        }
        out
    }

    /// Excess-of-mass selection followed by the epsilon merge.
    fn select(&self, epsilon: f64) -> Vec<bool> {
        let k = self.len();
        let mut stability = self.stability.clone();
        let mut selected = vec![false; k];

        for c in (0..k).rev() {
            let children = &self.children[c];
            if children.is_empty() {
                selected[c] = true;
                continue;
            }
            let subtree: f64 = children.iter().map(|&child| stability[child]).sum();
            if subtree > stability[c] {
                stability[c] = subtree;
            } else {
                selected[c] = true;
                for d in self.descendants(c) {
                    selected[d] = false;
                }
            }
        }

        if epsilon <= 0.0 {
            return selected;
        }

        let mut merged = vec![false; k];
        for c in (0..k).filter(|&c| selected[c]) {
            let mut target = c;
            while lambda_to_distance(self.birth[target]) < epsilon {
                match self.parent[target] {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            merged[target] = true;
        }

        // Keep only the outermost of nested selections.
        for c in 0..k {
            if !merged[c] {
                continue;
            }
            let mut ancestor = self.parent[c];
            while let Some(a) = ancestor {
                if merged[a] {
                    merged[c] = false;
                    break;
                }
                ancestor = self.parent[a];
            }
        }

        merged
    }

    /// Label every photo with its selected cluster, `None` for noise.
    fn assign(&self, selected: &[bool], epsilon: f64) -> Vec<Option<usize>> {
        let root_cutoff = selected[ROOT].then(|| self.root_outlier_cutoff(epsilon));

        (0..self.point_cluster.len())
            .map(|point| {
                let mut cluster = Some(self.point_cluster[point]);
                while let Some(c) = cluster {
                    if selected[c] {
                        break;
                    }
                    cluster = self.parent[c];
                }
                let cluster = cluster?;

                if let Some(cutoff) = root_cutoff {
                    if cluster == ROOT && lambda_to_distance(self.point_lambda[point]) > cutoff {
                        return None;
                    }
                }
                Some(cluster)
            })
            .collect()
    }

    fn root_outlier_cutoff(&self, epsilon: f64) -> f64 {
        let mut exits: Vec<f64> = self
            .point_lambda
            .iter()
            .map(|&lam| lambda_to_distance(lam))
            .collect();
        exits.sort_by(f64::total_cmp);

        let mid = exits.len() / 2;
        let median = if exits.len() % 2 == 0 {
            (exits[mid - 1] + exits[mid]) / 2.0
        } else {
            exits[mid]
        };

        epsilon.max(OUTLIER_FACTOR * median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600;
    const DAY: i64 = 86_400;

    fn params(min_photos: usize, time_weight: f64, location_weight: f64) -> ClusterParams {
        ClusterParams {
            min_photos,
            time_weight,
            location_weight,
            ..ClusterParams::default()
        }
    }

    fn burst(first_id: i64, start: i64, step: i64, count: usize, lat: f64, lon: f64) -> Vec<Photo> {
        (0..count)
            .map(|i| {
                Photo::new(first_id + i as i64, start + step * i as i64).with_location(lat, lon)
            })
            .collect()
    }

    fn ids(trip: &[Photo]) -> Vec<i64> {
        trip.iter().map(|p| p.fileid).collect()
    }

    #[test]
    fn test_identical_location_one_minute_apart_merges() {
        for min_photos in [2, 3, 5, 7] {
            let photos = burst(1, 1_700_000_000, 60, 7, 48.8566, 2.3522);
            let trips = DensityClusterer::default().cluster(&photos, &params(min_photos, 0.7, 0.3));

            assert_eq!(trips.len(), 1, "min_photos {min_photos}");
            assert_eq!(ids(&trips[0]), vec![1, 2, 3, 4, 5, 6, 7]);
        }
    }

    #[test]
    fn test_far_apart_groups_never_merge() {
        let paris = burst(1, 1_704_067_200, HOUR, 6, 48.8566, 2.3522);
        let sydney = burst(100, 1_704_067_200 + 200 * DAY, HOUR, 6, -33.8688, 151.2093);
        let mut photos = paris.clone();
        photos.extend(sydney.clone());

        for (tw, lw) in [(0.7, 0.3), (1.0, 0.0), (0.0, 1.0), (0.5, 0.5), (2.0, 3.0)] {
            let trips = DensityClusterer::default().cluster(&photos, &params(5, tw, lw));
            assert_eq!(trips.len(), 2, "weights {tw}/{lw}");
            assert_eq!(ids(&trips[0]), ids(&paris));
            assert_eq!(ids(&trips[1]), ids(&sydney));
        }
    }

    #[test]
    fn test_groups_of_exactly_min_photos_stay_apart() {
        for (paris_count, sydney_count) in [(5, 5), (5, 40), (40, 5)] {
            let paris = burst(1, 1_704_067_200, HOUR, paris_count, 48.8566, 2.3522);
            let sydney = burst(
                100,
                1_704_067_200 + 200 * DAY,
                HOUR,
                sydney_count,
                -33.8688,
                151.2093,
            );
            let mut photos = paris.clone();
            photos.extend(sydney.clone());

            for (tw, lw) in [(0.7, 0.3), (1.0, 0.0), (0.0, 1.0), (0.05, 0.05)] {
                let trips = DensityClusterer::default().cluster(&photos, &params(5, tw, lw));
                let case = format!("{paris_count}+{sydney_count} at {tw}/{lw}");
                assert_eq!(trips.len(), 2, "{case}");
                assert_eq!(ids(&trips[0]), ids(&paris), "{case}");
                assert_eq!(ids(&trips[1]), ids(&sydney), "{case}");
            }
        }
    }

    #[test]
    fn test_isolated_photo_is_noise() {
        let mut photos = burst(1, 1_704_067_200, 600, 8, 41.9028, 12.4964);
        photos.push(Photo::new(99, 1_704_067_200 + 20 * DAY).with_location(64.1466, -21.9426));

        let trips = DensityClusterer::default().cluster(&photos, &params(5, 0.7, 0.3));
        assert_eq!(trips.len(), 1);
        assert_eq!(ids(&trips[0]), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_deterministic_across_runs_and_input_order() {
        let mut photos = burst(1, 1_704_067_200, 900, 9, 40.4168, -3.7038);
        photos.extend(burst(20, 1_704_067_200 + 3 * DAY, 1200, 7, 40.4168, -3.7038));
        photos.extend(burst(40, 1_704_067_200 + 40 * DAY, 300, 6, 37.3891, -5.9845));
        photos.push(Photo::new(90, 1_704_067_200 + DAY));
        photos.push(Photo::new(91, 1_704_067_200 + 3 * DAY + 60));

        let clusterer = DensityClusterer::default();
        let p = params(5, 0.7, 0.3);
        let first = clusterer.cluster(&photos, &p);
        for _ in 0..5 {
            assert_eq!(clusterer.cluster(&photos, &p), first);
        }

        let mut reversed = photos.clone();
        reversed.reverse();
        assert_eq!(clusterer.cluster(&reversed, &p), first);
    }

    #[test]
    fn test_groups_are_disjoint_and_large_enough() {
        let mut photos = burst(1, 1_704_067_200, 1800, 12, 35.6762, 139.6503);
        photos.extend(burst(50, 1_704_067_200 + 10 * DAY, 1800, 5, 34.6937, 135.5023));
        photos.extend(burst(80, 1_704_067_200 + 90 * DAY, 1800, 3, 43.0618, 141.3545));

        let p = params(4, 0.7, 0.3);
        let trips = DensityClusterer::default().cluster(&photos, &p);

        let mut seen = std::collections::HashSet::new();
        for trip in &trips {
            assert!(trip.len() >= p.min_photos);
            assert!(trip.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            for photo in trip {
                assert!(seen.insert(photo.fileid), "photo {} in two trips", photo.fileid);
            }
        }
        assert!(trips.windows(2).all(|w| w[0][0].timestamp <= w[1][0].timestamp));
    }

    #[test]
    fn test_too_few_photos() {
        let photos = burst(1, 0, 60, 3, 1.0, 1.0);
        assert!(DensityClusterer::default()
            .cluster(&photos, &params(5, 0.7, 0.3))
            .is_empty());
    }

    #[test]
    fn test_photos_without_location_cluster_by_time() {
        let photos: Vec<Photo> = (0..6).map(|i| Photo::new(i + 1, 1_000_000 + i * 120)).collect();
        let trips = DensityClusterer::default().cluster(&photos, &params(5, 0.7, 0.3));
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].len(), 6);
    }

    #[test]
    fn test_single_linkage_builds_full_hierarchy() {
        let photos = burst(1, 0, 60, 4, 1.0, 1.0);
        let matrix = DistanceMatrix::new(&photos, 1.0, 0.0);
        let core = matrix.core_distances(1);
        let fileids: Vec<i64> = photos.iter().map(|p| p.fileid).collect();
        let edges = minimum_spanning_tree(&matrix, &core, &fileids);
        assert_eq!(edges.len(), 3);

        let merges = single_linkage(edges, 4, &fileids);
        assert_eq!(merges.len(), 3);
        assert_eq!(merges[2].size, 4);
        assert!(merges.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}
