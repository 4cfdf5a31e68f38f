use ndarray::ArrayView1;

/// Density-based cluster count over embedding vectors: connected
/// components of the eps-neighbor graph under cosine distance, with
/// components smaller than `min_cluster_size` treated as noise. No
/// fixed cluster count is assumed.
#[must_use]
pub fn cluster_count(embeddings: &[Vec<f32>], eps: f32, min_cluster_size: usize) -> usize {
    if embeddings.len() < 2 {
        return usize::from(embeddings.len() == 1);
    }

    let n = embeddings.len();
    let mut component: Vec<usize> = (0..n).collect();

    fn root(component: &mut [usize], mut index: usize) -> usize {
        while component[index] != index {
            component[index] = component[component[index]];
            index = component[index];
        }
        index
    }

    for a in 0..n {
        for b in (a + 1)..n {
            if cosine_distance(&embeddings[a], &embeddings[b]) <= eps {
                let root_a = root(&mut component, a);
                let root_b = root(&mut component, b);
                if root_a != root_b {
                    component[root_a] = root_b;
                }
            }
        }
    }

    let mut sizes = vec![0usize; n];
    for index in 0..n {
        sizes[root(&mut component, index)] += 1;
    }
    sizes
        .into_iter()
        .filter(|&size| size >= min_cluster_size)
        .count()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denominator = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denominator <= f32::EPSILON {
        return 1.0;
    }
    1.0 - a.dot(&b) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthogonal_pairs_form_distinct_clusters() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0],
        ];
        assert_eq!(cluster_count(&embeddings, 0.5, 2), 3);
    }

    #[test]
    fn singletons_are_noise() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        assert_eq!(cluster_count(&embeddings, 0.5, 2), 0);
    }

    #[test]
    fn cohesive_methods_form_one_cluster() {
        let embeddings = vec![
            vec![1.0, 0.1, 0.0],
            vec![1.0, 0.0, 0.1],
            vec![0.9, 0.1, 0.1],
        ];
        assert_eq!(cluster_count(&embeddings, 0.5, 2), 1);
    }
}
