use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "and", "a", "in", "or", "an", "for", "to", "of", "with",
    "by",
];

/// Splits on non-alphanumeric boundaries, lowercases, and drops short
/// tokens and stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Converts log messages into TF-IDF vectors over a fitted vocabulary.
///
/// TF is the raw term frequency within a document; IDF is `ln(N / df)`.
#[derive(Debug, Default)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: HashMap<String, f64>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, documents: &[String]) {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut seen: std::collections::HashSet<String> = Default::default();
            for word in tokenize(doc) {
                if !self.vocabulary.contains_key(&word) {
                    let next = self.vocabulary.len();
                    self.vocabulary.insert(word.clone(), next);
                }
                if seen.insert(word.clone()) {
                    *doc_freq.entry(word).or_insert(0) += 1;
                }
            }
        }

        let num_docs = documents.len() as f64;
        for (word, df) in doc_freq {
            self.idf.insert(word, (num_docs / df as f64).ln());
        }
    }

    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.vocabulary.len()];

        let mut tf: HashMap<String, f64> = HashMap::new();
        for word in tokenize(text) {
            *tf.entry(word).or_insert(0.0) += 1.0;
        }

        for (word, freq) in tf {
            if let (Some(&idx), Some(&idf)) = (self.vocabulary.get(&word), self.idf.get(&word)) {
                vector[idx] = freq * idf;
            }
        }

        vector
    }
}

/// Cosine distance `1 - cos(a, b)`, with collinear zero vectors at
/// distance 1.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Density clustering over TF-IDF vectors using cosine distance.
///
/// Labels: 0 marks noise, cluster ids start at 1.
pub struct Dbscan {
    pub eps: f64,
    pub min_points: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_points: usize) -> Self {
        Self { eps, min_points }
    }

    pub fn fit(&self, vectors: &[Vec<f64>]) -> Vec<i32> {
        let n = vectors.len();
        // -1 = unvisited
        let mut labels = vec![-1i32; n];
        let mut cluster_id = 0;

        for i in 0..n {
            if labels[i] != -1 {
                continue;
            }

            let neighbors = self.region_query(vectors, &vectors[i]);
            if neighbors.len() < self.min_points {
                labels[i] = 0;
                continue;
            }

            cluster_id += 1;
            labels[i] = cluster_id;

            let mut seeds = neighbors;
            while let Some(current) = seeds.pop() {
                if labels[current] == 0 || labels[current] == -1 {
                    if labels[current] == -1 {
                        let expansion = self.region_query(vectors, &vectors[current]);
                        if expansion.len() >= self.min_points {
                            seeds.extend(expansion);
                        }
                    }
                    labels[current] = cluster_id;
                }
            }
        }

        labels
    }

    fn region_query(&self, vectors: &[Vec<f64>], point: &[f64]) -> Vec<usize> {
        vectors
            .iter()
            .enumerate()
            .filter(|(_, v)| cosine_distance(point, v) <= self.eps)
            .map(|(i, _)| i)
            .collect()
    }
}
