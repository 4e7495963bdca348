use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Dimensionality of the hashed feature space. Collisions are tolerable;
/// scoring only compares relative similarity.
const DIM: usize = 256;

/// Hashed character-trigram embedder. Maps text into a fixed-dimension,
/// L2-normalized vector space where cosine similarity approximates surface
/// similarity of phrases. Deterministic, no external model files.
pub struct Embedder;

impl Embedder {
    pub fn new() -> Self {
        Embedder
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; DIM];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            bump(&mut vec, &("w", word));
            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for window in padded.windows(3) {
                bump(&mut vec, &("t", window));
            }
        }
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}

fn bump<T: Hash>(vec: &mut [f32], feature: &T) {
    let mut hasher = DefaultHasher::new();
    feature.hash(&mut hasher);
    let idx = (hasher.finish() % DIM as u64) as usize;
    vec[idx] += 1.0;
}

/// Cosine similarity of two embeddings. Inputs are already normalized, so
/// this is a dot product.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
