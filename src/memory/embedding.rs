/// Embedding model capability. The semantic store never constructs a
/// model itself; tests substitute deterministic stubs.
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Returns `None` for text with no embeddable tokens.
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Deterministic token-bucket embedder: FNV-hashed tokens accumulate
/// signed magnitudes into a fixed-size vector, L2-normalized.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TextEmbedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let tokens = text
            .split_whitespace()
            .map(|token| token.trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>();
        if tokens.is_empty() {
            return None;
        }

        let mut out = vec![0.0_f32; self.dimension];
        for token in tokens {
            let hash = stable_hash(token.as_bytes());
            let idx = (hash as usize) % self.dimension;
            let sign = if hash & 1 == 0 { 1.0_f32 } else { -1.0_f32 };
            let mag = 1.0_f32 + (token.len() as f32 / 32.0_f32);
            out[idx] += sign * mag;
        }

        let norm = out.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return None;
        }
        for value in &mut out {
            *value /= norm;
        }
        Some(out)
    }
}

fn stable_hash(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3_u64);
    }
    hash
}
