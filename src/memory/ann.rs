use std::cmp::Ordering;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

const INDEX_MAGIC: &[u8; 6] = b"JVANN1";

#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error("vector dimension mismatch: index={expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("failed to read index file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write index file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("index file {path} is corrupt")]
    Corrupt { path: String },
}

/// ANN backend capability. Ids are dense and assigned in insertion order;
/// `search` returns `(id, l2_distance)` pairs.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> Option<usize>;

    fn add(&mut self, vector: &[f32]) -> Result<u64, VectorIndexError>;

    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>, VectorIndexError>;

    fn truncate(&mut self, len: usize);

    fn save(&self, path: &Path) -> Result<(), VectorIndexError>;
}

/// Exhaustive flat index over Euclidean distance, persisted as a small
/// binary file (magic, dimension, count, little-endian f32 data).
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, VectorIndexError> {
        let mut file = fs::File::open(path).map_err(|source| VectorIndexError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|source| VectorIndexError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let corrupt = || VectorIndexError::Corrupt {
            path: path.display().to_string(),
        };

        if raw.len() < INDEX_MAGIC.len() + 12 || &raw[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            return Err(corrupt());
        }
        let mut offset = INDEX_MAGIC.len();
        let dimension = read_u32(&raw, &mut offset).ok_or_else(corrupt)? as usize;
        let count = read_u64(&raw, &mut offset).ok_or_else(corrupt)? as usize;
        if dimension == 0 && count > 0 {
            return Err(corrupt());
        }

        let expected_floats = dimension.checked_mul(count).ok_or_else(corrupt)?;
        let expected_bytes = expected_floats.checked_mul(4).ok_or_else(corrupt)?;
        if raw.len() != offset + expected_bytes {
            return Err(corrupt());
        }

        let mut data = Vec::with_capacity(expected_floats);
        for chunk in raw[offset..].chunks_exact(4) {
            data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(Self {
            dimension: if count > 0 { Some(dimension) } else { None },
            data,
        })
    }
}

impl VectorIndex for FlatL2Index {
    fn len(&self) -> usize {
        match self.dimension {
            Some(dimension) if dimension > 0 => self.data.len() / dimension,
            _ => 0,
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn add(&mut self, vector: &[f32]) -> Result<u64, VectorIndexError> {
        match self.dimension {
            Some(dimension) if dimension != vector.len() => {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }
        let id = self.len() as u64;
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>, VectorIndexError> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if dimension != vector.len() {
            return Err(VectorIndexError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let mut scored = self
            .data
            .chunks_exact(dimension)
            .enumerate()
            .map(|(id, stored)| {
                let distance = stored
                    .iter()
                    .zip(vector)
                    .map(|(a, b)| {
                        let diff = a - b;
                        diff * diff
                    })
                    .sum::<f32>()
                    .sqrt();
                (id as u64, distance)
            })
            .collect::<Vec<_>>();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn truncate(&mut self, len: usize) {
        if let Some(dimension) = self.dimension {
            self.data.truncate(len * dimension);
            if self.data.is_empty() {
                self.dimension = None;
            }
        }
    }

    fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| VectorIndexError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let dimension = self.dimension.unwrap_or(0) as u32;
        let count = self.len() as u64;

        let mut out = Vec::with_capacity(INDEX_MAGIC.len() + 12 + self.data.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&dimension.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }

        let mut file = fs::File::create(path).map_err(|source| VectorIndexError::Write {
            path: path.display().to_string(),
            source,
        })?;
        file.write_all(&out)
            .and_then(|_| file.sync_all())
            .map_err(|source| VectorIndexError::Write {
                path: path.display().to_string(),
                source,
            })
    }
}

fn read_u32(raw: &[u8], offset: &mut usize) -> Option<u32> {
    let bytes = raw.get(*offset..*offset + 4)?;
    *offset += 4;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(raw: &[u8], offset: &mut usize) -> Option<u64> {
    let bytes = raw.get(*offset..*offset + 8)?;
    *offset += 8;
    Some(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}
