pub mod canonical_json;
pub mod fs_atomic;
pub mod ids;
pub mod patterns;

pub use canonical_json::{dumps_json, loads_json, CanonicalJsonError};
pub use fs_atomic::atomic_write_file;
pub use ids::{generate_task_id, validate_task_id};
pub use patterns::glob_match;
