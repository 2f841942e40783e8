//! Build matrix: the configuration axes and the units they expand into.

pub mod expand;
pub mod types;

pub use expand::{ExcludeEntry, IncludeEntry, MatrixError, MatrixSpec};
pub use types::{BuildFlags, BuildKind, BuildUnit, PythonVersion, UnitId};
