//! Prompt assembly: section formatting, scene batching, message ordering,
//! and prefix snapshots.
//!
//! The ordering invariant lives here: sections render most-stable first so
//! that a backend-side prompt cache keeps its value across sibling calls.

pub mod assembler;
pub mod batch;
pub mod message;
pub mod section;
pub mod snapshot;

pub use assembler::{AssemblyReport, MessageAssembler};
pub use batch::{batch_units, SceneBatch};
pub use message::{Message, MessagePrefix, Role};
pub use section::{Section, SectionBlock, Stability};
pub use snapshot::{PrefixSnapshot, SnapshotKey, SnapshotStore, SNAPSHOT_SCHEMA_VERSION};
