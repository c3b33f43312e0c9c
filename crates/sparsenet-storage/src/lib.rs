//! Export formats for sparsenet runs
//!
//! - [`record`]: self-describing trajectory records in JSON or bincode
//! - [`snapshot`]: checksummed binary CSR snapshots of a connectivity
//!
//! Both read back into engine types without re-running a simulation.

#![warn(missing_docs)]

pub mod error;
pub mod record;
pub mod schemas;
pub mod snapshot;

pub use error::{Result, StorageError};
pub use record::{
    decode_trajectory, encode_trajectory, read_trajectory, write_trajectory, Format,
    TrajectoryRecord,
};
pub use snapshot::{decode_connectivity, encode_connectivity, read_connectivity, write_connectivity};

/// Format name written into every trajectory record
pub const TRAJECTORY_FORMAT: &str = "sparsenet-trajectory";

/// Current trajectory record version
pub const TRAJECTORY_VERSION: u32 = 2;

/// Current connectivity snapshot version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic numbers for the binary layouts
pub mod magic {
    /// Trajectory record magic number: "SNTR"
    pub const SNTR: [u8; 4] = [0x53, 0x4E, 0x54, 0x52];
    /// Connectivity snapshot magic number: "SNCS"
    pub const SNCS: [u8; 4] = [0x53, 0x4E, 0x43, 0x53];
}
