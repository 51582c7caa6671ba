pub mod contents;
pub mod handle;
pub mod hashindex;
pub mod node;
pub mod nsec3;
pub mod rrset;
pub mod storage;
pub mod store;

pub use contents::{DnameLookup, Nsec3Params, ZoneContents};
pub use handle::ZoneHandle;
pub use hashindex::HashIndex;
pub use node::{DupPolicy, Node, NodeFlags, NodeId};
pub use rrset::{DnameRef, RRSet, RdataRecord};
pub use storage::{Changeset, MemoryZoneStorage, ZoneStorage};
pub use store::ZoneStore;
