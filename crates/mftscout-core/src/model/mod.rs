/// In-memory index value types: packed sizes, packed keys, record
/// components, and the shared ascii-directional name buffer.
pub mod key;
pub mod names;
pub mod record;
pub mod size;
pub mod stdinfo;

pub use key::{Key, MAX_NAMES_PER_RECORD, MAX_STREAMS_PER_RECORD, NONE_IDX};
pub use names::NameText;
pub use record::{ChildInfo, LinkInfo, NameInfo, Record, StreamInfo, NONE};
pub use size::{FileSize, SizeInfo};
pub use stdinfo::StandardInfo;
