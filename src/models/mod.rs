pub mod chain;
pub mod completeness;
pub mod range;
pub mod raw;
pub mod record;

pub use chain::{Block, Transaction, TransferLog};
pub use completeness::{Completeness, DecodeTally, Gap, GapKind};
pub use range::BlockRange;
pub use raw::{RawBlock, RawEntry, RawLog, RawReceipt, RawTransaction};
pub use record::{NormalizedRecord, TransferFields};
