mod record;

pub use self::record::{ScanRecord, ScanStatus};
pub(crate) use self::record::RecordRow;
