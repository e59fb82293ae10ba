//! Segment bookkeeping.
//!
//! A queue is a run of segment files. [`FileSet`] owns them and decides
//! where each write lands and which files can go; [`ReadCursor`] walks the
//! closed ones frame by frame.

mod cursor;
mod set;

pub(crate) use cursor::ReadCursor;
pub(crate) use set::FileSet;
