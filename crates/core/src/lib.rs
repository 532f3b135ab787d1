pub mod event;
pub mod filter;
pub mod program;
pub mod query;

pub use event::{CompletionStatus, SyncProgressEvent};
pub use filter::{BusinessOption, FilterSpec, build_options, filter_records};
pub use program::{BusinessRef, Program, ProgramStatus};
pub use query::QueryKey;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
