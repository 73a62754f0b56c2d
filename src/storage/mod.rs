mod applied_index;
mod engine_handle;
mod pointer_file;
mod rocksdb_state_machine;
pub(crate) mod snapshot;
mod state_machine;


#[doc(hidden)]
pub use applied_index::*;
#[doc(hidden)]
pub use engine_handle::*;
#[doc(hidden)]
pub use pointer_file::*;
#[doc(hidden)]
pub use rocksdb_state_machine::*;
#[doc(hidden)]
pub use snapshot::*;
#[doc(hidden)]
pub use state_machine::*;
