pub use loom_core::{ReadonlyState, State};
