pub(crate) mod cancel;
pub(crate) mod progress;
pub(crate) mod queue;
pub(crate) mod render;
pub(crate) mod scratch;
pub(crate) mod task;
