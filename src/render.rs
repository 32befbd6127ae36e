pub(crate) mod clip;
pub(crate) mod element;
pub(crate) mod frame;
pub(crate) mod scene;
pub(crate) mod sequence;
