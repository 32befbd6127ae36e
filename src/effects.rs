pub(crate) mod blur;
pub(crate) mod params;
pub(crate) mod pixel;
pub(crate) mod resolve;
