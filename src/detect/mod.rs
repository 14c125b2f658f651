mod backend;
mod backends;
mod result;

pub use backend::Detector;
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use result::{BoundingBox, Detection};
