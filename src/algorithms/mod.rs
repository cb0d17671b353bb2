// Vision components of the registration engine, leaves first
pub mod marks;
pub mod rotation;
pub mod correspondence;
pub mod homography;
pub mod classifier;
pub mod fiducial;
pub mod feature;

pub use classifier::*;
pub use correspondence::*;
pub use feature::*;
pub use fiducial::*;
pub use homography::*;
pub use marks::*;
pub use rotation::*;
