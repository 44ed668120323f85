pub mod heightfield;
pub mod image;
