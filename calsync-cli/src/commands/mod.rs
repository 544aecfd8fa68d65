pub mod destinations;
pub mod sync;
pub mod window;
