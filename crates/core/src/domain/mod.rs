pub mod catalog;
pub mod estimate;
pub mod line;
pub mod model;
