pub mod geo;
pub mod hash;
pub mod metadata;
pub mod report;
pub mod similarity;
pub mod weights;
