pub mod color;
pub mod feature_point;
pub mod kmeans;
pub mod pixel;
pub mod render;
pub mod signature_builder;
pub mod svf;
pub mod texture;
pub mod thumbnail;
