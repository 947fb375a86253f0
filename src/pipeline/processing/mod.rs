// Pipeline processing: cell normalization and row validation

pub mod normalize;
pub mod quality_gate;
