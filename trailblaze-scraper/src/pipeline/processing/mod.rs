// Processing side of the pipeline: HTML normalization, source parsing,
// and canonicalization into domain events.

pub mod html_normalizer;
pub mod normalize;
pub mod parser;
