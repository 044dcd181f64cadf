pub mod basic_functions;
pub mod maybe_rayon;
