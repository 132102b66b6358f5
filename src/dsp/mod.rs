// src/dsp/mod.rs
//
// Gain-stage building blocks shared by the resynthesizer and output path.

mod envelope;
mod limiter;
mod mixer;

pub use envelope::*;
pub use limiter::*;
pub use mixer::*;
