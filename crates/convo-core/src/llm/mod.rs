pub mod client;

pub use client::{GenerationStream, InferenceClient};
