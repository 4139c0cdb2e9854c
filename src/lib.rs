//! AI essay exam backend: question generation and rubric-based grading via a
//! language model, with a layered extractor that turns unreliable model text
//! into typed records.

pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod generator;
pub mod grader;
pub mod llm;
pub mod pipeline;
pub mod protocol;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
