//! sitewright — brief in, deployed multi-page site out.
//!
//! The core is a phase pipeline with two bounded convergence loops: the
//! council debate that settles a site blueprint, and the quality gate
//! that verifies and repairs the generated pages. A FIFO queue with a
//! configurable lane count fronts the pipeline so concurrent builds never
//! fight over working directories or rate limits.

pub mod config;
pub mod contrast;
pub mod council;
pub mod extract;
pub mod gateway;
pub mod images;
pub mod model;
pub mod notify;
pub mod observer;
pub mod pipeline;
pub mod prompts;
pub mod quality_gate;
pub mod queue;
pub mod scrape;
pub mod session;
