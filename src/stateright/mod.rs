//! Stateright Model Checking
//!
//! Exhaustive state-space exploration of the concurrency-sensitive pieces.
//!
//! ## Available Models
//!
//! - `transport`: batch transport queue, framing and shutdown
//!
//! ## Running Model Checks
//!
//! ```bash
//! # Exhaustive checks are marked #[ignore] for CI speed
//! cargo test stateright -- --ignored --nocapture
//! ```

pub mod transport;
