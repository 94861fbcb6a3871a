//! Integration tests for the bayescall library.
//!
//! These tests drive the same wiring the `call` command uses: a pileup
//! reader over a text observation stream, per-site evaluation, and the
//! record writers.

mod helpers;
mod test_call_scenarios;
mod test_pipeline;
