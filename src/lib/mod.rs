#![deny(unsafe_code)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

//! # bayescall - Bayesian small-variant calling library
//!
//! This library implements a per-site Bayesian inference engine for calling
//! small variants (SNPs, MNPs, and short indels) from aligned short-read
//! sequencing data across one or more samples.
//!
//! ## Overview
//!
//! For every reference position the engine:
//!
//! 1. Groups the observations of each sample into allele equivalence classes
//!    ([`allele`], [`sample`])
//! 2. Enumerates candidate genotypes per ploidy ([`genotype`])
//! 3. Scores `p(observations | genotype)` for every sample in log space
//!    ([`likelihood`])
//! 4. Searches the joint space of per-sample genotype assignments under a
//!    composite prior ([`search`], [`priors`], [`combo`])
//! 5. Refines per-sample genotype marginals to convergence ([`marginals`])
//! 6. Derives `p(variant | data)` and the best joint genotype assignment,
//!    and hands a structured result to the record writer ([`site`],
//!    [`report`])
//!
//! All probability arithmetic is carried out in natural-log space with a
//! distinguished `-inf` sentinel for zero; see [`logprob`].
//!
//! ## Determinism
//!
//! A site evaluation is a pure function of the pileup and the configuration:
//! genotype enumeration, combination search, and every sort in between are
//! deterministic with explicit tie-breaks, so identical inputs reproduce
//! byte-identical posteriors.

pub mod allele;
pub mod combo;
pub mod config;
pub mod errors;
pub mod genotype;
pub mod likelihood;
pub mod logprob;
pub mod marginals;
pub mod metrics;
pub mod pileup;
pub mod priors;
pub mod progress;
pub mod report;
pub mod sample;
pub mod search;
pub mod site;

pub use errors::CallerError;
