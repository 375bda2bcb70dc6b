//! # Exam Analytics
//!
//! Longitudinal exam analytics for a school cohort: ranks, admission
//! distributions, class comparisons, psychometric exam parameters and
//! rank-progress streaks, computed from periodic score exports.
//!
//! ## Architecture
//!
//! - **models**: student histories, period rows and result types
//! - **ranks**: per-period school, class and subject rank maps
//! - **snapshot**: single-period projection of the roster
//! - **thresholds**: admission categories from configured or imported cutoffs
//! - **distribution**: distributions, class summaries and heatmap maxima
//! - **psychometrics**: per-subject statistics and exam reliability
//! - **progress**: progress coefficients and rank streaks
//! - **settings**: analysis configuration
//! - **db**: Postgres persistence of the roster and settings
//! - **report** / **export**: markdown report and CSV output
//!
//! The engine modules are pure: every call recomputes from its arguments.

pub mod db;
pub mod distribution;
pub mod error;
pub mod export;
pub mod models;
pub mod progress;
pub mod psychometrics;
pub mod ranks;
pub mod report;
pub mod settings;
pub mod snapshot;
pub mod thresholds;
