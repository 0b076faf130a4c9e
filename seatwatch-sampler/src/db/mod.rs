//! Database access for seatwatch-sampler
//!
//! Schema creation lives in `seatwatch_common::db`; this module holds the
//! queries the scheduler stages issue.

pub mod showings;
