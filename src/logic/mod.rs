//! Analysis logic

pub mod cohorts;
pub mod features;
pub mod isolation;
pub mod pipeline;
pub mod risk;
