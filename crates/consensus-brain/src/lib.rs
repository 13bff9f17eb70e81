//! Hand-written baseline controllers for the consensus harness.
//!
//! These implement the same [`Phenotype`] contract an external
//! evolutionary-computation library's compiled networks do. They exist as
//! fitness-boundary references: [`MeanHeadingController`] is the trivial
//! "steer toward the average broadcast heading" solution, and
//! [`InertController`] is the do-nothing negative control.

pub use consensus_core::Phenotype;

mod align;
mod inert;

pub use align::MeanHeadingController;
pub use inert::InertController;
