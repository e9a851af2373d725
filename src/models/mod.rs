//! Binary classifiers used as stack members and as the meta-learner.

pub mod gbdt;
pub mod learner;
pub mod logistic;
pub mod tree;

pub use gbdt::*;
pub use learner::*;
pub use logistic::*;
pub use tree::*;
