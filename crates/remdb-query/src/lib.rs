//! Predicate AST, selectivity-aware planner and hybrid execution (§4.7).
//! Grounded on `risingwave`'s `catalog::table_catalog` selectivity metadata
//! and `ryancinsight-OxiDB`'s `query::executor` source-selection shape; the
//! predicate's JSON wire form is the surface syntax itself, so no separate
//! parser crate is introduced. [Author fengyang]

pub mod executor;
pub mod planner;
pub mod predicate;
pub mod query;

pub use executor::execute;
pub use planner::{plan, Plan, Source};
pub use predicate::Predicate;
pub use query::{Query, SortDirection};
