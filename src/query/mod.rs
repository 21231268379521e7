//! Multi-step MBean queries.
//!
//! A query expands a name pattern in three stages, one worker call each:
//!
//! ```text
//! query_mbean_names(pattern)          failure aborts the query
//!   └─ get_mbean_attribute_names(m)   JMX error: one error entry for m
//!        └─ get_mbean_attributes(m,a) JMX error: one error entry for (m, a)
//! ```
//!
//! Connection errors at any stage abort the whole query.

mod orchestrator;
mod outcome;

pub use orchestrator::{query_mbean, MBeanSource};
pub use outcome::{QueryItem, QueryOutcome};
