//! ORM Layer
//!
//! Turns declarative entity metadata into SQL and rows back into entities:
//! - Criteria (typed predicates rendered as literals or bound parameters)
//! - Statement builders (INSERT/UPDATE/DELETE/SELECT)
//! - Filters (raw SQL, predicates, or per-field conditions from JSON)
//! - Entity metadata and the `Entity` trait
//! - Row hydration and lazily-loaded relations
//! - Repositories (validation, lifecycle hooks, diffed updates)
//!
//! # Repository Pattern
//!
//! ```rust,ignore
//! let contacts = Repository::<Contact>::new(conn);
//!
//! let total = contacts
//!     .count(Filter::try_from(json!({ "first_name": ["like", "Joabe"] }))?)
//!     .await?;
//!
//! let contact = contacts.find_by_id(1).await?;
//! let phones: Vec<Phone> = contact.unwrap().has_many("phones").await?;
//! ```

mod builder;
mod criteria;
mod filter;
mod mapper;
mod repository;
mod traits;

pub use builder::*;
pub use criteria::*;
pub use filter::*;
pub use mapper::*;
pub use repository::*;
pub use traits::*;
