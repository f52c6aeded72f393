//! Result approval core: the per class-level/term lock on grades, the completeness scan
//! that gates a teacher's approval, and the guard every grade write goes through.
//!
//! Lock states are derived from two flags on [`model::ApprovalRecord`]:
//!
//! | teacherApproved | schoolAdminApproved | state           |
//! |-----------------|---------------------|-----------------|
//! | false           | false               | Open            |
//! | true            | false               | TeacherApproved |
//! | any             | true                | AdminApproved   |
//!
//! Only a school administrator can leave `AdminApproved`.

pub mod error;
pub mod guard;
pub mod model;
pub mod repository;
pub mod scanner;
pub mod store;
pub mod workflow;

pub use error::ApprovalError;
pub use model::{ApprovalKey, LockKey};
