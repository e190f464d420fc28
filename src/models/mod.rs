pub mod review;
pub mod user;
pub mod wine;

pub use review::{RecordRef, Review, ReviewRequest};
pub use user::{NewUser, User};
pub use wine::{NewWine, Wine};

/// Record-store identifier of a user (a matrix row)
pub type UserId = i64;

/// Record-store identifier of a wine (a matrix column)
pub type WineId = i64;

/// Every record the matrix is rebuilt from at start-up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSnapshot {
    pub users: Vec<User>,
    pub wines: Vec<Wine>,
    pub reviews: Vec<Review>,
}
