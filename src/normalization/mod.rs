pub mod rating;
pub mod slug;

pub use rating::AgeRating;
pub use slug::normalize;
