pub mod board;
pub mod comment;
pub mod datetime;
pub mod issue;
pub mod search;
pub mod status;
pub mod user;

pub use board::*;
pub use comment::*;
pub use issue::*;
pub use search::*;
pub use status::*;
pub use user::*;
