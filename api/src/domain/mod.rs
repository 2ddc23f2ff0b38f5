pub mod books;
pub mod chapters;
pub mod classes;
pub mod users;
