pub mod blocks;
pub mod clean;
pub mod extract;
pub mod paginate;
pub mod search_form;
