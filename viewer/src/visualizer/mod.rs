pub mod cache;
pub mod canvas;
pub mod hierarchy;
pub mod rows;
pub mod timeline;
