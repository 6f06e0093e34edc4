// CV records and their uploaded original PDFs.

pub mod handlers;
pub mod storage;
pub mod store;
