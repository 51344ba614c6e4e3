pub mod seed_reader;
pub mod summary_writer;
