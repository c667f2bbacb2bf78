pub mod blob;
pub mod validating_stream;
