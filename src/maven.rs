pub mod coordinates;
pub mod error;
pub mod license;
pub mod metadata;
pub mod pom;
pub mod raw_pom;
pub mod repository;
pub mod resolver;
pub mod scope;
