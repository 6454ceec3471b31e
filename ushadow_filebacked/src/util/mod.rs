mod require;
mod version;

pub use require::Require;
pub use version::verify_schema_version;
