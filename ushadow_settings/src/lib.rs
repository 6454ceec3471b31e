//! Typed key/value settings store for ushadow.
//!
//! Values live under dotted paths (`api_keys.openai`) in a single YAML
//! document. Leaves may be literal scalars or `${a.b.c}` interpolations that
//! resolve lazily against the same document — see [`value::Value`].

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_yaml;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    foreign_links {
        Io(::std::io::Error);
        Yaml(serde_yaml::Error);
    }
    errors {
        PathNotFound(path: String) {
            description("settings path not found")
            display("settings path '{}' not found", path)
        }
        TypeMismatch(path: String, expected: &'static str) {
            description("settings value has the wrong type")
            display("settings path '{}' is not a {}", path, expected)
        }
        InterpolationCycle(path: String) {
            description("interpolation forms a cycle")
            display("interpolation at '{}' forms a cycle", path)
        }
        InterpolationDepthExceeded(path: String) {
            description("interpolation chain too deep")
            display("interpolation chain starting at '{}' exceeded the depth limit", path)
        }
    }
}

pub mod generator;
pub mod store;
pub mod value;

pub use generator::Generator;
pub use store::SettingsStore;
pub use value::Value;
