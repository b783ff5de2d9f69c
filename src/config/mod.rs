mod manifest;

pub use manifest::{default_name, Manifest, ManifestError, MANIFEST_NAME, REQUIRED_FILES};
