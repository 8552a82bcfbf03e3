mod package_name;
mod reqparse;
mod requirement;
mod specifier;
mod version;

// All this stuff is also re-exported from crate::prelude::*

pub use self::package_name::PackageName;
pub use self::requirement::{marker, Requirement};
pub use self::specifier::{CompareOp, Specifier, Specifiers};
pub use self::version::{Version, VERSION_INFINITY, VERSION_ZERO};
