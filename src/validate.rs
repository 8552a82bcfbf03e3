use serde_json::Value;
use thiserror::Error;

use crate::error::StoreError;
use crate::prelude::*;
use crate::store::MetadataStore;

/// One variant per validation rule, so every rejection names exactly what
/// was wrong with the request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("unknown field {0:?} in request")]
    UnknownField(String),
    #[error("field \"python\" must be a string like \"3.10\"")]
    PythonNotAString,
    #[error("invalid python version {0:?}: expected X.Y or X.Y.Z")]
    BadPythonVersion(String),
    #[error("field \"fixed\" must be an object mapping package names to version specifiers")]
    FixedNotAnObject,
    #[error("invalid package name {0:?} in \"fixed\"")]
    BadFixedName(String),
    #[error("specifier for {0:?} in \"fixed\" must be a string")]
    FixedSpecifierNotAString(String),
    #[error("invalid version specifier {specifier:?} for {name:?} in \"fixed\"")]
    BadFixedSpecifier { name: String, specifier: String },
    #[error("no release of {name:?} matches the \"fixed\" specifier {specifier:?}")]
    UnknownFixedRelease { name: String, specifier: String },
    #[error("field \"wants\" is required and must be a non-empty array of package names")]
    MissingWants,
    #[error("items in \"wants\" must be package-name strings")]
    WantsItemNotAString,
    #[error("invalid package name {0:?} in \"wants\"")]
    BadWantsName(String),
    #[error("package {0:?} in \"wants\" was not found in the metadata store")]
    UnknownWantsPackage(String),
    #[error("packages cannot appear in both \"fixed\" and \"wants\": {0}")]
    FixedWantsOverlap(String),
    #[error("field \"max_versions\" must be a positive integer")]
    BadMaxVersions,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A request that passed every shape and existence check, ready to seed the
/// engine. `fixed` entries come first, then `wants` with the universal set.
#[derive(Debug)]
pub struct ValidRequest {
    pub python: Option<Version>,
    pub requirements: IndexMap<PackageName, Specifiers>,
    pub max_versions: Option<usize>,
}

const KNOWN_FIELDS: &[&str] = &["python", "fixed", "wants", "max_versions"];

pub fn validate(
    store: &dyn MetadataStore,
    body: &Value,
) -> Result<ValidRequest, RequestError> {
    let object = body.as_object().ok_or(RequestError::NotAnObject)?;

    for key in object.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            return Err(RequestError::UnknownField(key.clone()));
        }
    }

    let python = match object.get("python") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => {
            static PYTHON_VERSION: Lazy<Regex> =
                Lazy::new(|| Regex::new(r"(?-u)^\d+\.\d+(\.\d+)?$").unwrap());
            if !PYTHON_VERSION.is_match(raw) {
                return Err(RequestError::BadPythonVersion(raw.clone()));
            }
            let version = Version::try_from(raw.as_str())
                .map_err(|_| RequestError::BadPythonVersion(raw.clone()))?;
            Some(version)
        }
        Some(_) => return Err(RequestError::PythonNotAString),
    };

    let mut requirements: IndexMap<PackageName, Specifiers> = IndexMap::new();

    match object.get("fixed") {
        None | Some(Value::Null) => {}
        Some(Value::Object(fixed)) => {
            for (raw_name, raw_specifier) in fixed {
                let name = PackageName::try_from(raw_name.as_str())
                    .map_err(|_| RequestError::BadFixedName(raw_name.clone()))?;
                let specifier_str = raw_specifier.as_str().ok_or_else(|| {
                    RequestError::FixedSpecifierNotAString(raw_name.clone())
                })?;
                let specifiers = Specifiers::try_from(specifier_str)
                    .and_then(|specifiers| {
                        specifiers.check()?;
                        Ok(specifiers)
                    })
                    .map_err(|_| RequestError::BadFixedSpecifier {
                        name: raw_name.clone(),
                        specifier: specifier_str.to_owned(),
                    })?;
                if !store.exists(&name, &specifiers)? {
                    return Err(RequestError::UnknownFixedRelease {
                        name: raw_name.clone(),
                        specifier: specifier_str.to_owned(),
                    });
                }
                requirements.insert(name, specifiers);
            }
        }
        Some(_) => return Err(RequestError::FixedNotAnObject),
    }

    let wants = match object.get("wants") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(RequestError::MissingWants),
    };
    for item in wants {
        let raw_name = item.as_str().ok_or(RequestError::WantsItemNotAString)?;
        let name = PackageName::try_from(raw_name)
            .map_err(|_| RequestError::BadWantsName(raw_name.to_owned()))?;
        if requirements.contains_key(&name) {
            return Err(RequestError::FixedWantsOverlap(
                name.canonical().to_owned(),
            ));
        }
        if !store.exists(&name, &Specifiers::any())? {
            return Err(RequestError::UnknownWantsPackage(raw_name.to_owned()));
        }
        requirements.insert(name, Specifiers::any());
    }

    let max_versions = match object.get("max_versions") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_u64() {
            Some(cap) if cap > 0 => Some(cap as usize),
            _ => return Err(RequestError::BadMaxVersions),
        },
    };

    Ok(ValidRequest {
        python,
        requirements,
        max_versions,
    })
}
