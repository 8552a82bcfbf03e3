/// The vocab types all do their real parsing in a `TryFrom<&str>` impl.
/// Callers want `str::parse` and owned-`String` conversions too, and those
/// are pure forwarding, so this macro stamps out the two extra impls rather
/// than repeating them for every type.
#[macro_export]
macro_rules! try_from_str_boilerplate {
    ($name:ident) => {
        impl std::str::FromStr for $name {
            type Err = eyre::Report;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                input.try_into()
            }
        }

        impl std::convert::TryFrom<String> for $name {
            type Error = eyre::Report;

            fn try_from(input: String) -> Result<Self, Self::Error> {
                input.as_str().try_into()
            }
        }
    };
}
