use nanoid::nanoid;

const ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Collision-resistant name for per-scenario databases and users.
///
/// Restricted to lowercase alphanumerics so the result is a valid database
/// name on every storage engine.
pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, nanoid!(16, &ALPHABET))
}
