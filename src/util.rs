//! Common utility functions.
//!
//! Provides branch prediction hints and case-insensitive name matching used
//! across modules.

/// Marker function for cold code paths.
///
/// Used with branch prediction hints to inform the compiler about infrequently executed paths.
#[inline(always)]
#[cold]
pub fn cold() {}

/// Branch prediction hint for conditions expected to be false.
///
/// # Example
/// ```ignore
/// if unlikely(text.is_empty()) {
///     return;
/// }
/// ```
#[inline(always)]
pub fn unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}

/// Branch prediction hint for conditions expected to be true.
#[inline(always)]
pub fn likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

/// ASCII case-insensitive equality, the way host member names are compared.
#[inline]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// ASCII case-insensitive substring test without allocating.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return true;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Last dotted segment of a type name: `Il2Cpp.Scriptable_String` -> `Scriptable_String`.
pub fn short_type_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}
