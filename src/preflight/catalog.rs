//! Pure helpers shared by the catalog checks.

/// OS families that cannot receive SSH keys at install time.
const KEYLESS_FAMILIES: [&str; 4] = ["", "iso", "snapshot", "windows"];

/// Partitions `requested` into values present in `existing` and values
/// missing from it.
///
/// The first list follows `existing`'s order, the second `requested`'s order.
/// Duplicates in `requested` are collapsed, so the two lists are disjoint.
#[must_use]
pub fn inspect<T: PartialEq + Clone>(requested: &[T], existing: &[T]) -> (Vec<T>, Vec<T>) {
    let mut not_available: Vec<T> = Vec::with_capacity(requested.len());
    for item in requested {
        if !not_available.contains(item) {
            not_available.push(item.clone());
        }
    }

    let mut available = Vec::new();
    for item in existing {
        if not_available.contains(item) {
            available.push(item.clone());
            not_available = remove(&not_available, item);
        }
    }
    (available, not_available)
}

/// Returns `list` without the first occurrence of `item`.
#[must_use]
pub fn remove<T: PartialEq + Clone>(list: &[T], item: &T) -> Vec<T> {
    let mut result = list.to_vec();
    if let Some(index) = result.iter().position(|candidate| candidate == item) {
        result.remove(index);
    }
    result
}

/// Returns `true` for four dot-separated decimal octets in `0..=255`.
#[must_use]
pub fn is_ipv4(address: &str) -> bool {
    let mut octets = 0;
    for part in address.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u32>() {
            Ok(value) if value <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}

/// Returns `true` when the OS family allows SSH keys to be attached.
#[must_use]
pub fn ssh_key_injection_supported(family: &str) -> bool {
    !KEYLESS_FAMILIES.contains(&family)
}
