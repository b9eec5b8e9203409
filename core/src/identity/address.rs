// Hardware address normalization and comparison
//
// A normalized address keeps only the hexadecimal characters of its input,
// uppercased. Two addresses are equivalent iff their normalized forms are
// equal and non-empty.

use std::collections::HashSet;

/// Normalize a hardware address: strip everything outside `[0-9a-fA-F]`, uppercase the rest.
///
/// Absent input yields the empty string.
pub fn normalize(address: Option<&str>) -> String {
    address
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Compare two addresses by their normalized forms.
///
/// Empty-vs-empty is rejected so that two unknown addresses never match.
pub fn verify(received: Option<&str>, known: Option<&str>) -> bool {
    let received = normalize(received);
    let known = normalize(known);
    !received.is_empty() && received == known
}

/// Whether `address` appears among `candidates` after normalization.
///
/// Order and duplicates in `candidates` do not matter.
pub fn is_nearby<S: AsRef<str>>(address: Option<&str>, candidates: &[S]) -> bool {
    let wanted = normalize(address);
    let nearby: HashSet<String> = candidates
        .iter()
        .map(|candidate| normalize(Some(candidate.as_ref())))
        .collect();
    nearby.contains(&wanted)
}

/// Render a BlueZ device object path (`/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`)
/// as a colon separated address. Returns `None` when the path has no `dev_` element.
pub fn address_from_device_path(path: &str) -> Option<String> {
    let element = path.rsplit('/').next()?.strip_prefix("dev_")?;
    let octets: Vec<&str> = element.split('_').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed {
        return None;
    }
    Some(octets.join(":").to_ascii_uppercase())
}
