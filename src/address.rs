/// Wildcard used by `?!`, answered by any sensor regardless of its address
pub const QUERY_ADDRESS: char = '?';

/// Address used by sensors shipped from the factory
pub const DEFAULT_ADDRESS: char = '0';

/// `true` for the 62 characters usable as a sensor address: `0-9`, `A-Z`, `a-z`
pub fn is_valid_address(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Same as [`is_valid_address`] for a raw bus byte
pub(crate) fn address_from_byte(b: u8) -> Option<char> {
    let c = b as char;
    if is_valid_address(c) {
        Some(c)
    } else {
        None
    }
}
