//! Private/public classification of dotted-quad candidates.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::matcher::MAX_TOKEN_LEN;

/// The class an accepted address is filed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressClass {
    /// Inside one of the configured private ranges (RFC 1918 by default).
    Private,
    /// Any other valid, non-excluded address.
    Public,
}

impl AddressClass {
    /// Both classes, private first.
    pub const ALL: [AddressClass; 2] = [AddressClass::Private, AddressClass::Public];

    /// Lowercase name, as used in reports and collection names.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AddressClass::Private => "private",
            AddressClass::Public => "public",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An IPv4 network in CIDR notation, e.g. `172.16.0.0/12`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

/// Error returned when a CIDR string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CIDR block: {0}")]
pub struct CidrParseError(String);

impl Ipv4Cidr {
    const fn from_parts(network: Ipv4Addr, prefix_len: u8) -> Self {
        Ipv4Cidr {
            network,
            prefix_len,
        }
    }

    /// Create a network, masking off any host bits in `addr`.
    ///
    /// Returns `None` when `prefix_len` exceeds 32.
    #[must_use]
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix_len));
        Some(Ipv4Cidr::from_parts(network, prefix_len))
    }

    /// The network address.
    #[inline]
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// The prefix length in bits.
    #[inline]
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `addr` falls inside this network.
    #[inline]
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let m = mask(self.prefix_len);
        u32::from(addr) & m == u32::from(self.network)
    }
}

#[inline]
fn mask(prefix_len: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - u32::from(prefix_len))
        .unwrap_or(0)
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| CidrParseError(s.to_string()))?;
        let addr = parse_dotted_quad(addr.as_bytes()).ok_or_else(|| CidrParseError(s.to_string()))?;
        let len: u8 = len.parse().map_err(|_| CidrParseError(s.to_string()))?;
        Ipv4Cidr::new(addr, len).ok_or_else(|| CidrParseError(s.to_string()))
    }
}

/// The RFC 1918 private blocks: 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16.
pub const RFC1918: [Ipv4Cidr; 3] = [
    Ipv4Cidr::from_parts(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Cidr::from_parts(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Cidr::from_parts(Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// 240.0.0.0/4, "reserved for future use". Includes the limited broadcast address.
const RESERVED: Ipv4Cidr = Ipv4Cidr::from_parts(Ipv4Addr::new(240, 0, 0, 0), 4);

/// Parse a dotted-quad candidate into an address.
///
/// Accepts exactly four decimal octets in `0..=255` with no leading zeros and
/// nothing else around them. Anything outside 7 to 15 bytes is rejected before
/// decoding.
///
/// ```
/// use ip_harvest::parse_dotted_quad;
///
/// assert_eq!(parse_dotted_quad(b"192.168.1.1"), Some([192, 168, 1, 1].into()));
/// assert_eq!(parse_dotted_quad(b"256.1.1.1"), None);
/// assert_eq!(parse_dotted_quad(b"192.168.01.1"), None);
/// ```
#[inline]
#[must_use]
pub fn parse_dotted_quad(bytes: &[u8]) -> Option<Ipv4Addr> {
    if !(7..=MAX_TOKEN_LEN).contains(&bytes.len()) {
        return None;
    }
    // std's parser is strict: no leading zeros, no signs, no short forms
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Decides whether a candidate is a usable address and which class it belongs to.
///
/// The private ranges are fixed when the classifier is built and never change
/// afterwards, so a classifier can be shared freely between workers.
#[derive(Clone, Debug)]
pub struct AddressClassifier {
    private: Vec<Ipv4Cidr>,
}

impl Default for AddressClassifier {
    fn default() -> Self {
        Self::new(RFC1918.to_vec())
    }
}

impl AddressClassifier {
    /// Create a classifier that treats `private` as the private address space.
    #[must_use]
    pub fn new(private: Vec<Ipv4Cidr>) -> Self {
        AddressClassifier { private }
    }

    /// The configured private ranges.
    #[inline]
    #[must_use]
    pub fn private_ranges(&self) -> &[Ipv4Cidr] {
        &self.private
    }

    /// Classify a textual candidate.
    ///
    /// Returns `None` for malformed text and for addresses that are
    /// unspecified (`0.0.0.0`), reserved (`240.0.0.0/4`) or multicast
    /// (`224.0.0.0/4`).
    #[inline]
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<AddressClass> {
        self.classify_bytes(text.as_bytes())
    }

    /// Classify a candidate given as raw bytes.
    #[inline]
    #[must_use]
    pub fn classify_bytes(&self, bytes: &[u8]) -> Option<AddressClass> {
        parse_dotted_quad(bytes).and_then(|addr| self.classify_addr(addr))
    }

    /// Classify an already parsed address.
    #[must_use]
    pub fn classify_addr(&self, addr: Ipv4Addr) -> Option<AddressClass> {
        if addr.is_unspecified() || addr.is_multicast() || RESERVED.contains(addr) {
            return None;
        }
        if self.private.iter().any(|net| net.contains(addr)) {
            Some(AddressClass::Private)
        } else {
            Some(AddressClass::Public)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(s: &str) -> Option<AddressClass> {
        AddressClassifier::default().classify(s)
    }

    #[test]
    fn rfc1918_edges() {
        assert_eq!(classify("10.0.0.0"), Some(AddressClass::Private));
        assert_eq!(classify("10.255.255.255"), Some(AddressClass::Private));
        assert_eq!(classify("172.16.0.1"), Some(AddressClass::Private));
        assert_eq!(classify("172.31.255.255"), Some(AddressClass::Private));
        assert_eq!(classify("172.32.0.1"), Some(AddressClass::Public));
        assert_eq!(classify("172.15.255.255"), Some(AddressClass::Public));
        assert_eq!(classify("192.168.0.1"), Some(AddressClass::Private));
        assert_eq!(classify("192.169.0.1"), Some(AddressClass::Public));
        assert_eq!(classify("11.0.0.1"), Some(AddressClass::Public));
    }

    #[test]
    fn excluded_classes() {
        assert_eq!(classify("0.0.0.0"), None);
        assert_eq!(classify("224.0.0.1"), None);
        assert_eq!(classify("239.255.255.250"), None);
        assert_eq!(classify("240.0.0.1"), None);
        assert_eq!(classify("255.255.255.255"), None);
    }

    #[test]
    fn special_but_valid_addresses_are_public() {
        // Only unspecified, reserved and multicast are dropped.
        assert_eq!(classify("127.0.0.1"), Some(AddressClass::Public));
        assert_eq!(classify("169.254.1.1"), Some(AddressClass::Public));
        assert_eq!(classify("0.1.2.3"), Some(AddressClass::Public));
        assert_eq!(classify("223.255.255.255"), Some(AddressClass::Public));
    }

    #[test]
    fn malformed_text() {
        for s in [
            "", "1.2.3", "1.2.3.4.5", "256.1.1.1", "999.1.1.1", "01.2.3.4", "1.2.3.04",
            "1..2.3", "a.b.c.d", " 1.2.3.4", "1.2.3.4 ",
        ] {
            assert_eq!(classify(s), None, "{s:?}");
        }
    }

    #[test]
    fn strict_octet_forms() {
        assert_eq!(parse_dotted_quad(b"0.0.0.0"), Some(Ipv4Addr::UNSPECIFIED));
        assert_eq!(
            parse_dotted_quad(b"255.255.255.255"),
            Some(Ipv4Addr::BROADCAST)
        );
        assert_eq!(parse_dotted_quad(b"10.0.100.0"), Some(Ipv4Addr::new(10, 0, 100, 0)));
        for bad in [
            &b"00.1.2.3"[..],
            b"1.2.3.00",
            b"+1.2.3.4",
            b"1.2.3.-4",
            b"1.2.3.4.",
            b".1.2.3.4",
            b"0001.2.3.4",
            b"1.2.3.4\0",
            b"1.2.3.\xff",
            b"100.200.100.2000",
        ] {
            assert_eq!(parse_dotted_quad(bad), None, "{:?}", bad);
        }
    }

    #[test]
    fn total_over_a_sample_of_the_space() {
        let classifier = AddressClassifier::default();
        for a in (0..=255u8).step_by(7) {
            for b in (0..=255u8).step_by(51) {
                let addr = Ipv4Addr::new(a, b, a ^ b, b.wrapping_mul(3));
                let text = addr.to_string();
                let first = classifier.classify(&text);
                assert_eq!(first, classifier.classify(&text));
                assert_eq!(first, classifier.classify_addr(addr));
            }
        }
    }

    #[test]
    fn cidr_parsing_and_membership() {
        let net: Ipv4Cidr = "100.64.0.0/10".parse().unwrap();
        assert_eq!(net.to_string(), "100.64.0.0/10");
        assert!(net.contains(Ipv4Addr::new(100, 127, 255, 255)));
        assert!(!net.contains(Ipv4Addr::new(100, 128, 0, 0)));

        let masked: Ipv4Cidr = "10.1.2.3/8".parse().unwrap();
        assert_eq!(masked.network(), Ipv4Addr::new(10, 0, 0, 0));

        let everything: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(Ipv4Addr::new(203, 0, 113, 9)));

        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn injected_private_ranges() {
        let classifier = AddressClassifier::new(vec!["100.64.0.0/10".parse().unwrap()]);
        assert_eq!(classifier.classify("100.64.1.1"), Some(AddressClass::Private));
        assert_eq!(classifier.classify("10.0.0.1"), Some(AddressClass::Public));
    }
}
