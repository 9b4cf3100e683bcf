use regex::Regex;

lazy_static::lazy_static! {
    static ref HEX_ADDRESS: Regex = Regex::new(r"^[0-9A-F]{6,12}$").expect("valid address pattern");
}

/// Separators accepted between address octets or groups.
const SEPARATORS: &[char] = &[':', '-', '.'];

/// The vendor-identifying first three octets of a hardware address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuiPrefix {
    dashed: String,
    hex: String,
}

impl OuiPrefix {
    /// Extract the OUI from a MAC address in colon, dash, dot (Cisco) or bare
    /// notation. Accepts anything from the bare prefix up to a full address.
    pub fn from_mac(address: &str) -> Option<Self> {
        let clean: String = address
            .trim()
            .chars()
            .filter(|c| !SEPARATORS.contains(c))
            .collect::<String>()
            .to_uppercase();

        if !HEX_ADDRESS.is_match(&clean) {
            return None;
        }

        let hex = clean[..6].to_string();
        let dashed = format!("{}-{}-{}", &hex[0..2], &hex[2..4], &hex[4..6]);
        Some(Self { dashed, hex })
    }

    /// `XX-XX-XX`
    pub fn dashed(&self) -> &str {
        &self.dashed
    }

    /// `XXXXXX`
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl std::fmt::Display for OuiPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dashed)
    }
}
