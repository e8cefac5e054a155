//! Newtype wrappers for radio network identifiers and link settings.
//!
//! Node addresses are written in octal: each octal digit names a branch
//! (1..=5) of the radio network's tree, the root being `00`.

use core::fmt;
use core::str::FromStr;

use crate::constants::{MAX_ADDRESS_DEPTH, MULTICAST_ADDRESS, ROOT_ADDRESS};
use crate::error::CoreError;

/// A node address in the radio network's tree addressing space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct NodeAddress(u16);

impl NodeAddress {
    /// The root/master node.
    pub const ROOT: Self = Self(ROOT_ADDRESS);

    /// Validate a raw address against the network's legality rules.
    pub fn new(raw: u16) -> Result<Self, CoreError> {
        if Self::is_valid(raw) {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidAddress(format!("{raw:#o}")))
        }
    }

    /// Whether `raw` is a legal address: the root, the reserved multicast
    /// address, or up to four octal digits each in `1..=5`.
    pub fn is_valid(raw: u16) -> bool {
        if raw == ROOT_ADDRESS || raw == MULTICAST_ADDRESS {
            return true;
        }
        let mut node = raw;
        let mut depth = 0;
        while node != 0 {
            let digit = node & 0o7;
            if !(1..=5).contains(&digit) {
                return false;
            }
            node >>= 3;
            depth += 1;
        }
        depth <= MAX_ADDRESS_DEPTH
    }

    /// Parse an octal address string such as `"00"`, `"011"` or `"0o11"`.
    pub fn parse_octal(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0o")
            .or_else(|| trimmed.strip_prefix("0O"))
            .unwrap_or(trimmed);
        let raw = u16::from_str_radix(digits, 8)
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Self::new(raw).map_err(|_| CoreError::InvalidAddress(s.to_string()))
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_root(self) -> bool {
        self.0 == ROOT_ADDRESS
    }

    pub const fn is_multicast(self) -> bool {
        self.0 == MULTICAST_ADDRESS
    }

    /// Tree depth (number of octal digits); the root is at depth 0.
    pub fn depth(self) -> u32 {
        let mut node = self.0;
        let mut depth = 0;
        while node != 0 {
            node >>= 3;
            depth += 1;
        }
        depth
    }

    /// Every legal address at exactly `level` hops below the root.
    pub fn at_level(level: u8) -> Vec<Self> {
        let level = u32::from(level);
        if level == 0 || level > MAX_ADDRESS_DEPTH {
            return Vec::new();
        }
        let mut out = vec![0u16];
        for shift in 0..level {
            out = out
                .into_iter()
                .flat_map(|prefix| (1..=5u16).map(move |digit| prefix | (digit << (3 * shift))))
                .collect();
        }
        out.sort_unstable();
        out.into_iter().map(Self).collect()
    }

    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0{:o}", self.0)
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress(0{:o})", self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_octal(s)
    }
}

impl TryFrom<u16> for NodeAddress {
    type Error = CoreError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

/// Logical mesh identifier; in IP mode it equals the last octet of the
/// node's IPv4 address. The master always uses id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshNodeId(pub u8);

impl MeshNodeId {
    pub const MASTER: Self = Self(0);

    pub const fn is_master(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MeshNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for MeshNodeId {
    type Error = CoreError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        u8::try_from(raw)
            .map(Self)
            .map_err(|_| CoreError::InvalidMeshNodeId(raw))
    }
}

/// Over-the-air data rate of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataRate {
    Kbps250,
    #[default]
    Mbps1,
    Mbps2,
}

impl DataRate {
    /// Map the command-line tier value (`1`, `2` or `250`).
    pub fn from_tier(value: u16) -> Result<Self, CoreError> {
        match value {
            1 => Ok(Self::Mbps1),
            2 => Ok(Self::Mbps2),
            250 => Ok(Self::Kbps250),
            other => Err(CoreError::InvalidDataRate(other)),
        }
    }

    pub const fn tier(self) -> u16 {
        match self {
            Self::Kbps250 => 250,
            Self::Mbps1 => 1,
            Self::Mbps2 => 2,
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kbps250 => write!(f, "250KBPS"),
            Self::Mbps1 => write!(f, "1MBPS"),
            Self::Mbps2 => write!(f, "2MBPS"),
        }
    }
}

/// Framing of the virtual interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterfaceMode {
    /// Point-to-point IP (TUN). Requires mesh address assignment and resolution.
    Tun,
    /// Broadcast-capable Ethernet (TAP). Resolves peers through ARP.
    #[default]
    Tap,
}

impl InterfaceMode {
    pub const fn requires_mesh(self) -> bool {
        matches!(self, Self::Tun)
    }

    pub const fn is_ethernet(self) -> bool {
        matches!(self, Self::Tap)
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tun => write!(f, "TUN"),
            Self::Tap => write!(f, "TAP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_children_are_valid() {
        assert!(NodeAddress::is_valid(0));
        assert!(NodeAddress::is_valid(0o1));
        assert!(NodeAddress::is_valid(0o5));
        assert!(NodeAddress::is_valid(0o11));
        assert!(NodeAddress::is_valid(0o5555));
        assert!(NodeAddress::is_valid(MULTICAST_ADDRESS));
    }

    #[test]
    fn illegal_digits_and_depth_are_rejected() {
        assert!(!NodeAddress::is_valid(0o6));
        assert!(!NodeAddress::is_valid(0o7));
        assert!(!NodeAddress::is_valid(0o10 + 0o1000)); // zero digit
        assert!(!NodeAddress::is_valid(0o20));
        assert!(!NodeAddress::is_valid(0o11111));
        assert!(NodeAddress::new(0o6).is_err());
    }

    #[test]
    fn parse_octal_variants() {
        assert_eq!(NodeAddress::parse_octal("00").unwrap(), NodeAddress::ROOT);
        assert_eq!(NodeAddress::parse_octal("01").unwrap().raw(), 1);
        assert_eq!(NodeAddress::parse_octal("011").unwrap().raw(), 9);
        assert_eq!(NodeAddress::parse_octal("0o11").unwrap().raw(), 9);
        assert_eq!("045".parse::<NodeAddress>().unwrap().raw(), 0o45);
        assert!(NodeAddress::parse_octal("08").is_err());
        assert!(NodeAddress::parse_octal("").is_err());
        assert!(NodeAddress::parse_octal("06").is_err());
        assert!(NodeAddress::parse_octal("abc").is_err());
    }

    #[test]
    fn display_uses_octal_notation() {
        assert_eq!(NodeAddress::ROOT.to_string(), "00");
        assert_eq!(NodeAddress::new(0o11).unwrap().to_string(), "011");
        assert_eq!(
            format!("{:?}", NodeAddress::new(0o3).unwrap()),
            "NodeAddress(03)"
        );
    }

    #[test]
    fn depth_counts_octal_digits() {
        assert_eq!(NodeAddress::ROOT.depth(), 0);
        assert_eq!(NodeAddress::new(0o4).unwrap().depth(), 1);
        assert_eq!(NodeAddress::new(0o54).unwrap().depth(), 2);
        assert_eq!(NodeAddress::new(0o1234).unwrap().depth(), 4);
    }

    #[test]
    fn at_level_enumerates_tree_rows() {
        let level1: Vec<u16> = NodeAddress::at_level(1).iter().map(|a| a.raw()).collect();
        assert_eq!(level1, vec![1, 2, 3, 4, 5]);

        let level2 = NodeAddress::at_level(2);
        assert_eq!(level2.len(), 25);
        assert!(level2.iter().all(|a| a.depth() == 2));
        assert!(level2.iter().all(|a| NodeAddress::is_valid(a.raw())));

        assert!(NodeAddress::at_level(0).is_empty());
        assert!(NodeAddress::at_level(5).is_empty());
    }

    #[test]
    fn data_rate_tiers() {
        assert_eq!(DataRate::from_tier(1).unwrap(), DataRate::Mbps1);
        assert_eq!(DataRate::from_tier(2).unwrap(), DataRate::Mbps2);
        assert_eq!(DataRate::from_tier(250).unwrap(), DataRate::Kbps250);
        assert_eq!(
            DataRate::from_tier(3).unwrap_err(),
            CoreError::InvalidDataRate(3)
        );
        assert_eq!(DataRate::default(), DataRate::Mbps1);
        assert_eq!(DataRate::Kbps250.tier(), 250);
    }

    #[test]
    fn mesh_node_id_bounds() {
        assert!(MeshNodeId::MASTER.is_master());
        assert_eq!(MeshNodeId::try_from(22).unwrap(), MeshNodeId(22));
        assert!(MeshNodeId::try_from(256).is_err());
    }

    #[test]
    fn interface_mode_capabilities() {
        assert!(InterfaceMode::Tun.requires_mesh());
        assert!(!InterfaceMode::Tun.is_ethernet());
        assert!(InterfaceMode::Tap.is_ethernet());
        assert!(!InterfaceMode::Tap.requires_mesh());
        assert_eq!(InterfaceMode::default(), InterfaceMode::Tap);
    }
}
