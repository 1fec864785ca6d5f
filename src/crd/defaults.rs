//! Defaulting applied to Ironic records before validation.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use super::ironic::{Dhcp, IronicSpec};

/// Offset of the first DHCP address from the network address.
const RANGE_BEGIN_OFFSET: u128 = 10;

/// Offset of the last DHCP address from the broadcast address.
const RANGE_END_OFFSET: u128 = 2;

/// Compute the default DHCP range for a network: from network + 10 to
/// broadcast - 2. Returns `None` when the network is too small.
pub fn default_dhcp_range(network: &IpNet) -> Option<(IpAddr, IpAddr)> {
    match network {
        IpNet::V4(net) => {
            let first = u128::from(u32::from(net.network()));
            let last = u128::from(u32::from(net.broadcast()));
            let (begin, end) = offset_range(first, last)?;
            Some((
                IpAddr::V4(Ipv4Addr::from(u32::try_from(begin).ok()?)),
                IpAddr::V4(Ipv4Addr::from(u32::try_from(end).ok()?)),
            ))
        }
        IpNet::V6(net) => {
            let first = u128::from(net.network());
            let last = u128::from(net.broadcast());
            let (begin, end) = offset_range(first, last)?;
            Some((
                IpAddr::V6(Ipv6Addr::from(begin)),
                IpAddr::V6(Ipv6Addr::from(end)),
            ))
        }
    }
}

fn offset_range(first: u128, last: u128) -> Option<(u128, u128)> {
    let begin = first.checked_add(RANGE_BEGIN_OFFSET)?;
    let end = last.checked_sub(RANGE_END_OFFSET)?;
    (begin < end).then_some((begin, end))
}

/// Fill in a missing DHCP range from the network CIDR. Values that are
/// already set are never touched, so applying this twice is a no-op.
pub fn set_dhcp_defaults(dhcp: &mut Dhcp) {
    let Some(network) = dhcp.network_cidr().and_then(|c| c.parse::<IpNet>().ok()) else {
        return;
    };
    let Some((begin, end)) = default_dhcp_range(&network) else {
        return;
    };

    if dhcp.range_begin.as_deref().is_none_or(str::is_empty) {
        dhcp.range_begin = Some(begin.to_string());
    }
    if dhcp.range_end.as_deref().is_none_or(str::is_empty) {
        dhcp.range_end = Some(end.to_string());
    }
}

/// Apply all defaults to an Ironic spec.
pub fn set_ironic_defaults(spec: &mut IronicSpec) {
    if let Some(dhcp) = spec.networking.dhcp.as_mut() {
        set_dhcp_defaults(dhcp);
    }
}
