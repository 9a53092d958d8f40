use crate::app::error::ServeError;
use crate::app::models::GeneralSettings;
use std::net::IpAddr;

/// Loopback or private-network caller.
///
/// IPv4-mapped IPv6 peers (`::ffff:10.0.0.7`) are judged by their IPv4 form,
/// which is how dual-stack listeners report IPv4 clients.
pub fn is_local(addr: IpAddr) -> bool {
    match canonical(addr) {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// Refuses non-local callers when external browsing is disabled.
pub fn check_browsing(settings: &GeneralSettings, peer: IpAddr) -> Result<(), ServeError> {
    if settings.disable_external_network_browsing && !is_local(peer) {
        log::warn!("Refused browsing request from {}", peer);
        return Err(ServeError::AccessDenied);
    }
    Ok(())
}

fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
        v4 => v4,
    }
}
