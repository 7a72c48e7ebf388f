use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::agent_modules::error::AgentError;

/// Any routable address works; nothing is sent, the OS only picks a route.
pub const OUTBOUND_PROBE_TARGET: &str = "8.8.8.8:80";

/// Address of the interface the OS would use for outbound traffic.
pub async fn resolve_outbound_ip() -> Result<String, AgentError> {
    resolve_local_ip_toward(OUTBOUND_PROBE_TARGET).await
}

/// Connects a UDP socket to `target` and reports the local address picked for it.
/// The socket is dropped before returning.
pub async fn resolve_local_ip_toward(target: &str) -> Result<String, AgentError> {
    let bind_addr = if target.starts_with('[') { "[::]:0" } else { "0.0.0.0:0" };

    let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
        error!(error = %e, "Failed to bind UDP socket for outbound IP detection.");
        AgentError::OutboundIp(e.to_string())
    })?;
    socket.connect(target).await.map_err(|e| {
        error!(target = %target, error = %e, "Failed to route UDP socket for outbound IP detection.");
        AgentError::OutboundIp(e.to_string())
    })?;
    let local_addr = socket
        .local_addr()
        .map_err(|e| AgentError::OutboundIp(e.to_string()))?;

    let ip = local_addr.ip();
    if ip.is_unspecified() {
        return Err(AgentError::OutboundIp(format!(
            "no local address selected for {target}"
        )));
    }
    debug!(local_addr = %local_addr, "Resolved outbound endpoint.");
    Ok(ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_target_resolves_to_loopback() {
        let ip = resolve_local_ip_toward("127.0.0.1:9").await.unwrap();
        assert_eq!(ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_port_is_stripped() {
        let ip = resolve_local_ip_toward("127.0.0.1:65000").await.unwrap();
        assert!(!ip.contains(':'));
    }

    #[tokio::test]
    async fn test_unresolvable_target_is_an_error() {
        let result = resolve_local_ip_toward("not a socket address").await;
        assert!(matches!(result, Err(AgentError::OutboundIp(_))));
    }
}
