//! Instance identity: local address plus the two service ports
//!
//! Identity only distinguishes hosts. Two processes on one host produce the
//! same id and filter each other's datagrams as their own.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

/// Public address used only to pick the outbound interface; nothing is sent.
const ROUTE_PROBE: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Address of the interface that routes to the outside world.
///
/// Falls back to loopback when no route exists.
pub async fn detect_local_ip() -> IpAddr {
    let probe = async {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(ROUTE_PROBE).await?;
        socket.local_addr()
    };

    match probe.await {
        Ok(addr) => addr.ip(),
        Err(e) => {
            debug!("Local address detection failed ({}), using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// `"{ip}:{backend_port}:{frontend_port}"`
pub fn instance_id(local_ip: IpAddr, backend_port: u16, frontend_port: u16) -> String {
    format!("{}:{}:{}", local_ip, backend_port, frontend_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_joins_address_and_ports() {
        let ip: IpAddr = "192.168.1.20".parse().unwrap();
        assert_eq!(instance_id(ip, 9000, 5173), "192.168.1.20:9000:5173");
    }

    #[tokio::test]
    async fn detection_always_yields_an_address() {
        let ip = detect_local_ip().await;
        assert!(!ip.is_unspecified());
    }
}
