//! UDP datagram transport: one ≤250-byte frame per datagram, broadcast
//! capable, with a 6-byte link address derived from IPv4 address + port.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use nearcast_core::{LinkAddr, OutboundAction, ShareSession, MAX_FRAME_SIZE};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
    /// Link addresses of our own interfaces. Broadcast datagrams loop back
    /// to the sending host; frames from these origins are ignored.
    local: HashSet<LinkAddr>,
    peers: Mutex<HashSet<LinkAddr>>,
}

impl UdpTransport {
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(UdpTransport {
            socket,
            port,
            local: local_link_addrs(port),
            peers: Mutex::new(HashSet::new()),
        })
    }

    /// Record an address as a communication peer. Idempotent: re-registering
    /// succeeds trivially. The UDP mapping needs no link-layer handshake, so
    /// this cannot fail today; callers still treat `false` as a hard stop.
    pub async fn register_peer(&self, addr: LinkAddr) -> bool {
        self.peers.lock().await.insert(addr);
        true
    }

    /// Fire one frame at a peer or at the broadcast address. The outcome is
    /// also reported through the session's send-completion hook, mirroring a
    /// link layer that confirms delivery attempts asynchronously.
    pub async fn send(
        &self,
        addr: LinkAddr,
        bytes: &[u8],
        session: &Mutex<ShareSession>,
    ) -> std::io::Result<()> {
        debug_assert!(bytes.len() <= MAX_FRAME_SIZE);
        let dest = link_to_sock(addr, self.port);
        let result = self.socket.send_to(bytes, dest).await.map(|_| ());
        session.lock().await.on_send_result(addr, result.is_ok());
        result
    }
}

/// Receive task: decode origins, hand datagrams to the session's classifier,
/// and perform whatever replies it asks for. Runs for the process lifetime.
pub fn spawn_receiver(
    transport: Arc<UdpTransport>,
    session: Arc<Mutex<ShareSession>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let (n, from) = match transport.socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(err) => {
                    warn!(%err, "udp receive failed, stopping receiver");
                    return;
                }
            };
            let Some(origin) = sock_to_link(from) else {
                continue;
            };
            if transport.local.contains(&origin) {
                trace!(%origin, "ignoring own broadcast echo");
                continue;
            }
            let actions = session.lock().await.on_datagram(origin, &buf[..n]);
            for action in actions {
                match action {
                    OutboundAction::ReplyTo(to, frame) => {
                        // Register first; a failed registration silently
                        // drops the reply.
                        if transport.register_peer(to).await {
                            let _ = transport.send(to, &frame, &session).await;
                        }
                    }
                }
            }
        }
    })
}

/// 6-byte link address of a UDP peer: IPv4 octets + big-endian port.
fn sock_to_link(addr: SocketAddr) -> Option<LinkAddr> {
    let IpAddr::V4(ip) = addr.ip() else {
        return None;
    };
    let o = ip.octets();
    let p = addr.port().to_be_bytes();
    Some(LinkAddr::from_bytes([o[0], o[1], o[2], o[3], p[0], p[1]]))
}

fn link_to_sock(addr: LinkAddr, default_port: u16) -> SocketAddr {
    if addr.is_broadcast() {
        return SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, default_port));
    }
    let b = addr.as_bytes();
    SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::new(b[0], b[1], b[2], b[3]),
        u16::from_be_bytes([b[4], b[5]]),
    ))
}

fn local_link_addrs(port: u16) -> HashSet<LinkAddr> {
    let mut out = HashSet::new();
    if let Ok(ifaces) = get_if_addrs::get_if_addrs() {
        for iface in ifaces {
            if let IpAddr::V4(ip) = iface.ip() {
                let o = ip.octets();
                let p = port.to_be_bytes();
                out.insert(LinkAddr::from_bytes([o[0], o[1], o[2], o[3], p[0], p[1]]));
            }
        }
    }
    out
}
