use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tracing::{debug, info};

/// A UDP socket connected to the server, so that plain `send` / `recv` can be used and only
///  datagrams from the server are received
pub async fn connect_datagram(server: SocketAddr) -> anyhow::Result<Arc<UdpSocket>> {
    let local: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse()?
    }
    else {
        "[::]:0".parse()?
    };

    let socket = UdpSocket::bind(local).await
        .context("bind")?;
    socket.connect(server).await
        .with_context(|| format!("connect to {}", server))?;

    info!("connected to {} from {}", server, socket.local_addr()?);
    Ok(Arc::new(socket))
}

/// Connects a TCP stream, optionally selecting the congestion control algorithm by name (Linux only)
pub async fn connect_stream(server: SocketAddr, congestion_control: Option<String>) -> anyhow::Result<TcpStream> {
    let std_stream = tokio::task::spawn_blocking(move || -> anyhow::Result<std::net::TcpStream> {
        let socket = Socket::new(Domain::for_address(server), Type::STREAM, Some(Protocol::TCP))
            .context("socket")?;
        socket.set_reuse_address(true)
            .context("sockopt SO_REUSEADDR")?;

        if let Some(algorithm) = &congestion_control {
            set_congestion_control(&socket, algorithm)?;
        }

        socket.connect(&server.into())
            .with_context(|| format!("connect to {}", server))?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }).await??;

    let stream = TcpStream::from_std(std_stream)?;
    info!("connected to {} from {}", server, stream.local_addr()?);
    Ok(stream)
}

#[cfg(target_os = "linux")]
fn set_congestion_control(socket: &Socket, algorithm: &str) -> anyhow::Result<()> {
    debug!("setting TCP congestion control to {}", algorithm);
    socket.set_tcp_congestion(algorithm.as_bytes())
        .with_context(|| format!("sockopt TCP_CONGESTION {}", algorithm))
}

#[cfg(not(target_os = "linux"))]
fn set_congestion_control(_socket: &Socket, algorithm: &str) -> anyhow::Result<()> {
    anyhow::bail!("selecting the congestion control algorithm ({}) is only supported on Linux", algorithm)
}

pub async fn bind_datagram(port: u16) -> anyhow::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
        .with_context(|| format!("bind to UDP port {}", port))?;
    info!("bound UDP socket to {}", socket.local_addr()?);
    Ok(socket)
}

pub fn bind_stream(port: u16) -> anyhow::Result<TcpListener> {
    let socket = TcpSocket::new_v4()
        .context("socket")?;
    socket.set_reuseaddr(true)
        .context("sockopt SO_REUSEADDR")?;
    socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))
        .with_context(|| format!("bind to TCP port {}", port))?;
    let listener = socket.listen(1024)
        .context("listen")?;
    info!("listening on {}", listener.local_addr()?);
    Ok(listener)
}
