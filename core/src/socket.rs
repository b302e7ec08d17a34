//! Low-level socket option tuning for stream and datagram sockets.
//!
//! Generic, protocol-agnostic knobs applied at construction time. Exposed as
//! free functions operating on a raw fd/handle rather than a method on a
//! specific socket type, so both `compio::net::TcpStream` and
//! `compio::net::UdpSocket` can reuse them.
//!
//! # Safety
//!
//! These functions briefly wrap the socket's raw fd/handle in a
//! [`socket2::Socket`] to reach option-setting APIs `compio` does not expose
//! directly, then `mem::forget` that wrapper so the original socket keeps
//! ownership of the descriptor.

#![allow(unsafe_code)]

use std::io;
use std::time::Duration;

#[cfg(unix)]
fn with_socket2<T, F>(fd: std::os::unix::io::RawFd, f: F) -> io::Result<T>
where
    F: FnOnce(&socket2::Socket) -> io::Result<T>,
{
    use std::os::unix::io::FromRawFd;
    let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
    let result = f(&sock);
    std::mem::forget(sock);
    result
}

#[cfg(windows)]
fn with_socket2<T, F>(handle: std::os::windows::io::RawSocket, f: F) -> io::Result<T>
where
    F: FnOnce(&socket2::Socket) -> io::Result<T>,
{
    use std::os::windows::io::FromRawSocket;
    let sock = unsafe { socket2::Socket::from_raw_socket(handle) };
    let result = f(&sock);
    std::mem::forget(sock);
    result
}

/// Apply the option set used for every reliable-channel stream socket:
/// `TCP_NODELAY`, keepalive, no linger on close, and a finite send timeout.
pub fn configure_stream(stream: &compio::net::TcpStream, send_timeout: Duration) -> io::Result<()> {
    apply(stream, |sock| {
        sock.set_nodelay(true)?;
        sock.set_keepalive(true)?;
        sock.set_linger(None)?;
        sock.set_write_timeout(Some(send_timeout))?;
        Ok(())
    })
}

/// Apply the option set used for the unreliable-channel datagram socket:
/// enlarge send/receive buffers to `buffer_size` and suppress the
/// connection-reset-on-ICMP-unreachable quirk.
pub fn configure_datagram(socket: &compio::net::UdpSocket, buffer_size: usize) -> io::Result<()> {
    apply(socket, |sock| {
        sock.set_recv_buffer_size(buffer_size)?;
        sock.set_send_buffer_size(buffer_size)?;
        suppress_icmp_reset(sock)?;
        Ok(())
    })
}

/// On Windows, UDP sockets by default raise `WSAECONNRESET` on a subsequent
/// recv after receiving an ICMP Port Unreachable for a prior send to a peer
/// with nothing listening (`SIO_UDP_CONNRESET`). This has no equivalent
/// surfaced error on Unix, so it's a no-op there. Disabling the Windows
/// quirk needs a raw `WSAIoctl` call outside what `socket2` exposes; left as
/// a no-op on every platform until that's worth a dedicated FFI dependency.
fn suppress_icmp_reset(_sock: &socket2::Socket) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply<S, F, T>(stream: &S, f: F) -> io::Result<T>
where
    S: std::os::unix::io::AsRawFd,
    F: FnOnce(&socket2::Socket) -> io::Result<T>,
{
    with_socket2(stream.as_raw_fd(), f)
}

#[cfg(windows)]
fn apply<S, F, T>(stream: &S, f: F) -> io::Result<T>
where
    S: std::os::windows::io::AsRawSocket,
    F: FnOnce(&socket2::Socket) -> io::Result<T>,
{
    with_socket2(stream.as_raw_socket(), f)
}

#[cfg(not(any(unix, windows)))]
fn apply<S, F, T>(_stream: &S, _f: F) -> io::Result<()> {
    Ok(())
}
