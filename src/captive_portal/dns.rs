//! Captive DNS：任何域名都解析到 AP 自己的地址

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

pub const DNS_PORT: u16 = 53;
/// 应答 TTL（秒）
pub const ANSWER_TTL: u32 = 60;

const HEADER_LEN: usize = 12;
const MAX_PACKET_LEN: usize = 512;

const FLAG_QR: u8 = 0x80;
const FLAG_AA: u8 = 0x04;
const FLAG_RD: u8 = 0x01;
const MASK_OPCODE: u8 = 0x78;

const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;

/// 问题区结束位置（含 QTYPE/QCLASS），格式不对返回 `None`
fn question_end(packet: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let len = *packet.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        // 问题区里不应该出现压缩指针
        if len & 0xC0 != 0 {
            return None;
        }
        pos += len;
    }
    let end = pos + 4;
    (end <= packet.len()).then_some(end)
}

/// 根据查询报文构造应答
///
/// - 单问题的标准查询：A/ANY 返回一条指向 `ip` 的 A 记录，其它类型返回空的 NOERROR
/// - 其它查询：只回报头，RCODE 为 NOERROR
/// - 应答报文或格式错误的报文：丢弃
pub fn build_reply(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let flags = query[2];
    if flags & FLAG_QR != 0 {
        return None;
    }

    let opcode = (flags & MASK_OPCODE) >> 3;
    let qdcount = u16::from_be_bytes([query[4], query[5]]);

    if opcode == 0 && qdcount == 1 {
        if let Some(end) = question_end(query) {
            let qtype = u16::from_be_bytes([query[end - 4], query[end - 3]]);
            let qclass = u16::from_be_bytes([query[end - 2], query[end - 1]]);

            let mut reply = Vec::with_capacity(end + 16);
            reply.extend_from_slice(&query[..end]);
            reply[2] = FLAG_QR | FLAG_AA | (flags & FLAG_RD);
            reply[3] = 0;
            // NS/AR 清零，EDNS 之类的附加记录不回
            reply[8..HEADER_LEN].fill(0);

            if (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN {
                reply[6..8].copy_from_slice(&1u16.to_be_bytes());
                // 名字压缩指针指向问题区的名字
                reply.extend_from_slice(&[0xC0, HEADER_LEN as u8]);
                reply.extend_from_slice(&TYPE_A.to_be_bytes());
                reply.extend_from_slice(&CLASS_IN.to_be_bytes());
                reply.extend_from_slice(&ANSWER_TTL.to_be_bytes());
                reply.extend_from_slice(&4u16.to_be_bytes());
                reply.extend_from_slice(&ip.octets());
            } else {
                reply[6..8].fill(0);
            }
            return Some(reply);
        }
    }

    let mut reply = query[..HEADER_LEN].to_vec();
    reply[2] = FLAG_QR | (flags & (MASK_OPCODE | FLAG_RD));
    reply[3] = 0;
    reply[4..HEADER_LEN].fill(0);
    Some(reply)
}

/// DNS 使用的 UDP 套接字，`recv_from` 必须是非阻塞的
pub trait DnsSocket {
    fn bind(&mut self, addr: SocketAddrV4) -> io::Result<()>;

    /// 没有待处理的报文时返回 `Ok(None)`
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()>;

    fn close(&mut self);
}

/// 标准库 UDP 实现
#[derive(Debug, Default)]
pub struct UdpDnsSocket {
    socket: Option<UdpSocket>,
}

impl UdpDnsSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl DnsSocket for UdpDnsSocket {
    fn bind(&mut self, addr: SocketAddrV4) -> io::Result<()> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some(socket) = &self.socket else {
            return Ok(None);
        };
        match socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        match &self.socket {
            Some(socket) => socket.send_to(buf, addr).map(|_| ()),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "dns socket closed",
            )),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

pub struct DnsResponder<D> {
    socket: D,
    ip: Option<Ipv4Addr>,
    buf: [u8; MAX_PACKET_LEN],
}

impl<D: DnsSocket> DnsResponder<D> {
    pub fn new(socket: D) -> Self {
        Self {
            socket,
            ip: None,
            buf: [0; MAX_PACKET_LEN],
        }
    }

    /// 绑定到 `ip:53`，之后所有查询都应答 `ip`
    pub fn start(&mut self, ip: Ipv4Addr) -> io::Result<()> {
        self.socket.bind(SocketAddrV4::new(ip, DNS_PORT))?;
        self.ip = Some(ip);
        log::info!("[DNS] Responder started on {}:{}", ip, DNS_PORT);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ip.is_some()
    }

    /// 处理一个待处理的查询，没有查询时立即返回 `false`
    pub fn process_next_request(&mut self) -> bool {
        let Some(ip) = self.ip else {
            return false;
        };

        let (len, peer) = match self.socket.recv_from(&mut self.buf) {
            Ok(Some(received)) => received,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("[DNS] recv failed: {}", e);
                return false;
            }
        };

        match build_reply(&self.buf[..len], ip) {
            Some(reply) => {
                if let Err(e) = self.socket.send_to(&reply, peer) {
                    log::warn!("[DNS] reply to {} failed: {}", peer, e);
                }
            }
            None => log::debug!("[DNS] dropped {} byte packet from {}", len, peer),
        }
        true
    }

    pub fn stop(&mut self) {
        if self.ip.take().is_some() {
            self.socket.close();
            log::info!("[DNS] Responder stopped");
        }
    }

    pub fn socket(&self) -> &D {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut D {
        &mut self.socket
    }
}
