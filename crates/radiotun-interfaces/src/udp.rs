//! UDP emulation of the radio network.
//!
//! Provides [`UdpRadio`], a [`RadioTransport`] that maps every node address
//! onto a UDP port on one host so several bridges can be wired together
//! without radio hardware. Like the radio driver it stands in for, it has no
//! blocking I/O: [`RadioTransport::update`] drains the socket into an
//! internal queue that [`RadioTransport::read`] consumes.
//!
//! Each datagram starts with an 8-byte little-endian network header:
//!
//! ```text
//! from u16 | to u16 | id u16 | type u8 | channel u8 | payload
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use radiotun_core::constants::{EXTERNAL_DATA_TYPE, MAX_RADIO_PAYLOAD, MULTICAST_ADDRESS};
use radiotun_core::{MeshNodeId, NodeAddress};
use tracing::{debug, trace, warn};

use crate::error::InterfaceError;
use crate::traits::{RadioHeader, RadioSettings, RadioTransport};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of the emulated network header.
pub const HEADER_LEN: usize = 8;

/// Default port of node `00`; node `N` listens on `DEFAULT_BASE_PORT + N`.
pub const DEFAULT_BASE_PORT: u16 = 40_000;

/// Received messages held before the oldest is discarded.
pub const RX_QUEUE_DEPTH: usize = 64;

/// Mesh node registration (node -> master), payload `[node_id]`.
pub const MESH_REGISTER_TYPE: u8 = 201;

/// Mesh address table (master -> nodes), payload `[node_id, addr lo, addr hi]*`.
pub const MESH_TABLE_TYPE: u8 = 202;

/// How often a mesh node re-registers with the master.
pub const REGISTER_INTERVAL: Duration = Duration::from_secs(2);

/// How often the master re-sends its table even when nothing changed.
pub const TABLE_PUSH_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`UdpRadio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpRadioConfig {
    /// Host every emulated node lives on.
    pub host: IpAddr,
    /// Port of node `00`.
    pub base_port: u16,
}

impl Default for UdpRadioConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: DEFAULT_BASE_PORT,
        }
    }
}

impl UdpRadioConfig {
    /// Socket address emulating node `address`.
    pub fn socket_addr(&self, address: NodeAddress) -> Result<SocketAddr, InterfaceError> {
        let port = self.base_port.checked_add(address.raw()).ok_or_else(|| {
            InterfaceError::Configuration(format!(
                "base port {} too high for node {address}",
                self.base_port
            ))
        })?;
        Ok(SocketAddr::new(self.host, port))
    }
}

// ---------------------------------------------------------------------------
// Header codec
// ---------------------------------------------------------------------------

fn encode_header(header: &RadioHeader, channel: u8) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0..2].copy_from_slice(&header.from.to_le_bytes());
    out[2..4].copy_from_slice(&header.to.to_le_bytes());
    out[4..6].copy_from_slice(&header.id.to_le_bytes());
    out[6] = header.message_type;
    out[7] = channel;
    out
}

fn decode_header(datagram: &[u8]) -> Option<(RadioHeader, u8)> {
    let raw = datagram.get(..HEADER_LEN)?;
    let from = NodeAddress::new(u16::from_le_bytes([raw[0], raw[1]])).ok()?;
    let to = NodeAddress::new(u16::from_le_bytes([raw[2], raw[3]])).ok()?;
    let header = RadioHeader {
        from,
        to,
        id: u16::from_le_bytes([raw[4], raw[5]]),
        message_type: raw[6],
    };
    Some((header, raw[7]))
}

// ---------------------------------------------------------------------------
// Mesh state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MeshState {
    node_id: MeshNodeId,
    table: BTreeMap<MeshNodeId, NodeAddress>,
    last_sent: Option<Instant>,
    dirty: bool,
    /// The master's table lists this node (non-master only).
    assigned: bool,
}

impl MeshState {
    fn due(&self, interval: Duration) -> bool {
        self.last_sent.is_none_or(|at| at.elapsed() >= interval)
    }

    fn encode_table(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.table.len() * 3);
        for (id, address) in &self.table {
            out.push(id.0);
            out.extend_from_slice(&address.to_le_bytes());
        }
        out
    }

    fn apply_table(&mut self, payload: &[u8], local: NodeAddress) {
        self.table = payload
            .chunks_exact(3)
            .filter_map(|entry| {
                let address = NodeAddress::new(u16::from_le_bytes([entry[1], entry[2]])).ok()?;
                Some((MeshNodeId(entry[0]), address))
            })
            .collect();
        self.assigned = self.table.get(&self.node_id) == Some(&local);
    }
}

// ---------------------------------------------------------------------------
// UdpRadio
// ---------------------------------------------------------------------------

/// Radio network emulated over UDP datagrams.
pub struct UdpRadio {
    config: UdpRadioConfig,
    socket: Option<UdpSocket>,
    local: NodeAddress,
    channel: u8,
    multicast_relay: bool,
    next_id: u16,
    rx: VecDeque<(RadioHeader, Vec<u8>)>,
    mesh: Option<MeshState>,
}

impl UdpRadio {
    pub fn new(config: UdpRadioConfig) -> Self {
        Self {
            config,
            socket: None,
            local: NodeAddress::ROOT,
            channel: 0,
            multicast_relay: false,
            next_id: 0,
            rx: VecDeque::new(),
            mesh: None,
        }
    }

    fn socket(&self) -> Result<&UdpSocket, InterfaceError> {
        self.socket.as_ref().ok_or(InterfaceError::NotStarted)
    }

    fn send_raw(
        &mut self,
        dest: NodeAddress,
        header_to: NodeAddress,
        message_type: u8,
        payload: &[u8],
    ) -> Result<(), InterfaceError> {
        if payload.len() > MAX_RADIO_PAYLOAD {
            return Err(InterfaceError::TransmitFailed(format!(
                "payload of {} bytes exceeds {MAX_RADIO_PAYLOAD}",
                payload.len()
            )));
        }
        let header = RadioHeader {
            from: self.local,
            to: header_to,
            id: self.next_id,
            message_type,
        };
        self.next_id = self.next_id.wrapping_add(1);

        let mut datagram = Vec::with_capacity(HEADER_LEN + payload.len());
        datagram.extend_from_slice(&encode_header(&header, self.channel));
        datagram.extend_from_slice(payload);

        let target = self.config.socket_addr(dest)?;
        self.socket()?
            .send_to(&datagram, target)
            .map_err(|e| InterfaceError::TransmitFailed(format!("to {dest}: {e}")))?;
        trace!("udp radio: {} bytes to {dest} (type {message_type})", payload.len());
        Ok(())
    }

    /// Children of this node one level further down the tree.
    fn children(&self) -> Vec<NodeAddress> {
        let shift = 3 * self.local.depth();
        (1..=5u16)
            .filter_map(|digit| {
                let raw = self.local.raw() | digit.checked_shl(shift)?;
                NodeAddress::new(raw).ok()
            })
            .filter(|child| child.depth() == self.local.depth() + 1)
            .collect()
    }

    fn handle_datagram(&mut self, header: RadioHeader, payload: &[u8]) {
        match header.message_type {
            MESH_REGISTER_TYPE => {
                if let (Some(mesh), Some(&id)) = (self.mesh.as_mut(), payload.first()) {
                    if mesh.node_id.is_master() {
                        let id = MeshNodeId(id);
                        if mesh.table.insert(id, header.from) != Some(header.from) {
                            debug!("mesh: node id {id} registered at {}", header.from);
                            mesh.dirty = true;
                        }
                    }
                }
            }
            MESH_TABLE_TYPE => {
                let local = self.local;
                if let Some(mesh) = self.mesh.as_mut() {
                    mesh.apply_table(payload, local);
                }
            }
            _ => {
                if header.to.is_multicast() && self.multicast_relay {
                    for child in self.children() {
                        if let Err(e) = self.send_raw(child, header.to, header.message_type, payload) {
                            debug!("udp radio: relay to {child} failed: {e}");
                        }
                    }
                }
                if self.rx.len() >= RX_QUEUE_DEPTH {
                    warn!("udp radio: receive queue full, discarding oldest message");
                    self.rx.pop_front();
                }
                self.rx.push_back((header, payload.to_vec()));
            }
        }
    }

    fn drain_socket(&mut self) {
        let mut buf = vec![0u8; HEADER_LEN + MAX_RADIO_PAYLOAD];
        loop {
            let Some(socket) = self.socket.as_ref() else {
                return;
            };
            match socket.recv_from(&mut buf) {
                Ok((n, src)) => {
                    let Some((header, channel)) = decode_header(&buf[..n]) else {
                        debug!("udp radio: malformed datagram from {src}");
                        continue;
                    };
                    if channel != self.channel {
                        continue;
                    }
                    if header.to != self.local && !header.to.is_multicast() {
                        continue;
                    }
                    let payload = buf[HEADER_LEN..n].to_vec();
                    self.handle_datagram(header, &payload);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // ICMP port-unreachable from an earlier send, typically
                    debug!("udp radio: recv error: {e}");
                    return;
                }
            }
        }
    }
}

impl RadioTransport for UdpRadio {
    fn begin(&mut self, settings: &RadioSettings, local: NodeAddress) -> Result<(), InterfaceError> {
        let bind = self.config.socket_addr(local)?;
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;

        self.socket = Some(socket);
        self.local = local;
        self.channel = settings.channel;
        self.multicast_relay = settings.multicast_relay;
        self.mesh = settings.mesh.map(|mesh| {
            let mut table = BTreeMap::new();
            table.insert(mesh.node_id, local);
            MeshState {
                node_id: mesh.node_id,
                table,
                last_sent: None,
                dirty: false,
                assigned: mesh.node_id.is_master(),
            }
        });

        tracing::info!(
            "udp radio: node {local} on {bind}, channel {}, {}",
            settings.channel,
            settings.data_rate
        );
        Ok(())
    }

    fn local_address(&self) -> NodeAddress {
        self.local
    }

    fn update(&mut self) {
        self.drain_socket();
    }

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> Option<(RadioHeader, usize)> {
        let (header, payload) = self.rx.pop_front()?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Some((header, n))
    }

    fn write(&mut self, to: NodeAddress, payload: &[u8]) -> Result<(), InterfaceError> {
        self.send_raw(to, to, EXTERNAL_DATA_TYPE, payload)
    }

    fn multicast(&mut self, payload: &[u8], level: u8) -> Result<(), InterfaceError> {
        let targets = NodeAddress::at_level(level);
        if targets.is_empty() {
            return Err(InterfaceError::TransmitFailed(format!(
                "no nodes at level {level}"
            )));
        }
        let group = NodeAddress::new(MULTICAST_ADDRESS)?;
        let local = self.local;
        let mut delivered = 0;
        for target in targets.into_iter().filter(|t| *t != local) {
            match self.send_raw(target, group, EXTERNAL_DATA_TYPE, payload) {
                Ok(()) => delivered += 1,
                Err(e) => trace!("udp radio: multicast to {target} failed: {e}"),
            }
        }
        if delivered == 0 {
            return Err(InterfaceError::TransmitFailed(format!(
                "multicast to level {level} reached no node"
            )));
        }
        Ok(())
    }

    fn resolve(&self, node_id: MeshNodeId) -> Option<NodeAddress> {
        self.mesh.as_ref()?.table.get(&node_id).copied()
    }

    fn service_address_assignment(&mut self) {
        let Some(mesh) = self.mesh.as_ref() else {
            return;
        };
        if !mesh.node_id.is_master() || !(mesh.dirty || mesh.due(TABLE_PUSH_INTERVAL)) {
            return;
        }
        let table = mesh.encode_table();
        let members: Vec<NodeAddress> = mesh
            .table
            .values()
            .copied()
            .filter(|address| *address != self.local)
            .collect();
        for member in members {
            if let Err(e) = self.send_raw(member, member, MESH_TABLE_TYPE, &table) {
                debug!("mesh: table push to {member} failed: {e}");
            }
        }
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.dirty = false;
            mesh.last_sent = Some(Instant::now());
        }
    }

    fn needs_address(&self) -> bool {
        self.mesh.as_ref().is_some_and(|mesh| !mesh.assigned)
    }

    /// Register `(node id, address)` with the master, at most once per
    /// [`REGISTER_INTERVAL`].
    fn request_address(&mut self) {
        let Some(mesh) = self.mesh.as_ref() else {
            return;
        };
        if mesh.node_id.is_master() || !mesh.due(REGISTER_INTERVAL) {
            return;
        }
        let id = mesh.node_id.0;
        if let Err(e) = self.send_raw(NodeAddress::ROOT, NodeAddress::ROOT, MESH_REGISTER_TYPE, &[id]) {
            debug!("mesh: registration failed: {e}");
        }
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.last_sent = Some(Instant::now());
        }
    }
}
