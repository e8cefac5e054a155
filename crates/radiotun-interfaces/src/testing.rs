//! In-memory doubles for the bridge collaborators, plus conformance
//! assertions for [`VirtualInterface`] implementations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use radiotun_interfaces::testing::{MemoryInterface, MockTransport};
//!
//! let iface = MemoryInterface::new(InterfaceMode::Tap);
//! iface.inject(&frame);
//! let radio = MockTransport::new(NodeAddress::ROOT);
//! let observer = radio.clone(); // inspect calls after moving `radio` into a stage
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use radiotun_core::constants::{EXTERNAL_DATA_TYPE, MAX_FRAME_SIZE};
use radiotun_core::{InterfaceMode, MeshNodeId, NodeAddress};

use crate::error::InterfaceError;
use crate::traits::{RadioHeader, RadioSettings, RadioTransport, VirtualInterface};

// ---------------------------------------------------------------------------
// MemoryInterface
// ---------------------------------------------------------------------------

/// Outcome of one scripted `write_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedWrite {
    /// Accept the whole frame.
    Full,
    /// Accept nothing (returns 0).
    Zero,
    /// Accept only this many bytes.
    Short(usize),
    /// Fail with an I/O error.
    Error,
}

/// A virtual interface backed by memory.
///
/// Frames given to [`inject`](Self::inject) become readable; every accepted
/// write is recorded. Writes follow the script set with
/// [`script_writes`](Self::script_writes), then accept whole frames.
pub struct MemoryInterface {
    name: String,
    mode: InterfaceMode,
    mtu: usize,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    readable: Condvar,
    written: Mutex<Vec<Vec<u8>>>,
    write_script: Mutex<VecDeque<ScriptedWrite>>,
    write_attempts: AtomicUsize,
    fail_next_read: AtomicBool,
    closed: AtomicBool,
}

impl MemoryInterface {
    pub fn new(mode: InterfaceMode) -> Self {
        Self {
            name: "mem0".to_string(),
            mode,
            mtu: MAX_FRAME_SIZE,
            inbound: Mutex::new(VecDeque::new()),
            readable: Condvar::new(),
            written: Mutex::new(Vec::new()),
            write_script: Mutex::new(VecDeque::new()),
            write_attempts: AtomicUsize::new(0),
            fail_next_read: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Make `frame` available to the next read, as if the kernel routed it here.
    pub fn inject(&self, frame: &[u8]) {
        self.inbound.lock().push_back(frame.to_vec());
        self.readable.notify_all();
    }

    /// Frames still waiting to be read.
    pub fn pending(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Frames accepted by `write_frame`, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    /// Number of `write_frame` calls, including rejected ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn script_writes(&self, script: impl IntoIterator<Item = ScriptedWrite>) {
        self.write_script.lock().extend(script);
    }

    /// Fail the next `read_frame` with a transient I/O error.
    pub fn fail_next_read(&self) {
        let inbound = self.inbound.lock();
        self.fail_next_read.store(true, Ordering::SeqCst);
        drop(inbound);
        self.readable.notify_all();
    }

    fn check_open(&self) -> Result<(), InterfaceError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(InterfaceError::Closed)
        } else {
            Ok(())
        }
    }
}

impl VirtualInterface for MemoryInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> InterfaceMode {
        self.mode
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn close(&self) {
        // Flip the flag under the lock a waiter checks it under.
        let inbound = self.inbound.lock();
        self.closed.store(true, Ordering::SeqCst);
        drop(inbound);
        self.readable.notify_all();
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool, InterfaceError> {
        let deadline = Instant::now() + timeout;
        let mut inbound = self.inbound.lock();
        loop {
            self.check_open()?;
            if !inbound.is_empty() || self.fail_next_read.load(Ordering::SeqCst) {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.readable.wait_for(&mut inbound, remaining);
        }
    }

    fn read_frame(&self, buf: &mut [u8]) -> Result<usize, InterfaceError> {
        self.check_open()?;
        if self.fail_next_read.swap(false, Ordering::SeqCst) {
            return Err(std::io::Error::other("injected read failure").into());
        }
        let frame = self.inbound.lock().pop_front().ok_or_else(|| {
            InterfaceError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock))
        })?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<usize, InterfaceError> {
        self.check_open()?;
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.write_script.lock().pop_front().unwrap_or(ScriptedWrite::Full);
        match step {
            ScriptedWrite::Full => {
                self.written.lock().push(frame.to_vec());
                Ok(frame.len())
            }
            ScriptedWrite::Zero => Ok(0),
            ScriptedWrite::Short(n) => {
                let n = n.min(frame.len());
                self.written.lock().push(frame[..n].to_vec());
                Ok(n)
            }
            ScriptedWrite::Error => Err(std::io::Error::other("injected write failure").into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// A transport operation recorded by [`MockTransport`].
///
/// Housekeeping ticks are counted rather than recorded; each call carries
/// the number of ticks that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Write { to: NodeAddress, payload: Vec<u8> },
    Multicast { level: u8, payload: Vec<u8> },
    Resolve(MeshNodeId),
    ServiceAddressAssignment,
    RequestAddress,
}

/// One recorded call with its timestamp and preceding tick count.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub updates_before: u64,
    pub call: TransportCall,
}

#[derive(Debug, Default)]
struct MockState {
    settings: Option<RadioSettings>,
    inbound: VecDeque<(RadioHeader, Vec<u8>)>,
    mesh: HashMap<MeshNodeId, NodeAddress>,
    fail_writes: bool,
    needs_address: bool,
    updates: u64,
    calls: Vec<RecordedCall>,
}

/// A scripted radio transport.
///
/// Clones share state, so a test can keep one clone to feed inbound
/// messages and inspect calls while the bridge owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    local: NodeAddress,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(local: NodeAddress) -> Self {
        Self {
            local,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue a message as if `from` had sent it to this node.
    pub fn push_inbound(&self, from: NodeAddress, payload: &[u8]) {
        let header = RadioHeader {
            from,
            to: self.local,
            id: 0,
            message_type: EXTERNAL_DATA_TYPE,
        };
        self.state.lock().inbound.push_back((header, payload.to_vec()));
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    pub fn set_mapping(&self, node_id: MeshNodeId, address: NodeAddress) {
        self.state.lock().mesh.insert(node_id, address);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Report the node as unaddressed until `request_address` is called.
    pub fn set_needs_address(&self, needs: bool) {
        self.state.lock().needs_address = needs;
    }

    /// Settings passed to `begin`, if it was called.
    pub fn settings(&self) -> Option<RadioSettings> {
        self.state.lock().settings
    }

    pub fn updates(&self) -> u64 {
        self.state.lock().updates
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.iter().map(|c| c.call.clone()).collect()
    }

    pub fn writes(&self) -> Vec<(NodeAddress, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write { to, payload } => Some((to, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn multicasts(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Multicast { level, payload } => Some((level, payload)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) -> bool {
        let mut state = self.state.lock();
        let updates_before = state.updates;
        state.calls.push(RecordedCall {
            at: Instant::now(),
            updates_before,
            call,
        });
        !state.fail_writes
    }
}

impl RadioTransport for MockTransport {
    fn begin(&mut self, settings: &RadioSettings, local: NodeAddress) -> Result<(), InterfaceError> {
        self.local = local;
        self.state.lock().settings = Some(*settings);
        Ok(())
    }

    fn local_address(&self) -> NodeAddress {
        self.local
    }

    fn update(&mut self) {
        self.state.lock().updates += 1;
    }

    fn available(&self) -> bool {
        !self.state.lock().inbound.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> Option<(RadioHeader, usize)> {
        let (header, payload) = self.state.lock().inbound.pop_front()?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Some((header, n))
    }

    fn write(&mut self, to: NodeAddress, payload: &[u8]) -> Result<(), InterfaceError> {
        let ok = self.record(TransportCall::Write {
            to,
            payload: payload.to_vec(),
        });
        if ok {
            Ok(())
        } else {
            Err(InterfaceError::TransmitFailed(format!("no ack from {to}")))
        }
    }

    fn multicast(&mut self, payload: &[u8], level: u8) -> Result<(), InterfaceError> {
        let ok = self.record(TransportCall::Multicast {
            level,
            payload: payload.to_vec(),
        });
        if ok {
            Ok(())
        } else {
            Err(InterfaceError::TransmitFailed(format!(
                "multicast to level {level} failed"
            )))
        }
    }

    fn resolve(&self, node_id: MeshNodeId) -> Option<NodeAddress> {
        self.record(TransportCall::Resolve(node_id));
        self.state.lock().mesh.get(&node_id).copied()
    }

    fn service_address_assignment(&mut self) {
        self.record(TransportCall::ServiceAddressAssignment);
    }

    fn needs_address(&self) -> bool {
        self.state.lock().needs_address
    }

    fn request_address(&mut self) {
        self.record(TransportCall::RequestAddress);
        self.state.lock().needs_address = false;
    }
}

// ---------------------------------------------------------------------------
// Conformance assertions
// ---------------------------------------------------------------------------

/// Assert that the interface has a name and a usable MTU.
pub fn assert_capabilities_consistent(iface: &impl VirtualInterface) {
    assert!(!iface.name().is_empty(), "interface name must not be empty");
    assert!(iface.mtu() > 0, "MTU must be positive");
}

/// Assert that waiting on an idle interface returns `Ok(false)` after
/// roughly `timeout` rather than blocking forever or failing.
pub fn assert_idle_wait_times_out(iface: &impl VirtualInterface, timeout: Duration) {
    let started = Instant::now();
    let ready = iface.wait_readable(timeout);
    assert!(
        matches!(ready, Ok(false)),
        "idle wait should time out, got {ready:?}"
    );
    assert!(started.elapsed() >= timeout, "wait returned early");
}
