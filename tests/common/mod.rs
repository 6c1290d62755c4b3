#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use espconnect::captive_portal::dispatch;
use espconnect::{
    Clock, DnsSocket, HostError, KeyValueStore, MemoryStore, NetworkInfo, PortalHandler,
    PortalRequest, PortalResponse, ProvisioningController, RadioControl, RadioError, RadioMode,
    RouteHost, ScanState, StorageError,
};

pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
pub const SCAN_DURATION_MS: u32 = 3000;

pub type Now = Arc<AtomicU32>;

/// 手动推进的时钟，`idle` 时触发到期的钩子
pub struct ManualClock {
    now: Now,
    hooks: RefCell<Vec<(u32, Box<dyn FnOnce()>)>>,
}

impl ManualClock {
    pub fn new(now: Now) -> Self {
        Self {
            now,
            hooks: RefCell::new(Vec::new()),
        }
    }

    pub fn at(&self, when: u32, hook: impl FnOnce() + 'static) {
        self.hooks.borrow_mut().push((when, Box::new(hook)));
    }

    pub fn advance(&self, ms: u32) {
        let now = self.now.fetch_add(ms, Ordering::SeqCst).wrapping_add(ms);
        let due: Vec<_> = {
            let mut hooks = self.hooks.borrow_mut();
            let (due, pending): (Vec<_>, Vec<_>) =
                hooks.drain(..).partition(|(when, _)| *when <= now);
            *hooks = pending;
            due
        };
        for (_, hook) in due {
            hook();
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn idle(&self, ms: u32) {
        self.advance(ms);
    }
}

/// 按时间脚本运行的射频
pub struct FakeRadio {
    now: Now,
    pub mode: RadioMode,
    pub ap: Option<(String, String)>,
    pub ap_started_at: Option<u32>,
    pub ap_stopped: usize,
    pub joins: Vec<(String, String, u32)>,
    /// 能连上的网络：ssid -> password
    pub reachable: HashMap<String, String>,
    pub link_delay_ms: u32,
    linked_at: Option<u32>,
    pub disconnects: usize,
    pub networks: Vec<NetworkInfo>,
    scan_started_at: Option<u32>,
    pub scans: usize,
}

impl FakeRadio {
    pub fn new(now: Now) -> Self {
        Self {
            now,
            mode: RadioMode::Station,
            ap: None,
            ap_started_at: None,
            ap_stopped: 0,
            joins: Vec::new(),
            reachable: HashMap::new(),
            link_delay_ms: 1000,
            linked_at: None,
            disconnects: 0,
            networks: Vec::new(),
            scan_started_at: None,
            scans: 0,
        }
    }

    pub fn reachable(mut self, ssid: &str, password: &str) -> Self {
        self.reachable.insert(ssid.to_string(), password.to_string());
        self
    }

    pub fn link_delay(mut self, ms: u32) -> Self {
        self.link_delay_ms = ms;
        self
    }

    pub fn with_networks(mut self, networks: Vec<NetworkInfo>) -> Self {
        self.networks = networks;
        self
    }

    fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

impl RadioControl for FakeRadio {
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.mode = mode;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError> {
        self.ap = Some((ssid.to_string(), password.to_string()));
        self.ap_started_at = Some(self.now());
        Ok(AP_IP)
    }

    fn stop_access_point(&mut self) -> Result<(), RadioError> {
        self.ap = None;
        self.ap_stopped += 1;
        Ok(())
    }

    fn join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let now = self.now();
        self.joins.push((ssid.to_string(), password.to_string(), now));
        self.linked_at = match self.reachable.get(ssid) {
            Some(p) if p == password => Some(now.wrapping_add(self.link_delay_ms)),
            _ => None,
        };
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.linked_at = None;
        self.disconnects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.linked_at.map_or(false, |t| self.now() >= t)
    }

    fn scan_state(&mut self) -> ScanState {
        match self.scan_started_at {
            None => ScanState::NotStarted,
            Some(t) if self.now().wrapping_sub(t) < SCAN_DURATION_MS => ScanState::Running,
            Some(_) => ScanState::Ready(self.networks.clone()),
        }
    }

    fn start_scan(&mut self) -> Result<(), RadioError> {
        self.scan_started_at = Some(self.now());
        self.scans += 1;
        Ok(())
    }

    fn clear_scan(&mut self) {
        self.scan_started_at = None;
    }
}

type Slot = Arc<Mutex<Option<Arc<dyn PortalHandler>>>>;

/// 测试里模拟浏览器发请求
#[derive(Clone)]
pub struct Browser {
    slot: Slot,
}

impl Browser {
    pub fn send(&self, req: PortalRequest) -> PortalResponse {
        let handler = self.slot.lock().unwrap().clone();
        dispatch(handler.as_deref(), &req)
    }

    pub fn get(&self, path: &str) -> PortalResponse {
        self.send(PortalRequest::get(path))
    }

    pub fn post(&self, path: &str, body: &str) -> PortalResponse {
        self.send(PortalRequest::post_form(path, body))
    }
}

#[derive(Default)]
pub struct RecordingHost {
    slot: Slot,
    /// 最近一次挂载的处理器，模拟卸载前已经取走处理器的请求
    pub retained: Option<Arc<dyn PortalHandler>>,
    pub mounts: usize,
    pub unmounts: usize,
}

impl RecordingHost {
    pub fn browser(&self) -> Browser {
        Browser {
            slot: self.slot.clone(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

impl RouteHost for RecordingHost {
    fn mount(&mut self, handler: Arc<dyn PortalHandler>) -> Result<(), HostError> {
        *self.slot.lock().unwrap() = Some(handler.clone());
        self.retained = Some(handler);
        self.mounts += 1;
        Ok(())
    }

    fn unmount(&mut self) {
        self.slot.lock().unwrap().take();
        self.unmounts += 1;
    }
}

#[derive(Default)]
pub struct QueueDns {
    pub bound: Option<SocketAddrV4>,
    pub inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    pub outbox: Vec<(Vec<u8>, SocketAddr)>,
    pub closed: usize,
}

impl DnsSocket for QueueDns {
    fn bind(&mut self, addr: SocketAddrV4) -> io::Result<()> {
        self.bound = Some(addr);
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(self.inbox.pop_front().map(|(packet, peer)| {
            buf[..packet.len()].copy_from_slice(&packet);
            (packet.len(), peer)
        }))
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.outbox.push((buf.to_vec(), addr));
        Ok(())
    }

    fn close(&mut self) {
        self.bound = None;
        self.closed += 1;
    }
}

/// 写入可以被打断的存储
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: Arc<Mutex<MemoryStore>>,
    pub fail_writes: Arc<AtomicBool>,
}

impl KeyValueStore for FlakyStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.lock().unwrap().get_str(key)
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "nvs full".to_string(),
            });
        }
        self.inner.lock().unwrap().set_str(key, value)
    }
}

pub type Controller<S = MemoryStore> =
    ProvisioningController<FakeRadio, S, RecordingHost, QueueDns, ManualClock>;

pub struct Rig<S: KeyValueStore + Send + 'static = MemoryStore> {
    pub controller: Controller<S>,
    pub now: Now,
    pub browser: Browser,
}

impl<S: KeyValueStore + Send + 'static> Rig<S> {
    pub fn new(radio: impl FnOnce(Now) -> FakeRadio, kv: S) -> Self {
        let now: Now = Arc::new(AtomicU32::new(0));
        let host = RecordingHost::default();
        let browser = host.browser();
        let controller = ProvisioningController::new(
            radio(now.clone()),
            kv,
            host,
            QueueDns::default(),
            ManualClock::new(now.clone()),
        );
        Self {
            controller,
            now,
            browser,
        }
    }

    pub fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn advance(&self, ms: u32) {
        self.controller.clock().advance(ms);
    }

    pub fn with_radio<T>(&self, f: impl FnOnce(&FakeRadio) -> T) -> T {
        f(&self.controller.radio().lock().unwrap())
    }

    /// 手动 tick 直到出结果
    pub fn run_until_done(&mut self, step_ms: u32) -> bool {
        loop {
            if let Some(connected) = self.controller.tick() {
                return connected;
            }
            self.advance(step_ms);
        }
    }
}

pub fn store_with(ssid: &str, password: &str) -> MemoryStore {
    let mut kv = MemoryStore::new();
    kv.set_str("ssid", ssid).unwrap();
    kv.set_str("password", password).unwrap();
    kv
}
