//! HTTP 路由处理器
//!
//! 与具体 HTTP 服务器无关：传输层把请求转换成 [`PortalRequest`]，
//! 交给 [`dispatch`]，再把 [`PortalResponse`] 写回去。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Serialize;

use super::html::PortalPage;
use crate::error::{CredentialError, HostError};
use crate::radio::{RadioControl, ScanState};
use crate::storage::{CredentialStore, KeyValueStore, StationCredentials};
use crate::{lock, Shared};

pub const SCAN_PATH: &str = "/espconnect/scan";
pub const CONNECT_PATH: &str = "/espconnect/connect";
pub const PAGE_PATH: &str = "/espconnect";

/// 表单最多读取的字节数
pub const MAX_FORM_BODY: usize = 512;

const CONNECT_OK_MESSAGE: &str = "Credentials saved. Connecting...";

/// 一个已经解析好的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    pub method: Method,
    /// 不含查询串的路径
    pub path: String,
    /// `application/x-www-form-urlencoded` 表单字段
    pub form: Vec<(String, String)>,
    /// 客户端是否通过配网 AP 接入
    pub via_access_point: bool,
    /// 请求体超过 [`MAX_FORM_BODY`]，表单没有读取
    pub body_too_large: bool,
}

impl PortalRequest {
    pub fn new(method: Method, path: &str) -> Self {
        let path = path.split('?').next().unwrap_or_default();
        Self {
            method,
            path: path.to_string(),
            form: Vec::new(),
            via_access_point: true,
            body_too_large: false,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post_form(path: &str, body: &str) -> Self {
        let mut req = Self::new(Method::POST, path);
        req.form = parse_form(body);
        req
    }

    pub fn with_access_point(mut self, via_access_point: bool) -> Self {
        self.via_access_point = via_access_point;
        self
    }

    pub fn with_body_too_large(mut self) -> Self {
        self.form.clear();
        self.body_too_large = true;
        self
    }

    /// 同名字段取第一个
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// AP 客户端访问 `/` 时重写到配网页面
    fn route_path(&self) -> &str {
        if self.path == "/" && self.via_access_point {
            PAGE_PATH
        } else {
            &self.path
        }
    }
}

/// 解析 urlencoded 表单
pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: Bytes,
}

impl PortalResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json")],
            body: body.into(),
        }
    }

    /// `{"message": ...}`
    pub fn message(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "message": message }).to_string();
        Self::json(status, body)
    }

    pub fn page(page: &PortalPage) -> Self {
        let mut headers = vec![("Content-Type", "text/html")];
        if page.gzipped {
            headers.push(("Content-Encoding", "gzip"));
        }
        Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(page.body),
        }
    }

    pub fn not_found() -> Self {
        Self::empty(StatusCode::NOT_FOUND)
    }

    pub fn header(&self, name: &str) -> Option<&'static str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

/// 挂载到 HTTP 服务器上的门户处理器
///
/// 由传输层在自己的线程里调用，处理过程不允许等待。
pub trait PortalHandler: Send + Sync {
    /// 是否是门户自己的路由（`/` 已按规则重写）
    fn matches(&self, req: &PortalRequest) -> bool;

    fn handle(&self, req: &PortalRequest) -> PortalResponse;

    /// 门户运行期间未匹配的路径
    fn not_found(&self, req: &PortalRequest) -> PortalResponse;
}

/// HTTP 服务器一侧的挂载点
pub trait RouteHost {
    fn mount(&mut self, handler: Arc<dyn PortalHandler>) -> Result<(), HostError>;

    /// 卸载后未匹配的路径回到 404
    fn unmount(&mut self);
}

/// 传输层统一入口：门户路由优先，其次是门户页面，门户关闭后一律 404
pub fn dispatch(handler: Option<&dyn PortalHandler>, req: &PortalRequest) -> PortalResponse {
    match handler {
        Some(h) if h.matches(req) => h.handle(req),
        Some(h) => h.not_found(req),
        None => PortalResponse::not_found(),
    }
}

#[derive(Serialize)]
struct ScanEntry<'a> {
    name: &'a str,
    open: bool,
}

/// 配网会话期间的三个路由
pub struct PortalRoutes<R, S> {
    radio: Shared<R>,
    store: Shared<CredentialStore<S>>,
    submitted: Shared<Option<StationCredentials>>,
    page: PortalPage,
    closed: AtomicBool,
}

impl<R, S> PortalRoutes<R, S>
where
    R: RadioControl,
    S: KeyValueStore,
{
    pub fn new(
        radio: Shared<R>,
        store: Shared<CredentialStore<S>>,
        submitted: Shared<Option<StationCredentials>>,
        page: PortalPage,
    ) -> Self {
        Self {
            radio,
            store,
            submitted,
            page,
            closed: AtomicBool::new(false),
        }
    }

    /// 会话结束后调用，之后所有请求都是 404
    ///
    /// 调用方需要持有 `submitted` 的锁，和正在处理的提交互斥。
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// GET /espconnect/scan
    fn scan(&self) -> PortalResponse {
        let mut radio = lock(&self.radio);
        let state = radio.scan_state();
        match state {
            ScanState::NotStarted => {
                log::info!("[Portal] Starting WiFi scan");
                if let Err(e) = radio.start_scan() {
                    log::warn!("[Portal] {}", e);
                }
                PortalResponse::empty(StatusCode::ACCEPTED)
            }
            ScanState::Running => PortalResponse::empty(StatusCode::ACCEPTED),
            ScanState::Ready(networks) => {
                radio.clear_scan();
                drop(radio);

                let entries: Vec<ScanEntry<'_>> = networks
                    .iter()
                    .map(|n| ScanEntry {
                        name: &n.name,
                        open: n.is_open,
                    })
                    .collect();
                match serde_json::to_vec(&entries) {
                    Ok(body) => PortalResponse::json(StatusCode::OK, body),
                    Err(e) => {
                        log::error!("[Portal] Failed to encode scan result: {}", e);
                        PortalResponse::empty(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }
            }
        }
    }

    /// POST /espconnect/connect
    fn connect(&self, req: &PortalRequest) -> PortalResponse {
        // 提交期间持有 submitted，与会话关闭互斥
        let mut submitted = lock(&self.submitted);
        if self.is_closed() {
            return PortalResponse::not_found();
        }

        if req.body_too_large {
            let e = CredentialError::TooLong;
            log::warn!("[Portal] Rejected credentials: {}", e);
            return PortalResponse::message(StatusCode::FORBIDDEN, &e.to_string());
        }

        let credentials = StationCredentials::new(
            req.param("ssid").unwrap_or_default(),
            req.param("password").unwrap_or_default(),
        );

        if let Err(e) = credentials.validate() {
            log::warn!("[Portal] Rejected credentials: {}", e);
            return PortalResponse::message(StatusCode::FORBIDDEN, &e.to_string());
        }

        let saved = lock(&self.store).save(&credentials);
        if let Err(e) = saved {
            log::error!("[Portal] WiFi config failed with: {}", e);
            return PortalResponse::message(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error while saving WiFi Credentials: {}", e),
            );
        }

        if let Err(e) = lock(&self.radio).join(&credentials.ssid, &credentials.password) {
            log::warn!("[Portal] {}", e);
        }
        log::info!("[Portal] Credentials received for {:?}", credentials.ssid);
        *submitted = Some(credentials);

        PortalResponse::message(StatusCode::OK, CONNECT_OK_MESSAGE)
    }
}

impl<R, S> PortalHandler for PortalRoutes<R, S>
where
    R: RadioControl + Send,
    S: KeyValueStore + Send,
{
    fn matches(&self, req: &PortalRequest) -> bool {
        matches!(
            (&req.method, req.route_path()),
            (&Method::GET, SCAN_PATH) | (&Method::POST, CONNECT_PATH) | (&Method::GET, PAGE_PATH)
        )
    }

    fn handle(&self, req: &PortalRequest) -> PortalResponse {
        if self.is_closed() {
            return PortalResponse::not_found();
        }
        match (&req.method, req.route_path()) {
            (&Method::GET, SCAN_PATH) => self.scan(),
            (&Method::POST, CONNECT_PATH) => self.connect(req),
            _ => PortalResponse::page(&self.page),
        }
    }

    fn not_found(&self, req: &PortalRequest) -> PortalResponse {
        if self.is_closed() {
            return PortalResponse::not_found();
        }
        log::debug!("[Portal] {} {} -> portal page", req.method, req.path);
        PortalResponse::page(&self.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_decoding() {
        let form = parse_form("ssid=My+Home%20Net&password=p%26ss%3D1&empty=&flag");
        assert_eq!(
            form,
            vec![
                ("ssid".to_string(), "My Home Net".to_string()),
                ("password".to_string(), "p&ss=1".to_string()),
                ("empty".to_string(), String::new()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn form_decoding_keeps_utf8() {
        let form = parse_form("ssid=%E5%AE%B6");
        assert_eq!(form[0].1, "家");
    }

    #[test]
    fn query_string_is_stripped() {
        let req = PortalRequest::get("/espconnect/scan?t=123");
        assert_eq!(req.path, SCAN_PATH);
    }

    #[test]
    fn oversized_body_drops_form() {
        let req =
            PortalRequest::post_form(CONNECT_PATH, "ssid=a&password=b").with_body_too_large();
        assert!(req.body_too_large);
        assert_eq!(req.param("ssid"), None);
    }

    #[test]
    fn root_rewrite_only_for_ap_clients() {
        assert_eq!(PortalRequest::get("/").route_path(), PAGE_PATH);
        assert_eq!(
            PortalRequest::get("/").with_access_point(false).route_path(),
            "/"
        );
    }

    #[test]
    fn message_body_is_json() {
        let resp = PortalResponse::message(StatusCode::FORBIDDEN, "Invalid \"SSID\"");
        let value: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(value["message"], "Invalid \"SSID\"");
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[test]
    fn dispatch_without_handler_is_404() {
        let resp = dispatch(None, &PortalRequest::get("/espconnect"));
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn page_response_marks_gzip() {
        let resp = PortalResponse::page(&PortalPage::default());
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header("Content-Encoding"), Some("gzip"));

        let plain = PortalPage {
            body: b"<html></html>",
            gzipped: false,
        };
        assert_eq!(PortalResponse::page(&plain).header("Content-Encoding"), None);
    }
}
